use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use mpeg_ps::{DemuxContext, ProfileKind, SliceSource, StreamDescriptor};

/// Muxes a short multi-stream Program Stream once, then benchmarks draining
/// it with the demuxer — exercising the start-code scanner as the hot loop,
/// the way `ts`'s benchmark exercises TS packet parsing.
fn complex_ps_stream() -> Vec<u8> {
    let descriptors = vec![
        StreamDescriptor::mpeg1_video(25 * mpeg_ps::constants::FRAME_RATE_BASE, 1_150_000),
        StreamDescriptor::mp2_audio(44_100, 1152, 128_000),
        StreamDescriptor::ac3_audio(48_000, 1536, 192_000),
    ];
    let mut ctx = mpeg_ps::MuxContext::init(&descriptors, ProfileKind::Mpeg1System).unwrap();
    let mut sink: Vec<u8> = Vec::new();

    for i in 0..200u8 {
        ctx.write_packet(0, &vec![i; 900], None, &mut sink).unwrap();
        ctx.write_packet(1, &vec![i.wrapping_add(1); 300], None, &mut sink).unwrap();
        ctx.write_packet(2, &vec![i.wrapping_add(2); 300], None, &mut sink).unwrap();
    }
    ctx.end(&mut sink).unwrap();
    sink
}

fn noisy_ps_stream() -> Vec<u8> {
    let base = complex_ps_stream();
    let mut out = Vec::with_capacity(base.len() * 2);
    for chunk in base.chunks(64) {
        out.extend_from_slice(chunk);
        out.extend_from_slice(&[0x00, 0x11, 0x22, 0x01, 0x00]);
    }
    out
}

fn benchmark_demux(c: &mut Criterion) {
    let mut group = c.benchmark_group("Program Stream Demux");

    let base_data = complex_ps_stream();
    group.bench_function("drain (clean)", |b| {
        b.iter(|| {
            let mut demux = DemuxContext::new();
            let mut src = SliceSource::new(black_box(base_data.clone()));
            let mut count = 0u64;
            while demux.read_packet(&mut src).is_ok() {
                count += 1;
            }
            black_box(count);
        })
    });

    let noisy_data = noisy_ps_stream();
    group.bench_function("drain (noisy resync)", |b| {
        b.iter(|| {
            let mut demux = DemuxContext::new();
            let mut src = SliceSource::new(black_box(noisy_data.clone()));
            let mut count = 0u64;
            while demux.read_packet(&mut src).is_ok() {
                count += 1;
            }
            black_box(count);
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_demux);
criterion_main!(benches);
