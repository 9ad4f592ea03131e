//! MPEG-1/MPEG-2 Program Stream (PS) multiplexer and demultiplexer.
//!
//! This crate implements the mux/demux state machine and bit-exact header
//! layout for the MPEG-1 Systems, MPEG-1 VCD, and MPEG-2 VOB Program Stream
//! profiles: it multiplexes one or more elementary audio/video streams into
//! a byte-accurate PS bitstream via [`MuxContext`], and demultiplexes such a
//! bitstream back into packetized elementary units with 90 kHz presentation
//! timestamps via [`DemuxContext`].
//!
//! Out of scope (consumed only through [`ByteSink`]/[`ByteSource`] and
//! [`StreamDescriptor`]): elementary-stream payload parsing, the outer
//! container-format registry, generic byte-I/O plumbing.

pub mod bitio;
pub mod constants;
pub mod demux;
pub mod error;
pub mod formats;
pub mod io;
pub mod pes;
pub mod probe;
pub mod profile;
pub mod stream;
pub mod ticker;
mod mux;

pub use bitio::BitWriter;
pub use demux::{AvPacket, DemuxContext, DiscoveredStream};
pub use error::{PsError, Result};
pub use formats::{FormatDescriptor, ALL as FORMAT_DESCRIPTORS, DEMUXER, MPEG1_SYSTEM, VCD, VOB};
pub use io::{ByteSink, ByteSource, SliceSource};
pub use mux::MuxContext;
pub use probe::probe;
pub use profile::{Profile, ProfileKind};
pub use stream::{CodecId, CodecType, StreamDescriptor, StreamState};
pub use ticker::Ticker;

#[cfg(test)]
mod roundtrip_tests {
    use super::*;

    /// Muxes one MPEG-1-video and one MP2-audio stream through several
    /// packets, then demuxes the result and checks that the elementary byte
    /// sequences and PTS ordering survive the round trip.
    #[test]
    fn mux_then_demux_recovers_elementary_bytes_and_monotonic_pts() {
        let descriptors = vec![
            StreamDescriptor::mpeg1_video(25 * constants::FRAME_RATE_BASE, 1_150_000),
            StreamDescriptor::mp2_audio(44_100, 1152, 128_000),
        ];
        let mut ctx = MuxContext::init(&descriptors, ProfileKind::Mpeg1System).unwrap();
        let mut sink: Vec<u8> = Vec::new();

        let video_frames: Vec<Vec<u8>> = (0..6).map(|i| vec![0xAAu8.wrapping_add(i); 900]).collect();
        let audio_frames: Vec<Vec<u8>> = (0..10).map(|i| vec![0x10u8.wrapping_add(i); 300]).collect();

        for frame in &video_frames {
            ctx.write_packet(0, frame, None, &mut sink).unwrap();
        }
        for frame in &audio_frames {
            ctx.write_packet(1, frame, None, &mut sink).unwrap();
        }
        ctx.end(&mut sink).unwrap();

        assert_eq!(sink.len() % ctx.profile().packet_size as usize, 0);

        let mut demux = DemuxContext::new();
        let mut src = SliceSource::new(sink);

        let mut video_out: Vec<u8> = Vec::new();
        let mut audio_out: Vec<u8> = Vec::new();
        let mut video_ptses: Vec<i64> = Vec::new();
        let mut audio_ptses: Vec<i64> = Vec::new();

        loop {
            match demux.read_packet(&mut src) {
                Ok(packet) => {
                    if packet.stream_id >= constants::VIDEO_STREAM_MIN {
                        video_out.extend_from_slice(&packet.payload);
                        video_ptses.push(packet.pts);
                    } else {
                        audio_out.extend_from_slice(&packet.payload);
                        audio_ptses.push(packet.pts);
                    }
                }
                Err(_) => break,
            }
        }

        let expected_video: Vec<u8> = video_frames.concat();
        let expected_audio: Vec<u8> = audio_frames.concat();
        assert_eq!(video_out, expected_video);
        assert_eq!(audio_out, expected_audio);

        assert!(video_ptses.windows(2).all(|w| w[0] <= w[1]));
        assert!(audio_ptses.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn a_stream_buffer_of_exactly_packet_data_max_size_emits_one_packet_and_empties() {
        let descriptors = vec![StreamDescriptor::mp2_audio(44_100, 1152, 128_000)];
        let mut ctx = MuxContext::init(&descriptors, ProfileKind::Mpeg1System).unwrap();
        let mut sink: Vec<u8> = Vec::new();
        let max = ctx.packet_data_max_size();
        ctx.write_packet(0, &vec![0x5Au8; max], None, &mut sink).unwrap();
        assert_eq!(sink.len(), ctx.profile().packet_size as usize);
        assert_eq!(ctx.stream_fill(0), 0);
    }

    #[test]
    fn a_stream_buffer_one_byte_over_the_limit_emits_one_packet_and_leaves_one_byte_pending() {
        let descriptors = vec![StreamDescriptor::mp2_audio(44_100, 1152, 128_000)];
        let mut ctx = MuxContext::init(&descriptors, ProfileKind::Mpeg1System).unwrap();
        let mut sink: Vec<u8> = Vec::new();
        let max = ctx.packet_data_max_size();
        ctx.write_packet(0, &vec![0x5Au8; max + 1], None, &mut sink).unwrap();
        assert_eq!(sink.len(), ctx.profile().packet_size as usize);
        assert_eq!(ctx.stream_fill(0), 1);
        ctx.end(&mut sink).unwrap();
        assert_eq!(sink.len(), 2 * ctx.profile().packet_size as usize);
    }
}
