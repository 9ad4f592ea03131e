//! Program Stream multiplexer: formats pack/system/PES headers and emits
//! byte-exact PS packets for one or more elementary streams.

use tracing::{debug, trace};

use crate::bitio::BitWriter;
use crate::constants::{
    AC3_SUBHEADER, AUDIO_STREAM_MAX, AUDIO_STREAM_MIN, ISO_11172_END_CODE, MPEG2_PES_EXTENSION,
    PACK_HEADER_BODY_LEN, PACK_START_CODE, PRIVATE_STREAM_1, SYSTEM_HEADER_START_CODE,
    TIMESTAMP_MARKER_NIBBLE, VIDEO_STREAM_MAX, VIDEO_STREAM_MIN,
};
use crate::error::{PsError, Result};
use crate::io::ByteSink;
use crate::pes::write_timestamp_field;
use crate::profile::{Profile, ProfileKind};
use crate::stream::{CodecType, StreamDescriptor, StreamState};
use crate::ticker::Ticker;

/// Mutable multiplexing state for one Program Stream: the profile, every
/// elementary stream's fill buffer/PTS accumulator, and the counters the
/// header-frequency rules are keyed on.
///
/// Owns every [`StreamState`]; their buffers are allocated once at
/// [`MuxContext::init`] and reused across packets.
#[derive(Debug)]
pub struct MuxContext {
    profile: Profile,
    streams: Vec<StreamState>,
    audio_bound: u32,
    video_bound: u32,
    packet_number: u64,
    packet_data_max_size: usize,
    /// Total bytes a system header occupies on the wire (start code, length
    /// field, fixed body, one 3-byte entry per distinct stream id). Constant
    /// once streams are assigned at init, since it depends only on stream
    /// count/kind, never on packet content.
    system_header_size: usize,
}

impl MuxContext {
    /// Assigns PES ids to `descriptors` in order, derives `Profile` from
    /// their aggregate bit rate, and initializes each stream's ticker.
    ///
    /// Returns [`PsError::NoMemory`] if more streams of one kind are
    /// requested than the container can assign distinct ids to (32 audio,
    /// 16 video, 32 AC-3 sub-ids).
    pub fn init(descriptors: &[StreamDescriptor], kind: ProfileKind) -> Result<Self> {
        let total_bit_rate: u64 = descriptors.iter().map(|d| d.bit_rate as u64).sum();
        let profile = Profile::new(kind, total_bit_rate);

        let mut streams = Vec::with_capacity(descriptors.len());
        let mut mp2_count: u16 = 0;
        let mut ac3_count: u16 = 0;
        let mut video_count: u16 = 0;
        let mut audio_bound = 0u32;
        let mut video_bound = 0u32;

        for d in descriptors {
            let id = match (d.codec_type, d.codec_id) {
                (CodecType::Video, crate::stream::CodecId::Mpeg1Video) => {
                    let available = (VIDEO_STREAM_MAX - VIDEO_STREAM_MIN) as u16 + 1;
                    if video_count >= available {
                        return Err(PsError::NoMemory {
                            requested: video_count as usize + 1,
                            available: available as usize,
                        });
                    }
                    let id = VIDEO_STREAM_MIN + video_count as u8;
                    video_count += 1;
                    video_bound += 1;
                    id
                }
                (CodecType::Audio, crate::stream::CodecId::Mp2) => {
                    let available = (AUDIO_STREAM_MAX - AUDIO_STREAM_MIN) as u16 + 1;
                    if mp2_count >= available {
                        return Err(PsError::NoMemory {
                            requested: mp2_count as usize + 1,
                            available: available as usize,
                        });
                    }
                    let id = AUDIO_STREAM_MIN + mp2_count as u8;
                    mp2_count += 1;
                    audio_bound += 1;
                    id
                }
                (CodecType::Audio, crate::stream::CodecId::Ac3) => {
                    let available = (crate::constants::AC3_SUBID_MAX - crate::constants::AC3_SUBID_MIN) as u16 + 1;
                    if ac3_count >= available {
                        return Err(PsError::NoMemory {
                            requested: ac3_count as usize + 1,
                            available: available as usize,
                        });
                    }
                    let id = crate::constants::AC3_SUBID_MIN + ac3_count as u8;
                    ac3_count += 1;
                    id
                }
                _ => {
                    return Err(PsError::InvalidInput(
                        "a stream descriptor must be either audio or video".into(),
                    ));
                }
            };

            let ticker = match d.codec_type {
                CodecType::Audio => Ticker::audio(d.sample_rate, d.frame_size),
                CodecType::Video => Ticker::video(d.frame_rate),
            };
            streams.push(StreamState::new(id, d.codec_type, d.codec_id, ticker));
        }

        let header_len = if profile.is_mpeg2() { 8 } else { 5 };

        let distinct_entries = streams.iter().filter(|s| !s.is_private_stream1_subid()).count()
            + usize::from(streams.iter().any(StreamState::is_private_stream1_subid));
        let system_header_size =
            4 + 2 + crate::constants::SYSTEM_HEADER_FIXED_BODY_LEN + crate::constants::SYSTEM_HEADER_STREAM_ENTRY_LEN * distinct_entries;

        // packet_number 0 satisfies `0 % pack_header_freq == 0` and
        // `0 % system_header_freq == 0` for every profile, so the very first
        // packet any stream emits always carries both a pack header and a
        // system header. Size the fill threshold to that prefixed capacity
        // so a buffer holding exactly this many bytes always drains to
        // `fill == 0` in one flush, per the packet_data_max_size boundary
        // invariant.
        let prefix_size = 4 + PACK_HEADER_BODY_LEN + system_header_size;
        let packet_data_max_size = (profile.packet_size as usize).saturating_sub(prefix_size + 6 + header_len);

        debug!(%profile, streams = streams.len(), "initialized mpeg-ps mux context");

        Ok(MuxContext {
            profile,
            streams,
            audio_bound,
            video_bound,
            packet_number: 0,
            packet_data_max_size,
            system_header_size,
        })
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// The number of elementary-stream payload bytes a stream's fill buffer
    /// may hold before [`write_packet`](Self::write_packet) emits a packet.
    pub fn packet_data_max_size(&self) -> usize {
        self.packet_data_max_size
    }

    /// The number of bytes currently buffered (not yet emitted) for `stream_index`.
    pub fn stream_fill(&self, stream_index: usize) -> usize {
        self.streams[stream_index].fill
    }

    /// Appends `bytes` to `stream_index`'s fill buffer, advances its PTS by
    /// one tick, and emits complete PS packets while the buffer exceeds the
    /// profile's packet-data limit.
    ///
    /// `force_pts`, when `Some` and non-zero, re-anchors the stream's PTS
    /// before the new bytes' `start_pts` is captured — e.g. at stream start.
    pub fn write_packet<S: ByteSink>(
        &mut self,
        stream_index: usize,
        bytes: &[u8],
        force_pts: Option<i64>,
        sink: &mut S,
    ) -> Result<()> {
        {
            let stream = self.stream_mut(stream_index)?;
            if let Some(pts) = force_pts {
                if pts != 0 {
                    stream.pts = pts;
                }
            }
            if stream.start_pts.is_none() {
                stream.start_pts = Some(stream.pts);
            }
            stream.buffer.extend_from_slice(bytes);
            stream.fill += bytes.len();
            trace!(stream_index, id = stream.id, bytes = bytes.len(), pts = stream.pts, "buffered elementary bytes");
        }

        while self.streams[stream_index].fill >= self.packet_data_max_size {
            self.flush_packet(stream_index, false, sink)?;
        }

        let stream = &mut self.streams[stream_index];
        let inc = stream.ticker.tick() as i64;
        stream.pts += inc;
        Ok(())
    }

    /// Flushes every stream with pending bytes and terminates the
    /// multiplex: the last packet of the last stream carries the
    /// `ISO_11172_END_CODE` trailer.
    pub fn end<S: ByteSink>(&mut self, sink: &mut S) -> Result<()> {
        let last = self.streams.len().saturating_sub(1);
        for idx in 0..self.streams.len() {
            while self.streams[idx].fill > 0 {
                // A single flush always drains a post-`write_packet` residual
                // (bounded below `packet_data_max_size`) unless emitting as
                // the final packet's 4-byte trailer would overflow it by a
                // handful of bytes; in that rare case drain non-terminal
                // packets first and let the final one carry the end code.
                let is_last = idx == last && self.streams[idx].fill <= self.payload_capacity(idx, true);
                self.flush_packet(idx, is_last, sink)?;
            }
        }
        Ok(())
    }

    fn stream_mut(&mut self, stream_index: usize) -> Result<&mut StreamState> {
        self.streams
            .get_mut(stream_index)
            .ok_or_else(|| PsError::InvalidInput(format!("stream index {stream_index} out of range")))
    }

    /// The number of elementary-stream payload bytes the *next* packet for
    /// `stream_index` would have room for, given the current `packet_number`
    /// (which decides whether a pack/system header prefix is due) and
    /// whether that packet is the stream-terminating one.
    fn payload_capacity(&self, stream_index: usize, is_last: bool) -> usize {
        let packet_number = self.packet_number;
        let emit_pack = packet_number % self.profile.pack_header_freq as u64 == 0;
        let emit_system = emit_pack && packet_number % self.profile.system_header_freq as u64 == 0;

        let mut prefix_size = 0usize;
        if emit_pack {
            prefix_size += 4 + PACK_HEADER_BODY_LEN;
            if emit_system {
                prefix_size += self.system_header_size;
            }
        }

        let header_len: usize = if self.profile.is_mpeg2() { 8 } else { 5 };
        let trailer_len: usize = if is_last { 4 } else { 0 };
        let subheader_len: usize = if self.streams[stream_index].is_private_stream1_subid() { 4 } else { 0 };

        (self.profile.packet_size as usize).saturating_sub(prefix_size + 6 + header_len + trailer_len + subheader_len)
    }

    /// Emits one complete PS packet for `stream_index`: optional pack/system
    /// header prefix, the PES header (with stuffing so the packet is always
    /// exactly `packet_size` bytes), and as much buffered payload as fits.
    fn flush_packet<S: ByteSink>(&mut self, stream_index: usize, is_last: bool, sink: &mut S) -> Result<()> {
        let packet_number = self.packet_number;
        let emit_pack = packet_number % self.profile.pack_header_freq as u64 == 0;
        let emit_system = emit_pack && packet_number % self.profile.system_header_freq as u64 == 0;

        if emit_pack {
            let scr = self.streams[stream_index].start_pts.unwrap_or(self.streams[stream_index].pts).max(0) as u64;
            self.write_pack_header(sink, scr)?;
            debug!(packet_number, scr, "emitted pack header");

            if emit_system {
                self.write_system_header(sink)?;
                debug!(packet_number, "emitted system header");
            }
        }

        let header_len: usize = if self.profile.is_mpeg2() { 8 } else { 5 };
        let is_priv1 = self.streams[stream_index].is_private_stream1_subid();
        let payload_size = self.payload_capacity(stream_index, is_last);

        let fill = self.streams[stream_index].fill;
        let written_from_buffer = payload_size.min(fill);
        let stuffing = payload_size - written_from_buffer;

        let pes_start_code: u32 = if is_priv1 {
            PRIVATE_STREAM_1
        } else {
            0x0000_0100 | self.streams[stream_index].id as u32
        };
        sink.put_be32(pes_start_code)?;
        sink.put_be16((payload_size + header_len) as u16)?;

        if stuffing > 0 {
            sink.put_buffer(&vec![0xFFu8; stuffing])?;
        }

        if self.profile.is_mpeg2() {
            sink.put_buffer(&MPEG2_PES_EXTENSION)?;
        }

        let pts = self.streams[stream_index].start_pts.unwrap_or(self.streams[stream_index].pts).max(0) as u64;
        let mut bw = BitWriter::with_capacity(5);
        write_timestamp_field(&mut bw, TIMESTAMP_MARKER_NIBBLE, pts);
        sink.put_buffer(&bw.into_bytes())?;

        if is_priv1 {
            sink.put_byte(self.streams[stream_index].id)?;
            if matches!(self.streams[stream_index].codec_id, crate::stream::CodecId::Ac3) {
                sink.put_buffer(&AC3_SUBHEADER)?;
            }
        }

        sink.put_buffer(&self.streams[stream_index].buffer[..written_from_buffer])?;

        if is_last {
            sink.put_be32(ISO_11172_END_CODE)?;
        }

        sink.put_flush_packet()?;

        trace!(
            stream_index,
            packet_number,
            payload = written_from_buffer,
            stuffing,
            is_last,
            "flushed PS packet"
        );

        let stream = &mut self.streams[stream_index];
        let residual = stream.fill - written_from_buffer;
        stream.buffer.copy_within(written_from_buffer..written_from_buffer + residual, 0);
        stream.buffer.truncate(residual);
        stream.fill = residual;
        stream.start_pts = None;
        stream.packet_number += 1;

        self.packet_number += 1;
        Ok(())
    }

    fn write_pack_header<S: ByteSink>(&self, sink: &mut S, scr: u64) -> Result<()> {
        sink.put_be32(PACK_START_CODE)?;
        let mut bw = BitWriter::with_capacity(PACK_HEADER_BODY_LEN);
        write_timestamp_field(&mut bw, TIMESTAMP_MARKER_NIBBLE, scr);
        bw.write_bit(true);
        bw.write_bits(self.profile.mux_rate & 0x003F_FFFF, 22);
        bw.write_bit(true);
        sink.put_buffer(&bw.into_bytes())?;
        Ok(())
    }

    fn write_system_header<S: ByteSink>(&self, sink: &mut S) -> Result<()> {
        let mut body = BitWriter::with_capacity(32);
        body.write_bit(true);
        body.write_bits(self.profile.mux_rate & 0x003F_FFFF, 22);
        body.write_bit(true);
        body.write_bits(self.audio_bound & 0x3F, 6);
        body.write_bit(true); // VBR flag
        body.write_bit(true); // non-constrained bitrate flag
        body.write_bit(false); // audio-locked
        body.write_bit(false); // video-locked
        body.write_bit(true);
        body.write_bits(self.video_bound & 0x1F, 5);
        body.write_bits(0xFF, 8);

        let mut seen_priv1 = false;
        for stream in &self.streams {
            if stream.is_private_stream1_subid() {
                if seen_priv1 {
                    continue;
                }
                seen_priv1 = true;
                body.write_bits(PRIVATE_STREAM_1 as u32 & 0xFF, 8);
            } else {
                body.write_bits(stream.id as u32, 8);
            }
            body.write_bits(0b11, 2);
            body.write_bit(matches!(stream.codec_type, CodecType::Video));
            body.write_bits(stream.buffer_size_scaled() & 0x1FFF, 13);
        }

        let body_bytes = body.into_bytes();
        sink.put_be32(SYSTEM_HEADER_START_CODE)?;
        sink.put_be16(body_bytes.len() as u16)?;
        sink.put_buffer(&body_bytes)?;
        debug_assert_eq!(4 + 2 + body_bytes.len(), self.system_header_size);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileKind;

    fn video_audio_descriptors() -> Vec<StreamDescriptor> {
        vec![
            StreamDescriptor::mpeg1_video(25 * crate::constants::FRAME_RATE_BASE, 1_150_000),
            StreamDescriptor::mp2_audio(44_100, 1152, 128_000),
        ]
    }

    #[test]
    fn init_assigns_sequential_ids_and_bounds() {
        let ctx = MuxContext::init(&video_audio_descriptors(), ProfileKind::Mpeg1System).unwrap();
        assert_eq!(ctx.audio_bound, 1);
        assert_eq!(ctx.video_bound, 1);
        assert_eq!(ctx.streams[0].id, VIDEO_STREAM_MIN);
        assert_eq!(ctx.streams[1].id, AUDIO_STREAM_MIN);
    }

    #[test]
    fn init_rejects_a_non_audio_video_descriptor_range_exhaustion() {
        let mut many = Vec::new();
        for _ in 0..33 {
            many.push(StreamDescriptor::mp2_audio(44_100, 1152, 128_000));
        }
        let err = MuxContext::init(&many, ProfileKind::Mpeg1System).unwrap_err();
        assert!(matches!(err, PsError::NoMemory { .. }));
    }

    #[test]
    fn every_emitted_packet_is_exactly_packet_size_bytes() {
        let mut ctx = MuxContext::init(&video_audio_descriptors(), ProfileKind::Mpeg1System).unwrap();
        let mut sink: Vec<u8> = Vec::new();
        let packet_data_max = ctx.packet_data_max_size;
        ctx.write_packet(1, &vec![0xAB; packet_data_max + 50], None, &mut sink).unwrap();
        ctx.end(&mut sink).unwrap();
        assert!(!sink.is_empty());
        assert_eq!(sink.len() % ctx.profile.packet_size as usize, 0);
    }

    #[test]
    fn first_packet_begins_with_pack_then_system_then_pes_start_codes() {
        let mut ctx = MuxContext::init(&video_audio_descriptors(), ProfileKind::Mpeg1System).unwrap();
        let mut sink: Vec<u8> = Vec::new();
        ctx.write_packet(1, &vec![0x11; ctx.packet_data_max_size], None, &mut sink)
            .unwrap();
        assert_eq!(&sink[0..4], &[0x00, 0x00, 0x01, 0xBA]);
        let after_pack = 4 + PACK_HEADER_BODY_LEN;
        assert_eq!(&sink[after_pack..after_pack + 4], &[0x00, 0x00, 0x01, 0xBB]);
    }

    #[test]
    fn empty_mux_with_nothing_written_emits_no_bytes() {
        let descriptors = vec![StreamDescriptor::mp2_audio(44_100, 1152, 128_000)];
        let mut ctx = MuxContext::init(&descriptors, ProfileKind::Mpeg1System).unwrap();
        let mut sink: Vec<u8> = Vec::new();
        ctx.end(&mut sink).unwrap();
        assert!(sink.is_empty());
    }

    #[test]
    fn last_packet_ends_with_the_iso_end_code() {
        let descriptors = vec![StreamDescriptor::mp2_audio(44_100, 1152, 128_000)];
        let mut ctx = MuxContext::init(&descriptors, ProfileKind::Mpeg1System).unwrap();
        let mut sink: Vec<u8> = Vec::new();
        ctx.write_packet(0, &[0xCD; 10], None, &mut sink).unwrap();
        ctx.end(&mut sink).unwrap();
        let n = sink.len();
        assert_eq!(&sink[n - 4..], &[0x00, 0x00, 0x01, 0xB9]);
    }

    #[test]
    fn ac3_stream_id_is_assigned_from_the_private_stream1_subid_range() {
        let descriptors = vec![StreamDescriptor::ac3_audio(48_000, 1536, 256_000)];
        let ctx = MuxContext::init(&descriptors, ProfileKind::Mpeg1System).unwrap();
        assert!(ctx.streams[0].is_private_stream1_subid());
        assert_eq!(ctx.streams[0].id, crate::constants::AC3_SUBID_MIN);
    }

    #[test]
    fn out_of_range_stream_index_is_a_typed_error() {
        let descriptors = vec![StreamDescriptor::mp2_audio(44_100, 1152, 128_000)];
        let mut ctx = MuxContext::init(&descriptors, ProfileKind::Mpeg1System).unwrap();
        let mut sink: Vec<u8> = Vec::new();
        let err = ctx.write_packet(5, &[0x00], None, &mut sink).unwrap_err();
        assert!(matches!(err, PsError::InvalidInput(_)));
    }
}
