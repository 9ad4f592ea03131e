//! Program Stream demultiplexer: scans for start codes, parses pack/system/
//! PES headers, and reconstructs elementary-stream packets with PTS.

use tracing::{trace, warn};

use crate::constants::{
    AC3_SUBID_MAX, AC3_SUBID_MIN, AUDIO_STREAM_MAX, AUDIO_STREAM_MIN, MAX_SYNC_SIZE,
    PACK_START_CODE, PADDING_STREAM, PRIVATE_STREAM_1, PRIVATE_STREAM_2, SYSTEM_HEADER_START_CODE,
    VIDEO_STREAM_MAX, VIDEO_STREAM_MIN,
};
use crate::error::{PsError, Result};
use crate::io::ByteSource;
use crate::pes::decode_timestamp;
use crate::stream::{CodecId, CodecType};

fn eof_error() -> PsError {
    PsError::Io(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        "mpeg-ps: start-code scanner exhausted its sync budget",
    ))
}

/// A demuxed elementary-stream packet: a decoded unit of PES payload along
/// with the 90 kHz PTS it was stamped with.
#[derive(Debug, Clone)]
pub struct AvPacket {
    pub stream_index: usize,
    pub stream_id: u8,
    pub payload: Vec<u8>,
    pub pts: i64,
}

/// A stream discovered while demuxing, identified by its effective PES id
/// (the sub-id for private-stream-1 contributors). Type and codec are
/// inferred from the id range at discovery time, never declared up front.
#[derive(Debug, Clone, Copy)]
pub struct DiscoveredStream {
    pub id: u8,
    pub codec_type: CodecType,
    pub codec_id: CodecId,
}

/// Demultiplexing state: the start-code scanner's rolling 24-bit window and
/// the set of elementary streams discovered so far.
#[derive(Debug)]
pub struct DemuxContext {
    header_state: u32,
    streams: Vec<DiscoveredStream>,
}

impl Default for DemuxContext {
    fn default() -> Self {
        Self::new()
    }
}

impl DemuxContext {
    pub fn new() -> Self {
        DemuxContext {
            header_state: 0xFF,
            streams: Vec::new(),
        }
    }

    /// Resets the start-code scanner. Consumes no bytes from the input.
    pub fn read_header(&mut self) {
        self.header_state = 0xFF;
    }

    pub fn streams(&self) -> &[DiscoveredStream] {
        &self.streams
    }

    /// Produces exactly one elementary-stream packet, skipping pack/system
    /// headers, padding, and unknown start codes along the way.
    pub fn read_packet<Src: ByteSource>(&mut self, src: &mut Src) -> Result<AvPacket> {
        loop {
            let code = self.next_start_code(src)?;
            let id_byte = (code & 0xFF) as u8;

            match id_byte {
                _ if code == PACK_START_CODE || code == SYSTEM_HEADER_START_CODE => continue,
                b if b == (PADDING_STREAM & 0xFF) as u8 || b == (PRIVATE_STREAM_2 & 0xFF) as u8 => {
                    let len = src.get_be16()?;
                    src.url_fskip(len as u64)?;
                }
                b if b == (PRIVATE_STREAM_1 & 0xFF) as u8 => {
                    if let Some(packet) = self.read_private_stream1_packet(src)? {
                        return Ok(packet);
                    }
                }
                b if (AUDIO_STREAM_MIN..=AUDIO_STREAM_MAX).contains(&b) => {
                    if let Some(packet) = self.read_pes_packet(src, b, CodecType::Audio, CodecId::Mp2)? {
                        return Ok(packet);
                    }
                }
                b if (VIDEO_STREAM_MIN..=VIDEO_STREAM_MAX).contains(&b) => {
                    if let Some(packet) = self.read_pes_packet(src, b, CodecType::Video, CodecId::Mpeg1Video)? {
                        return Ok(packet);
                    }
                }
                _ => {
                    warn!(start_code = format!("0x{code:06X}"), "resyncing past unrecognized start code");
                }
            }
        }
    }

    fn next_start_code<Src: ByteSource>(&mut self, src: &mut Src) -> Result<u32> {
        let mut budget = MAX_SYNC_SIZE;
        loop {
            if budget == 0 {
                return Err(eof_error());
            }
            let b = src.get_byte()?;
            self.header_state = ((self.header_state << 8) | b as u32) & 0x00FF_FFFF;
            budget -= 1;
            if self.header_state == 0x0000_01 {
                let last = src.get_byte()?;
                return Ok(0x0000_0100 | last as u32);
            }
        }
    }

    fn effective_index(&mut self, id: u8, codec_type: CodecType, codec_id: CodecId) -> usize {
        if let Some(i) = self.streams.iter().position(|s| s.id == id) {
            return i;
        }
        self.streams.push(DiscoveredStream { id, codec_type, codec_id });
        self.streams.len() - 1
    }

    fn read_pes_packet<Src: ByteSource>(
        &mut self,
        src: &mut Src,
        id: u8,
        codec_type: CodecType,
        codec_id: CodecId,
    ) -> Result<Option<AvPacket>> {
        let (len, pts) = parse_pes_header(src)?;
        let payload = src.get_buffer(len)?;
        let stream_index = self.effective_index(id, codec_type, codec_id);
        trace!(stream_id = id, len, pts, "demuxed PES packet");
        Ok(Some(AvPacket {
            stream_index,
            stream_id: id,
            payload,
            pts,
        }))
    }

    fn read_private_stream1_packet<Src: ByteSource>(&mut self, src: &mut Src) -> Result<Option<AvPacket>> {
        // The encoder's declared PES length already excludes the 1-byte
        // sub-id and, for AC-3, the 3-byte sub-header (mux.rs subtracts
        // `subheader_len` from `payload_size` before computing it) — so
        // `len` here is already the true elementary payload size and must
        // not be reduced further for the bytes read below.
        let (len, pts) = parse_pes_header(src)?;
        let sub_id = src.get_byte()?;

        let is_ac3 = (AC3_SUBID_MIN..=AC3_SUBID_MAX).contains(&sub_id);
        if is_ac3 {
            src.url_fskip(3)?;
        }

        if is_ac3 {
            let stream_index = self.effective_index(sub_id, CodecType::Audio, CodecId::Ac3);
            let payload = src.get_buffer(len)?;
            trace!(stream_id = sub_id, len, pts, "demuxed private-stream-1 (AC-3) packet");
            Ok(Some(AvPacket {
                stream_index,
                stream_id: sub_id,
                payload,
                pts,
            }))
        } else {
            warn!(sub_id, "skipping an unrecognized private-stream-1 sub-id");
            src.url_fskip(len as u64)?;
            Ok(None)
        }
    }
}

/// Consumes a PES header after its 6-byte start-code+length prefix: stuffing
/// bytes, an optional buffer-scale field, and the PTS (or PTS+DTS, decoding
/// only PTS) in either MPEG-1 or MPEG-2 shape.
///
/// Returns the number of elementary-payload bytes remaining after the
/// header and the decoded PTS (0 if the header carried none).
fn parse_pes_header<Src: ByteSource>(src: &mut Src) -> Result<(usize, i64)> {
    let mut len: i32 = src.get_be16()? as i32;

    let mut c = src.get_byte()?;
    len -= 1;
    while c == 0xFF {
        c = src.get_byte()?;
        len -= 1;
    }

    if (c & 0xC0) == 0x40 {
        src.get_byte()?;
        len -= 1;
        c = src.get_byte()?;
        len -= 1;
    }

    let mut pts: i64 = 0;

    if (c & 0xF0) == 0x20 {
        let mut bytes = [0u8; 5];
        bytes[0] = c;
        bytes[1..].copy_from_slice(&src.get_buffer(4)?);
        pts = decode_timestamp(&bytes) as i64;
        len -= 4;
    } else if (c & 0xF0) == 0x30 {
        let mut bytes = [0u8; 5];
        bytes[0] = c;
        bytes[1..].copy_from_slice(&src.get_buffer(4)?);
        pts = decode_timestamp(&bytes) as i64;
        len -= 4;
        src.url_fskip(5)?;
        len -= 5;
    } else if (c & 0xC0) == 0x80 {
        if (c & 0x30) != 0 {
            return Err(PsError::EncryptedStream);
        }
        let flags = src.get_byte()?;
        len -= 1;
        let header_len = src.get_byte()? as i32;
        len -= 1;
        let mut remaining = header_len;

        // Reproduces the source's dangling-if: the PTS+DTS check is a
        // sibling of the PTS-only check, not its `else`, so malformed flags
        // (0x40 without 0x80) would still read a spurious timestamp.
        if flags & 0x80 != 0 {
            let bytes: [u8; 5] = src.get_buffer(5)?.try_into().map_err(|_| eof_error())?;
            pts = decode_timestamp(&bytes) as i64;
            remaining -= 5;
            len -= 5;
        }
        if flags & 0x40 != 0 {
            src.url_fskip(5)?;
            remaining -= 5;
            len -= 5;
        }

        if remaining > 0 {
            src.url_fskip(remaining as u64)?;
            len -= remaining;
        }
    }

    Ok((len.max(0) as usize, pts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::SliceSource;

    #[test]
    fn decodes_the_spec_seed_pts_only_header() {
        // len=5: the 5-byte PTS-only field `21 00 01 00 01` itself, no
        // trailing elementary payload in this isolated header-only fixture.
        let mut src = SliceSource::new(vec![0x00, 0x05, 0x21, 0x00, 0x01, 0x00, 0x01]);
        let (len, pts) = parse_pes_header(&mut src).unwrap();
        assert_eq!(pts, 0);
        assert_eq!(len, 0);
    }

    #[test]
    fn mpeg2_encrypted_flags_are_rejected() {
        let mut src = SliceSource::new(vec![0x00, 0x03, 0x90, 0x00, 0x00]);
        let err = parse_pes_header(&mut src).unwrap_err();
        assert!(matches!(err, PsError::EncryptedStream));
    }

    #[test]
    fn mpeg2_pts_only_header_decodes_and_skips_remaining_header_bytes() {
        // flags=0x80 (PTS only), header_len=5 (just the PTS field).
        let mut src = SliceSource::new(vec![0x00, 0x07, 0x80, 0x80, 0x05, 0x21, 0x00, 0x01, 0x00, 0x01]);
        let (len, pts) = parse_pes_header(&mut src).unwrap();
        assert_eq!(pts, 0);
        assert_eq!(len, 0);
    }

    #[test]
    fn stuffing_bytes_are_consumed_before_the_pts() {
        let mut src = SliceSource::new(vec![0x00, 0x07, 0xFF, 0xFF, 0x21, 0x00, 0x01, 0x00, 0x01]);
        let (len, pts) = parse_pes_header(&mut src).unwrap();
        assert_eq!(pts, 0);
        assert_eq!(len, 0);
    }

    #[test]
    fn padding_stream_is_skipped_without_emitting_a_packet() {
        let mut data = vec![0x00, 0x00, 0x01, 0xBE, 0x00, 0x02, 0xAA, 0xBB];
        // len = header(5) + payload(4) = 9.
        data.extend_from_slice(&[0x00, 0x00, 0x01, 0xC0, 0x00, 0x09, 0x21, 0x00, 0x01, 0x00, 0x01]);
        data.extend_from_slice(b"abcd");
        let mut src = SliceSource::new(data);
        let mut ctx = DemuxContext::new();
        let packet = ctx.read_packet(&mut src).unwrap();
        assert_eq!(packet.stream_id, 0xC0);
        assert_eq!(packet.payload, b"abcd");
        assert_eq!(packet.pts, 0);
    }

    #[test]
    fn discovers_an_audio_stream_on_first_sight() {
        // len = header(5) + payload(2) = 7.
        let mut data = vec![0x00, 0x00, 0x01, 0xC0, 0x00, 0x07, 0x21, 0x00, 0x01, 0x00, 0x01];
        data.extend_from_slice(b"ab");
        let mut src = SliceSource::new(data);
        let mut ctx = DemuxContext::new();
        let packet = ctx.read_packet(&mut src).unwrap();
        assert_eq!(packet.stream_index, 0);
        assert_eq!(ctx.streams().len(), 1);
        assert_eq!(ctx.streams()[0].codec_id, CodecId::Mp2);
    }

    #[test]
    fn ac3_private_stream1_payload_starts_after_the_4_byte_sub_header() {
        // len = header(5) + payload(2) = 7; the encoder's declared length
        // excludes the 1-byte sub-id and 3-byte AC-3 sub-header that follow.
        let mut data = vec![0x00, 0x00, 0x01, 0xBD, 0x00, 0x07, 0x21, 0x00, 0x01, 0x00, 0x01, 0x80, 0x01, 0x00, 0x02];
        data.extend_from_slice(b"XY");
        let mut src = SliceSource::new(data);
        let mut ctx = DemuxContext::new();
        let packet = ctx.read_packet(&mut src).unwrap();
        assert_eq!(packet.stream_id, 0x80);
        assert_eq!(packet.payload, b"XY");
    }

    #[test]
    fn start_code_scanner_resyncs_past_noise() {
        let mut data = vec![0x00, 0x11, 0x22, 0x00, 0x00, 0x01];
        data.push(0xC0);
        data.extend_from_slice(&[0x00, 0x03, 0x21, 0x00, 0x01, 0x00, 0x01]);
        let mut src = SliceSource::new(data);
        let mut ctx = DemuxContext::new();
        let code = ctx.next_start_code(&mut src).unwrap();
        assert_eq!(code, 0x0000_01C0);
    }
}
