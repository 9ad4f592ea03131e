//! Start codes, stream-id ranges and sizing constants for the Program Stream
//! wire format. Mirrors the layout in ISO/IEC 11172-1 and the MPEG-2 Systems
//! extension, restricted to the subset this crate emits and accepts.

/// Pack header start code.
pub const PACK_START_CODE: u32 = 0x0000_01BA;
/// System header start code.
pub const SYSTEM_HEADER_START_CODE: u32 = 0x0000_01BB;
/// Program Stream Map start code (not parsed; out of scope).
pub const PROGRAM_STREAM_MAP: u32 = 0x0000_01BC;
/// Private-stream-1 start code: carries AC-3 and other non-MPEG payloads
/// behind a one-byte sub-id.
pub const PRIVATE_STREAM_1: u32 = 0x0000_01BD;
/// Padding stream start code.
pub const PADDING_STREAM: u32 = 0x0000_01BE;
/// Private-stream-2 start code.
pub const PRIVATE_STREAM_2: u32 = 0x0000_01BF;
/// End-of-stream code appended to the last packet of the last stream.
pub const ISO_11172_END_CODE: u32 = 0x0000_01B9;

/// Inclusive id range for MPEG audio (MP2) elementary streams.
pub const AUDIO_STREAM_MIN: u8 = 0xC0;
pub const AUDIO_STREAM_MAX: u8 = 0xDF;
/// Inclusive id range for MPEG video elementary streams.
pub const VIDEO_STREAM_MIN: u8 = 0xE0;
pub const VIDEO_STREAM_MAX: u8 = 0xEF;
/// Inclusive sub-id range private-stream-1 uses for AC-3.
pub const AC3_SUBID_MIN: u8 = 0x80;
pub const AC3_SUBID_MAX: u8 = 0x9F;

/// Per-call budget for the start-code scanner before it gives up with an
/// I/O end-of-stream error.
pub const MAX_SYNC_SIZE: usize = 100_000;

/// Pack header body length in bytes, after the 4-byte start code.
pub const PACK_HEADER_BODY_LEN: usize = 8;
/// Fixed portion of the system header body, after the 4-byte start code and
/// 2-byte length field: rate_bound/audio_bound/flags/video_bound/reserved.
pub const SYSTEM_HEADER_FIXED_BODY_LEN: usize = 6;
/// Per-stream entry length within the system header body.
pub const SYSTEM_HEADER_STREAM_ENTRY_LEN: usize = 3;

/// Fixed-point denominator applied to `frame_rate` in a [`crate::stream::StreamDescriptor`]:
/// `frame_rate` is `fps * FRAME_RATE_BASE`, rounded to the nearest integer.
pub const FRAME_RATE_BASE: u32 = 1_000_000;

/// Minimum working-buffer capacity for a stream's fill buffer.
pub const MAX_PAYLOAD: usize = 4096;
/// STD buffer size advertised for audio streams in the system header, before
/// the /128 scale factor is applied.
pub const AUDIO_MAX_BUFFER_SIZE: u32 = 4 * 1024;
/// STD buffer size advertised for video streams in the system header, before
/// the /1024 scale factor is applied.
pub const VIDEO_MAX_BUFFER_SIZE: u32 = 46 * 1024;

/// Leading nibble shared by the pack header's SCR field and a PES header's
/// PTS-only field, per ISO/IEC 11172-1.
pub const TIMESTAMP_MARKER_NIBBLE: u32 = 0b0010;
/// MPEG-2 PES header extension bytes emitted before the PTS field
/// (`'10'` flags, no escr/dsm-trick/additional-copy/crc/extension, header
/// data length 5).
pub const MPEG2_PES_EXTENSION: [u8; 3] = [0x80, 0x80, 0x05];
/// Fixed AC-3 private-stream-1 sub-header following the sub-id byte.
pub const AC3_SUBHEADER: [u8; 3] = [0x01, 0x00, 0x02];

/// Ceiling used by [`crate::probe::probe`], matching the convention that a
/// confident-but-not-absolute prober returns `MAX - 1` so that a more
/// specific prober can still outrank it on a tie.
pub const PROBE_SCORE_MAX: u8 = 100;
