//! Per-elementary-stream state and the descriptor a caller uses to declare
//! a stream at mux/demux init.

use crate::constants::{AUDIO_MAX_BUFFER_SIZE, MAX_PAYLOAD, VIDEO_MAX_BUFFER_SIZE};
use crate::ticker::Ticker;

/// Coarse media kind of an elementary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecType {
    Audio,
    Video,
}

/// Elementary codec identity. Only the codecs this container format actually
/// discriminates on the wire (by PES id range) are represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    Mpeg1Video,
    Mp2,
    Ac3,
}

/// What a caller supplies to declare one elementary stream at `MuxContext::init`.
#[derive(Debug, Clone, Copy)]
pub struct StreamDescriptor {
    pub codec_type: CodecType,
    pub codec_id: CodecId,
    /// Audio only.
    pub sample_rate: u32,
    /// Audio only: samples per encoded frame.
    pub frame_size: u32,
    /// Video only: fixed-point fps, scaled by [`crate::constants::FRAME_RATE_BASE`].
    pub frame_rate: u32,
    /// Bits per second, used to derive `Profile::mux_rate` and header frequencies.
    pub bit_rate: u32,
}

impl StreamDescriptor {
    pub fn mpeg1_video(frame_rate: u32, bit_rate: u32) -> Self {
        StreamDescriptor {
            codec_type: CodecType::Video,
            codec_id: CodecId::Mpeg1Video,
            sample_rate: 0,
            frame_size: 0,
            frame_rate,
            bit_rate,
        }
    }

    pub fn mp2_audio(sample_rate: u32, frame_size: u32, bit_rate: u32) -> Self {
        StreamDescriptor {
            codec_type: CodecType::Audio,
            codec_id: CodecId::Mp2,
            sample_rate,
            frame_size,
            frame_rate: 0,
            bit_rate,
        }
    }

    pub fn ac3_audio(sample_rate: u32, frame_size: u32, bit_rate: u32) -> Self {
        StreamDescriptor {
            codec_type: CodecType::Audio,
            codec_id: CodecId::Ac3,
            sample_rate,
            frame_size,
            frame_rate: 0,
            bit_rate,
        }
    }
}

/// Per-stream mux-side state: the working fill buffer, PES id, and PTS
/// accumulator. Buffers are allocated once at init and reused across packets.
#[derive(Debug)]
pub struct StreamState {
    pub id: u8,
    pub codec_type: CodecType,
    pub codec_id: CodecId,
    pub buffer: Vec<u8>,
    pub fill: usize,
    pub max_buffer_size: u32,
    pub pts: i64,
    /// PTS of the first byte currently buffered. `None` is the "unset" sentinel.
    pub start_pts: Option<i64>,
    pub ticker: Ticker,
    pub packet_number: u64,
}

impl StreamState {
    pub fn new(id: u8, codec_type: CodecType, codec_id: CodecId, ticker: Ticker) -> Self {
        let max_buffer_size = match codec_type {
            CodecType::Audio => AUDIO_MAX_BUFFER_SIZE,
            CodecType::Video => VIDEO_MAX_BUFFER_SIZE,
        };
        StreamState {
            id,
            codec_type,
            codec_id,
            buffer: Vec::with_capacity(MAX_PAYLOAD),
            fill: 0,
            max_buffer_size,
            pts: 0,
            start_pts: None,
            ticker,
            packet_number: 0,
        }
    }

    /// The STD buffer size field as it is packed into the system header:
    /// scaled by 128 for audio, 1024 for video.
    pub fn buffer_size_scaled(&self) -> u32 {
        match self.codec_type {
            CodecType::Audio => self.max_buffer_size / 128,
            CodecType::Video => self.max_buffer_size / 1024,
        }
    }

    /// Whether this stream's wire id is carried as a private-stream-1 sub-id
    /// rather than its own PES start code (true for AC-3).
    pub fn is_private_stream1_subid(&self) -> bool {
        self.id < crate::constants::AUDIO_STREAM_MIN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_buffer_size_scales_by_128() {
        let s = StreamState::new(0xC0, CodecType::Audio, CodecId::Mp2, Ticker::audio(44_100, 1152));
        assert_eq!(s.max_buffer_size, 4096);
        assert_eq!(s.buffer_size_scaled(), 32);
    }

    #[test]
    fn video_buffer_size_scales_by_1024() {
        let s = StreamState::new(0xE0, CodecType::Video, CodecId::Mpeg1Video, Ticker::video(25_000_000));
        assert_eq!(s.max_buffer_size, 47104);
        assert_eq!(s.buffer_size_scaled(), 46);
    }

    #[test]
    fn ac3_id_is_recognized_as_a_private_stream1_subid() {
        let s = StreamState::new(0x80, CodecType::Audio, CodecId::Ac3, Ticker::audio(48_000, 1536));
        assert!(s.is_private_stream1_subid());
    }

    #[test]
    fn mp2_and_video_ids_are_not_private_stream1_subids() {
        let a = StreamState::new(0xC0, CodecType::Audio, CodecId::Mp2, Ticker::audio(44_100, 1152));
        let v = StreamState::new(0xE0, CodecType::Video, CodecId::Mpeg1Video, Ticker::video(25_000_000));
        assert!(!a.is_private_stream1_subid());
        assert!(!v.is_private_stream1_subid());
    }
}
