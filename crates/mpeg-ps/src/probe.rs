//! Heuristic container sniffer: does `prefix` look like a Program Stream?

use crate::constants::{
    AUDIO_STREAM_MAX, AUDIO_STREAM_MIN, PACK_START_CODE, PADDING_STREAM, PRIVATE_STREAM_1,
    PRIVATE_STREAM_2, PROBE_SCORE_MAX, PROGRAM_STREAM_MAP, SYSTEM_HEADER_START_CODE,
    VIDEO_STREAM_MAX, VIDEO_STREAM_MIN,
};

/// Scores `prefix` as Program Stream input.
///
/// Returns [`PROBE_SCORE_MAX`] `- 1` if the very first 24-bit start code in
/// `prefix` is one this container format would itself dispatch on, `0`
/// otherwise. The score deliberately stops one short of the maximum so a
/// prober with stronger evidence (e.g. a declared file extension) can still
/// outrank this one on a tie.
pub fn probe(prefix: &[u8]) -> u8 {
    if prefix.len() < 4 {
        return 0;
    }
    if &prefix[0..3] != [0x00, 0x00, 0x01] {
        return 0;
    }
    let id = prefix[3];
    let code = 0x0000_0100u32 | id as u32;

    let is_known = code == PACK_START_CODE
        || code == SYSTEM_HEADER_START_CODE
        || code == PROGRAM_STREAM_MAP
        || code == PRIVATE_STREAM_1
        || code == PRIVATE_STREAM_2
        || code == PADDING_STREAM
        || (AUDIO_STREAM_MIN..=AUDIO_STREAM_MAX).contains(&id)
        || (VIDEO_STREAM_MIN..=VIDEO_STREAM_MAX).contains(&id);

    if is_known { PROBE_SCORE_MAX - 1 } else { 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_a_pack_start_code_prefix() {
        assert_eq!(probe(&[0x00, 0x00, 0x01, 0xBA, 0x11, 0x22]), PROBE_SCORE_MAX - 1);
    }

    #[test]
    fn rejects_an_mpeg_ts_sync_byte_prefix() {
        assert_eq!(probe(&[0x47, 0x40, 0x00, 0x10]), 0);
    }

    #[test]
    fn accepts_an_audio_stream_start_code_prefix() {
        assert_eq!(probe(&[0x00, 0x00, 0x01, 0xC0]), PROBE_SCORE_MAX - 1);
    }

    #[test]
    fn accepts_a_video_stream_start_code_prefix() {
        assert_eq!(probe(&[0x00, 0x00, 0x01, 0xE0]), PROBE_SCORE_MAX - 1);
    }

    #[test]
    fn rejects_a_short_prefix() {
        assert_eq!(probe(&[0x00, 0x00, 0x01]), 0);
    }

    #[test]
    fn rejects_a_program_stream_map_start_code_as_a_bare_dispatch_but_still_a_known_code() {
        // PROGRAM_STREAM_MAP is a known PS start code even though this crate
        // never parses its body; probing only looks at the first start code.
        assert_eq!(probe(&[0x00, 0x00, 0x01, 0xBC]), PROBE_SCORE_MAX - 1);
    }
}
