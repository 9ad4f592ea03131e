//! Format descriptors exported to the outer container-format registry.
//!
//! This module is a pure data export: four static records describing the
//! container flavours and demuxer variant this crate implements. The outer
//! registry (out of scope for this crate) owns process-wide registration;
//! this crate only hands it the facts.

use std::fmt;

use crate::profile::ProfileKind;
use crate::stream::CodecId;

/// One entry in the outer registry: everything it needs to know about a
/// container flavour without reaching into this crate's internals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDescriptor {
    /// Short registry name, e.g. `"mpeg"`.
    pub name: &'static str,
    /// MIME type advertised for this format.
    pub mime_type: &'static str,
    /// Comma-separated default file extensions, empty if the format has none.
    pub extensions: &'static str,
    /// Bytes of private per-stream data the muxer needs up front (none here).
    pub private_data_size: usize,
    /// The profile this descriptor drives the mux side with, `None` for a
    /// demux-only descriptor.
    pub mux_profile: Option<ProfileKind>,
    /// Preferred audio codec for streams that don't specify one.
    pub preferred_audio_codec: CodecId,
    /// Preferred video codec for streams that don't specify one.
    pub preferred_video_codec: CodecId,
    /// Whether this descriptor requires no file-level header to be present
    /// before demuxing can begin (the `NOHEADER` demuxer variant).
    pub no_header: bool,
}

impl fmt::Display for FormatDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, ext: {})", self.name, self.mime_type, self.extensions)
    }
}

/// MPEG-1 Systems output: `.mpg`/`.mpeg`, 2048-byte packets.
pub const MPEG1_SYSTEM: FormatDescriptor = FormatDescriptor {
    name: "mpeg",
    mime_type: "video/x-mpeg",
    extensions: "mpg,mpeg",
    private_data_size: 0,
    mux_profile: Some(ProfileKind::Mpeg1System),
    preferred_audio_codec: CodecId::Mp2,
    preferred_video_codec: CodecId::Mpeg1Video,
    no_header: false,
};

/// Video CD output: fixed 2324-byte sectors, no conventional extension.
pub const VCD: FormatDescriptor = FormatDescriptor {
    name: "vcd",
    mime_type: "video/x-mpeg",
    extensions: "",
    private_data_size: 0,
    mux_profile: Some(ProfileKind::Mpeg1Vcd),
    preferred_audio_codec: CodecId::Mp2,
    preferred_video_codec: CodecId::Mpeg1Video,
    no_header: false,
};

/// DVD Video Object output: MPEG-2 Program Stream, `.vob`.
pub const VOB: FormatDescriptor = FormatDescriptor {
    name: "vob",
    mime_type: "video/x-mpeg",
    extensions: "vob",
    private_data_size: 0,
    mux_profile: Some(ProfileKind::Mpeg2Vob),
    preferred_audio_codec: CodecId::Ac3,
    preferred_video_codec: CodecId::Mpeg1Video,
    no_header: false,
};

/// The demuxer, registered separately from the three mux profiles: it has no
/// single output profile and accepts input without requiring a recognized
/// file-level header first.
pub const DEMUXER: FormatDescriptor = FormatDescriptor {
    name: "mpeg",
    mime_type: "video/x-mpeg",
    extensions: "mpg,mpeg,vob",
    private_data_size: 0,
    mux_profile: None,
    preferred_audio_codec: CodecId::Mp2,
    preferred_video_codec: CodecId::Mpeg1Video,
    no_header: true,
};

/// The four records this crate hands to the outer registry at init.
pub const ALL: [FormatDescriptor; 4] = [MPEG1_SYSTEM, VCD, VOB, DEMUXER];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_descriptors_are_exported() {
        assert_eq!(ALL.len(), 4);
    }

    #[test]
    fn only_the_demuxer_descriptor_has_no_header_set() {
        assert!(ALL.iter().filter(|d| d.no_header).count() == 1);
        assert!(DEMUXER.no_header);
        assert!(!MPEG1_SYSTEM.no_header && !VCD.no_header && !VOB.no_header);
    }

    #[test]
    fn mux_descriptors_carry_a_distinct_profile_kind_each() {
        assert_eq!(MPEG1_SYSTEM.mux_profile, Some(ProfileKind::Mpeg1System));
        assert_eq!(VCD.mux_profile, Some(ProfileKind::Mpeg1Vcd));
        assert_eq!(VOB.mux_profile, Some(ProfileKind::Mpeg2Vob));
        assert_eq!(DEMUXER.mux_profile, None);
    }

    #[test]
    fn display_includes_name_mime_and_extensions() {
        let s = MPEG1_SYSTEM.to_string();
        assert!(s.contains("mpeg"));
        assert!(s.contains("video/x-mpeg"));
        assert!(s.contains("mpg,mpeg"));
    }
}
