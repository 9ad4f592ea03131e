//! The three Program Stream container flavours and their derived constants.

use std::fmt;

/// Which of the three output shapes a [`Profile`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileKind {
    /// MPEG-1 Systems, 2048-byte packets.
    Mpeg1System,
    /// Video CD, 2324-byte sectors, pack+system header on every packet.
    Mpeg1Vcd,
    /// DVD Video Object, MPEG-2 PS with a PES header extension byte.
    Mpeg2Vob,
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProfileKind::Mpeg1System => "mpeg1-system",
            ProfileKind::Mpeg1Vcd => "mpeg1-vcd",
            ProfileKind::Mpeg2Vob => "mpeg2-vob",
        };
        f.write_str(name)
    }
}

/// Immutable configuration shared by the mux and demux for one of the three
/// container flavours. Constructed once from the aggregate bit rate of the
/// streams it will carry, then never mutated.
#[derive(Debug, Clone, Copy)]
pub struct Profile {
    pub kind: ProfileKind,
    pub packet_size: u16,
    pub pack_header_freq: u32,
    pub system_header_freq: u32,
    pub mux_rate: u32,
}

impl Profile {
    pub fn is_mpeg2(&self) -> bool {
        matches!(self.kind, ProfileKind::Mpeg2Vob)
    }

    pub fn is_vcd(&self) -> bool {
        matches!(self.kind, ProfileKind::Mpeg1Vcd)
    }

    /// Builds a profile for `kind` from the aggregate bit rate (bits/second)
    /// of every elementary stream it will carry.
    pub fn new(kind: ProfileKind, total_bit_rate: u64) -> Self {
        let packet_size: u16 = if kind == ProfileKind::Mpeg1Vcd { 2324 } else { 2048 };

        let pack_header_freq = if matches!(kind, ProfileKind::Mpeg1Vcd | ProfileKind::Mpeg2Vob) {
            1
        } else {
            ((2 * total_bit_rate) / (packet_size as u64 * 8)).max(1) as u32
        };

        let system_header_freq = if kind == ProfileKind::Mpeg1Vcd {
            40 * pack_header_freq
        } else {
            5 * pack_header_freq
        };

        // ceil((total_bit_rate + 2000) / 400), in 50-byte/s units.
        let mux_rate = ((total_bit_rate + 2000 + 399) / 400) as u32;

        Profile {
            kind,
            packet_size,
            pack_header_freq,
            system_header_freq,
            mux_rate,
        }
    }

    pub fn mpeg1_system(total_bit_rate: u64) -> Self {
        Profile::new(ProfileKind::Mpeg1System, total_bit_rate)
    }

    pub fn vcd(total_bit_rate: u64) -> Self {
        Profile::new(ProfileKind::Mpeg1Vcd, total_bit_rate)
    }

    pub fn mpeg2_vob(total_bit_rate: u64) -> Self {
        Profile::new(ProfileKind::Mpeg2Vob, total_bit_rate)
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (packet_size={}, pack_header_freq={}, system_header_freq={}, mux_rate={})",
            self.kind, self.packet_size, self.pack_header_freq, self.system_header_freq, self.mux_rate
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mpeg1_system_packet_size_is_2048() {
        let p = Profile::mpeg1_system(128_000);
        assert_eq!(p.packet_size, 2048);
        assert!(!p.is_vcd());
        assert!(!p.is_mpeg2());
    }

    #[test]
    fn vcd_uses_2324_byte_sectors_and_header_every_packet() {
        let p = Profile::vcd(128_000 + 1_150_000);
        assert_eq!(p.packet_size, 2324);
        assert_eq!(p.pack_header_freq, 1);
        assert_eq!(p.system_header_freq, 40);
        assert!(p.is_vcd());
    }

    #[test]
    fn mpeg2_vob_forces_header_every_packet() {
        let p = Profile::mpeg2_vob(4_000_000);
        assert_eq!(p.pack_header_freq, 1);
        assert_eq!(p.system_header_freq, 5);
        assert!(p.is_mpeg2());
    }

    #[test]
    fn pack_header_freq_derived_from_bit_rate_and_clamped_to_at_least_one() {
        // 2*128000 / (2048*8) = 15
        let p = Profile::mpeg1_system(128_000);
        assert_eq!(p.pack_header_freq, 15);
        assert_eq!(p.system_header_freq, 75);

        // A degenerate near-zero bit rate must not divide the frequency to zero.
        let p0 = Profile::mpeg1_system(0);
        assert_eq!(p0.pack_header_freq, 1);
    }

    #[test]
    fn mux_rate_is_ceiling_divided_into_50_byte_units() {
        let p = Profile::mpeg1_system(128_000);
        // ceil((128000+2000)/400) = ceil(325) = 325
        assert_eq!(p.mux_rate, 325);
    }
}
