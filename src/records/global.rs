//! Global settings record

use super::TRACKS;

/// MIDI base channel sentinel: channel handling disabled. Kept distinct
/// from channel 0 and preserved across decode/encode.
pub const CHANNEL_OFF: u8 = 0x7F;

/// Size of the note keymap table (one entry per MIDI note).
pub const KEYMAP_LEN: usize = 128;

/// Sync and program-change behaviour flags, one wire byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncFlags {
    pub clock_in: bool,
    pub clock_out: bool,
    pub transport_in: bool,
    pub transport_out: bool,
    pub program_change_in: bool,
    pub program_change_out: bool,
}

impl SyncFlags {
    pub fn to_bits(self) -> u8 {
        let mut bits = 0u8;
        if self.clock_in {
            bits |= 0x01;
        }
        if self.clock_out {
            bits |= 0x02;
        }
        if self.transport_in {
            bits |= 0x04;
        }
        if self.transport_out {
            bits |= 0x08;
        }
        if self.program_change_in {
            bits |= 0x10;
        }
        if self.program_change_out {
            bits |= 0x20;
        }
        bits
    }

    pub fn from_bits(bits: u8) -> Self {
        Self {
            clock_in: bits & 0x01 != 0,
            clock_out: bits & 0x02 != 0,
            transport_in: bits & 0x04 != 0,
            transport_out: bits & 0x08 != 0,
            program_change_in: bits & 0x10 != 0,
            program_change_out: bits & 0x20 != 0,
        }
    }
}

/// Global settings for one of the eight global slots.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalRecord {
    pub slot: u8,
    /// Audio output assignment per track (0-6).
    pub drum_routing: [u8; TRACKS],
    /// MIDI note to track/pattern mapping.
    pub keymap: [u8; KEYMAP_LEN],
    /// MIDI base channel 0-15, or [`CHANNEL_OFF`].
    pub midi_base_channel: u8,
    /// Tempo in BPM. Stored on the wire as `round(bpm * 24)`, 14-bit.
    pub tempo: f32,
    pub sync: SyncFlags,
}

impl Default for GlobalRecord {
    fn default() -> Self {
        Self {
            slot: 0,
            drum_routing: [0; TRACKS],
            keymap: [0; KEYMAP_LEN],
            midi_base_channel: CHANNEL_OFF,
            tempo: 120.0,
            sync: SyncFlags::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_flags_roundtrip() {
        let flags = SyncFlags {
            clock_in: true,
            clock_out: false,
            transport_in: true,
            transport_out: false,
            program_change_in: false,
            program_change_out: true,
        };
        assert_eq!(SyncFlags::from_bits(flags.to_bits()), flags);
    }

    #[test]
    fn test_default_channel_is_off_sentinel() {
        let rec = GlobalRecord::default();
        assert_eq!(rec.midi_base_channel, CHANNEL_OFF);
        assert_ne!(CHANNEL_OFF, 0);
        assert!(CHANNEL_OFF > 15);
    }
}
