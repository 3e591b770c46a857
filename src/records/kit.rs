//! Kit record - 16 track sounds plus master effects

use super::TRACKS;

/// Parameters per page (synthesis, effects, routing).
pub const PARAMS_PER_PAGE: usize = 8;

/// Raw size of one per-track LFO block on the wire.
pub const LFO_BLOCK_LEN: usize = 36;

/// Kit format version at and above which machine words carry a 14-bit
/// machine id plus the tonal flag in bit 31. Older dumps store a 7-bit
/// legacy id instead (see [`machine::from_legacy`]).
pub const MODERN_KIT_VERSION: u8 = 0x40;

/// Trig/mute group sentinel: no group assigned.
pub const GROUP_OFF: u8 = 0x7F;

/// Machine id lookup tables.
pub mod machine {
    /// The silent placeholder machine; safe default for any unknown id.
    pub const GND_EMPTY: u16 = 0;

    /// Valid machine id ranges, inclusive: GND, TRX, EFM, E12, P-I, ROM.
    const VALID_RANGES: &[(u16, u16)] = &[
        (0, 3),
        (16, 31),
        (32, 47),
        (48, 63),
        (64, 73),
        (96, 127),
    ];

    /// Legacy (pre-0x40 kit format) 7-bit id to modern id. Ids past the
    /// table are unknown and fall back to GND.
    pub const LEGACY_REMAP: [u16; 32] = [
        0, 1, 2, 3, // GND group kept in place
        16, 17, 18, 19, 20, 21, 22, 23, // TRX drums
        24, 25, 26, 27, 28, 29, 30, 31, // TRX percussion
        32, 33, 34, 35, 36, 37, 38, 39, // EFM drums
        48, 49, 50, 51, // E12 start
    ];

    pub fn is_valid(id: u16) -> bool {
        VALID_RANGES.iter().any(|&(lo, hi)| id >= lo && id <= hi)
    }

    /// Clamp an id to a valid one; unknown ids become GND.
    pub fn clamp(id: u16) -> u16 {
        if is_valid(id) {
            id
        } else {
            GND_EMPTY
        }
    }

    /// Remap a legacy 7-bit machine id to its modern id.
    pub fn from_legacy(id: u8) -> u16 {
        LEGACY_REMAP
            .get(usize::from(id))
            .copied()
            .unwrap_or(GND_EMPTY)
    }

    /// Inverse remap for writing legacy-format kits. Machines the old
    /// format cannot express fall back to GND.
    pub fn to_legacy(id: u16) -> u8 {
        LEGACY_REMAP
            .iter()
            .position(|&m| m == id)
            .unwrap_or(0) as u8
    }
}

/// Per-track LFO settings. The trailing state block is opaque device
/// state carried through unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lfo {
    pub dest_track: u8,
    pub dest_param: u8,
    pub shape_a: u8,
    pub shape_b: u8,
    pub update_mode: u8,
    pub speed: u8,
    pub depth: u8,
    pub mix: u8,
    pub state: [u8; LFO_BLOCK_LEN - 8],
}

impl Lfo {
    pub fn to_bytes(&self) -> [u8; LFO_BLOCK_LEN] {
        let mut out = [0u8; LFO_BLOCK_LEN];
        out[0] = self.dest_track;
        out[1] = self.dest_param;
        out[2] = self.shape_a;
        out[3] = self.shape_b;
        out[4] = self.update_mode;
        out[5] = self.speed;
        out[6] = self.depth;
        out[7] = self.mix;
        out[8..].copy_from_slice(&self.state);
        out
    }

    pub fn from_bytes(bytes: &[u8; LFO_BLOCK_LEN]) -> Self {
        let mut state = [0u8; LFO_BLOCK_LEN - 8];
        state.copy_from_slice(&bytes[8..]);
        Self {
            dest_track: bytes[0],
            dest_param: bytes[1],
            shape_a: bytes[2],
            shape_b: bytes[3],
            update_mode: bytes[4],
            speed: bytes[5],
            depth: bytes[6],
            mix: bytes[7],
            state,
        }
    }
}

impl Default for Lfo {
    fn default() -> Self {
        Self {
            dest_track: 0,
            dest_param: 0,
            shape_a: 0,
            shape_b: 0,
            update_mode: 0,
            speed: 64,
            depth: 0,
            mix: 0,
            state: [0; LFO_BLOCK_LEN - 8],
        }
    }
}

/// One track's sound: machine selection and three parameter pages.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSound {
    pub machine: u16,
    pub tonal: bool,
    pub synthesis: [u8; PARAMS_PER_PAGE],
    pub effects: [u8; PARAMS_PER_PAGE],
    pub routing: [u8; PARAMS_PER_PAGE],
    pub level: u8,
    pub lfo: Lfo,
}

impl Default for TrackSound {
    fn default() -> Self {
        Self {
            machine: machine::GND_EMPTY,
            tonal: false,
            synthesis: [64; PARAMS_PER_PAGE],
            effects: [0; PARAMS_PER_PAGE],
            routing: [64; PARAMS_PER_PAGE],
            level: 100,
            lfo: Lfo::default(),
        }
    }
}

/// Master effect blocks, eight bytes each.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MasterFx {
    pub delay: [u8; 8],
    pub reverb: [u8; 8],
    pub eq: [u8; 8],
    pub dynamics: [u8; 8],
}

/// A full kit for one of the 64 kit slots.
#[derive(Debug, Clone, PartialEq)]
pub struct KitRecord {
    pub slot: u8,
    /// Format version as found in the dump; controls machine-word
    /// interpretation on re-encode.
    pub version: u8,
    pub name: String,
    pub tracks: [TrackSound; TRACKS],
    pub master_fx: MasterFx,
    /// Per track: companion track triggered together, or [`GROUP_OFF`].
    pub trig_groups: [u8; TRACKS],
    /// Per track: track muted together with this one, or [`GROUP_OFF`].
    pub mute_groups: [u8; TRACKS],
    pub accent_level: u8,
}

impl Default for KitRecord {
    fn default() -> Self {
        Self {
            slot: 0,
            version: MODERN_KIT_VERSION,
            name: String::new(),
            tracks: std::array::from_fn(|_| TrackSound::default()),
            master_fx: MasterFx::default(),
            trig_groups: [GROUP_OFF; TRACKS],
            mute_groups: [GROUP_OFF; TRACKS],
            accent_level: 32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_clamp_defaults_unknown_to_gnd() {
        assert_eq!(machine::clamp(16), 16);
        assert_eq!(machine::clamp(9), machine::GND_EMPTY);
        assert_eq!(machine::clamp(500), machine::GND_EMPTY);
    }

    #[test]
    fn test_legacy_remap_covers_table_and_defaults_past_it() {
        assert_eq!(machine::from_legacy(0), 0);
        assert_eq!(machine::from_legacy(4), 16);
        assert_eq!(machine::from_legacy(100), machine::GND_EMPTY);
    }

    #[test]
    fn test_legacy_remap_targets_are_valid() {
        for &id in machine::LEGACY_REMAP.iter() {
            assert!(machine::is_valid(id), "remap target {} invalid", id);
        }
    }

    #[test]
    fn test_lfo_block_roundtrip() {
        let mut lfo = Lfo::default();
        lfo.dest_track = 3;
        lfo.speed = 99;
        lfo.state[5] = 0x11;
        assert_eq!(Lfo::from_bytes(&lfo.to_bytes()), lfo);
    }
}
