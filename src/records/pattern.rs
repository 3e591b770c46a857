//! Pattern record - trig masks and parameter locks

use super::TRACKS;

/// Maximum steps per pattern.
pub const MAX_STEPS: u8 = 64;

/// Parameter-lock rows the device can store per pattern.
pub const MAX_LOCK_ROWS: usize = 9;

/// Capacity of the lock definition table on the wire (pairs of
/// track/param bytes; unused pairs carry the 0xFF sentinel).
pub const LOCK_DEF_SLOTS: usize = 32;

/// Linked-kit sentinel: pattern carries no kit association.
pub const NO_KIT_LINK: u8 = 0x7F;

/// One parameter-lock row: a (track, param) target and one value per
/// step. 0xFF in a value slot means "no lock on this step".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRow {
    pub track: u8,
    pub param: u8,
    pub values: [u8; MAX_STEPS as usize],
}

impl LockRow {
    pub fn new(track: u8, param: u8) -> Self {
        Self {
            track,
            param,
            values: [0xFF; MAX_STEPS as usize],
        }
    }
}

/// A pattern for one of the 128 pattern slots.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternRecord {
    pub slot: u8,
    /// Active step count, 1..=64.
    pub steps: u8,
    /// Tempo scaling selector (device-defined small integer).
    pub tempo_multiplier: u8,
    /// Trig bitmask per track; bit 0 is step 0.
    pub trigs: [u64; TRACKS],
    pub accents: u64,
    pub slides: u64,
    pub swings: u64,
    pub accent_amount: u8,
    pub swing_amount: u8,
    /// Up to [`MAX_LOCK_ROWS`] parameter-lock rows.
    pub locks: Vec<LockRow>,
    /// Kit slot this pattern recalls, or [`NO_KIT_LINK`].
    pub kit_link: u8,
}

impl PatternRecord {
    pub fn trig_set(&self, track: usize, step: u8) -> bool {
        self.trigs[track] & (1u64 << step) != 0
    }

    pub fn set_trig(&mut self, track: usize, step: u8, on: bool) {
        if on {
            self.trigs[track] |= 1u64 << step;
        } else {
            self.trigs[track] &= !(1u64 << step);
        }
    }
}

impl Default for PatternRecord {
    fn default() -> Self {
        Self {
            slot: 0,
            steps: 16,
            tempo_multiplier: 0,
            trigs: [0; TRACKS],
            accents: 0,
            slides: 0,
            swings: 0,
            accent_amount: 32,
            swing_amount: 50,
            locks: Vec::new(),
            kit_link: NO_KIT_LINK,
        }
    }
}
