//! Record types - typed in-memory form of the four Machinedrum dumps
//!
//! Each record owns every device parameter for one slot. Records are
//! plain values; the editor buffer and the slot library each hold their
//! own copy, never a shared one.

mod global;
mod kit;
mod pattern;
mod song;

pub use global::*;
pub use kit::*;
pub use pattern::*;
pub use song::*;

use thiserror::Error;

use crate::wire::kind;

/// Number of tracks on the device.
pub const TRACKS: usize = 16;

/// A slot index outside the type's valid range, rejected before any
/// transmission.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Slot {slot} out of range for {dump_type:?} (max {max})")]
pub struct SlotOutOfRange {
    pub dump_type: DumpType,
    pub slot: u8,
    pub max: u8,
}

/// The four dump record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DumpType {
    Global,
    Kit,
    Pattern,
    Song,
}

impl DumpType {
    /// Highest valid slot index for this type.
    pub fn max_slot(self) -> u8 {
        match self {
            DumpType::Global => 7,
            DumpType::Kit => 63,
            DumpType::Pattern => 127,
            DumpType::Song => 31,
        }
    }

    /// Bit mask matching the slot's valid bit-width.
    pub fn slot_mask(self) -> u8 {
        match self {
            DumpType::Global => 0x07,
            DumpType::Kit => 0x3F,
            DumpType::Pattern => 0x7F,
            DumpType::Song => 0x1F,
        }
    }

    /// Clamp a slot index into range. Idempotent.
    pub fn clamp_slot(self, slot: u8) -> u8 {
        slot.min(self.max_slot())
    }

    /// Validate a slot index for an explicit request.
    pub fn check_slot(self, slot: u8) -> Result<u8, SlotOutOfRange> {
        if slot > self.max_slot() {
            return Err(SlotOutOfRange {
                dump_type: self,
                slot,
                max: self.max_slot(),
            });
        }
        Ok(slot)
    }

    /// Message kind of a dump of this type.
    pub fn dump_kind(self) -> u8 {
        match self {
            DumpType::Global => kind::GLOBAL_DUMP,
            DumpType::Kit => kind::KIT_DUMP,
            DumpType::Pattern => kind::PATTERN_DUMP,
            DumpType::Song => kind::SONG_DUMP,
        }
    }

    /// Message kind of a request for this type.
    pub fn request_kind(self) -> u8 {
        match self {
            DumpType::Global => kind::GLOBAL_REQUEST,
            DumpType::Kit => kind::KIT_REQUEST,
            DumpType::Pattern => kind::PATTERN_REQUEST,
            DumpType::Song => kind::SONG_REQUEST,
        }
    }
}

/// One record of any type.
#[derive(Debug, Clone, PartialEq)]
pub enum DumpRecord {
    Global(GlobalRecord),
    Kit(KitRecord),
    Pattern(PatternRecord),
    Song(SongRecord),
}

impl DumpRecord {
    pub fn dump_type(&self) -> DumpType {
        match self {
            DumpRecord::Global(_) => DumpType::Global,
            DumpRecord::Kit(_) => DumpType::Kit,
            DumpRecord::Pattern(_) => DumpType::Pattern,
            DumpRecord::Song(_) => DumpType::Song,
        }
    }

    /// Slot the record was captured from or is destined for.
    pub fn slot(&self) -> u8 {
        match self {
            DumpRecord::Global(r) => r.slot,
            DumpRecord::Kit(r) => r.slot,
            DumpRecord::Pattern(r) => r.slot,
            DumpRecord::Song(r) => r.slot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_is_idempotent() {
        for dt in [
            DumpType::Global,
            DumpType::Kit,
            DumpType::Pattern,
            DumpType::Song,
        ] {
            for slot in [0u8, 1, 63, 127, 200, 255] {
                let once = dt.clamp_slot(slot);
                assert_eq!(dt.clamp_slot(once), once);
                assert!(once <= dt.max_slot());
            }
        }
    }

    #[test]
    fn test_check_slot_rejects_out_of_range() {
        assert!(DumpType::Global.check_slot(7).is_ok());
        assert!(DumpType::Global.check_slot(8).is_err());
        assert!(DumpType::Song.check_slot(32).is_err());
        assert!(DumpType::Pattern.check_slot(127).is_ok());
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(DumpType::Kit.dump_kind(), kind::KIT_DUMP);
        assert_eq!(DumpType::Kit.request_kind(), kind::KIT_REQUEST);
        assert_eq!(DumpType::Song.request_kind(), kind::SONG_REQUEST);
    }
}
