//! Song record - a row list with control rows

/// Raw (pre-packing) size of one song row on the wire.
pub const ROW_RAW_LEN: usize = 10;

/// Reserved first-byte sentinels distinguishing control rows from
/// pattern rows (pattern slots occupy 0x00..=0x7F).
pub const ROW_END: u8 = 0xFF;
pub const ROW_LOOP: u8 = 0xFE;
pub const ROW_JUMP: u8 = 0xFD;
pub const ROW_HALT: u8 = 0xFC;

/// Kit byte sentinel: row changes no kit.
pub const NO_KIT_CHANGE: u8 = 0xFF;

/// One song row. Control rows carry their own embedded fields instead
/// of musical data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SongRow {
    /// Play a pattern slice.
    Pattern {
        pattern: u8,
        /// Kit to recall, or [`NO_KIT_CHANGE`].
        kit: u8,
        /// Tempo override, `round(bpm * 24)`; 0 keeps the current tempo.
        tempo: u16,
        /// Track mute bitmask.
        mutes: u16,
        /// First and last step of the slice to play.
        start: u8,
        end: u8,
    },
    /// Jump back to `target` and repeat the span `repeats` times.
    Loop { target: u8, repeats: u8 },
    /// Unconditional jump to `target`.
    Jump { target: u8 },
    /// Stop playback here.
    Halt,
}

/// A song for one of the 32 song slots. The terminating END row is
/// implicit; `rows` holds only the playable/control rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongRecord {
    pub slot: u8,
    pub name: String,
    pub rows: Vec<SongRow>,
}

impl Default for SongRecord {
    fn default() -> Self {
        Self {
            slot: 0,
            name: String::new(),
            rows: Vec::new(),
        }
    }
}
