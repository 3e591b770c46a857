//! Wire module - SysEx framing for the Machinedrum protocol
//!
//! Every message is a SysEx frame:
//! - 1 byte start marker (0xF0)
//! - 5 byte vendor/product prefix
//! - 1 byte message kind
//! - variable payload, every byte <= 0x7F
//! - 1 byte end marker (0xF7)
//!
//! Dump payloads end with a 14-bit checksum and a 14-bit length field,
//! each split into two 7-bit bytes.

mod frame;

pub use frame::*;

/// SysEx start-of-frame marker.
pub const SYSEX_START: u8 = 0xF0;

/// SysEx end-of-frame marker.
pub const SYSEX_END: u8 = 0xF7;

/// Prefix on every Machinedrum dump/request frame: Elektron vendor id,
/// Machinedrum product id, base channel placeholder.
pub const MD_PREFIX: [u8; 5] = [0x00, 0x20, 0x3C, 0x02, 0x00];

/// Prefix on TurboMIDI frames (vendor id, generic product).
pub const TURBO_PREFIX: [u8; 5] = [0x00, 0x20, 0x3C, 0x00, 0x00];

/// MIDI Active Sensing - the single-byte keepalive for an elevated link.
pub const ACTIVE_SENSE: u8 = 0xFE;

/// Dump and request message kinds.
pub mod kind {
    pub const GLOBAL_DUMP: u8 = 0x50;
    pub const GLOBAL_REQUEST: u8 = 0x51;
    pub const KIT_DUMP: u8 = 0x52;
    pub const KIT_REQUEST: u8 = 0x53;
    pub const PATTERN_DUMP: u8 = 0x67;
    pub const PATTERN_REQUEST: u8 = 0x68;
    pub const SONG_DUMP: u8 = 0x69;
    pub const SONG_REQUEST: u8 = 0x6A;
}

/// TurboMIDI message kinds.
pub mod turbo_kind {
    /// Generic capability request / answer pair.
    pub const SPEED_REQUEST: u8 = 0x10;
    pub const SPEED_ANSWER: u8 = 0x11;
    /// Generic negotiation / acknowledgement pair.
    pub const SPEED_NEGOTIATE: u8 = 0x12;
    pub const SPEED_ACK: u8 = 0x13;
    /// Vendor path: query / reply / set of the raw speed index.
    pub const SPEED_QUERY: u8 = 0x20;
    pub const SPEED_REPLY: u8 = 0x21;
    pub const SPEED_SET: u8 = 0x22;
}

/// Split a 14-bit value into two 7-bit bytes, high first.
pub fn split_u14(value: u16) -> [u8; 2] {
    [((value >> 7) & 0x7F) as u8, (value & 0x7F) as u8]
}

/// Join two 7-bit bytes (high first) into a 14-bit value.
pub fn join_u14(hi: u8, lo: u8) -> u16 {
    (u16::from(hi & 0x7F) << 7) | u16::from(lo & 0x7F)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u14_roundtrip() {
        for value in [0u16, 1, 0x7F, 0x80, 2880, 0x3FFF] {
            let [hi, lo] = split_u14(value);
            assert!(hi < 0x80 && lo < 0x80);
            assert_eq!(join_u14(hi, lo), value);
        }
    }

    #[test]
    fn test_u14_masks_high_bits() {
        assert_eq!(join_u14(0xFF, 0xFF), 0x3FFF);
    }
}
