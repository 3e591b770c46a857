//! Codec module - encode/decode between records and wire messages
//!
//! One codec per dump type, sharing the header/trailer conventions:
//! every dump payload is `version, revision, slot, <fields>, chkHi,
//! chkLo, lenHi, lenLo`. Checksums are always computed when encoding;
//! decode ignores them unless [`verify_checksum`] is called explicitly
//! (the device itself never validates inbound checksums).

mod global;
mod kit;
mod pattern;
mod song;

pub use global::*;
pub use kit::*;
pub use pattern::*;
pub use song::*;

use thiserror::Error;

use crate::packing;
use crate::records::{DumpRecord, DumpType};
use crate::wire::{join_u14, Frame, FrameBuilder, MD_PREFIX};

/// Total frame length of a Global dump, markers included.
pub const GLOBAL_MESSAGE_LEN: usize = 182;
/// Total frame length of a Kit dump, markers included.
pub const KIT_MESSAGE_LEN: usize = 0x4D1;
/// Total frame length of a Pattern dump, markers included.
pub const PATTERN_MESSAGE_LEN: usize = 930;
/// Smallest possible Song dump (empty row list), markers included.
pub const SONG_MIN_MESSAGE_LEN: usize = 43;

/// Codec errors. Range and format problems with a safe default are
/// clamped during decode instead of surfacing here.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Message truncated: {actual} bytes, expected at least {expected}")]
    Truncated { expected: usize, actual: usize },

    #[error("Wrong message kind: 0x{actual:02X}, expected 0x{expected:02X}")]
    WrongKind { expected: u8, actual: u8 },

    #[error("Frame does not carry the Machinedrum prefix")]
    ForeignFrame,

    #[error("Checksum mismatch: stored 0x{stored:04X}, computed 0x{computed:04X}")]
    ChecksumMismatch { stored: u16, computed: u16 },
}

/// Encode any record through its type's codec.
pub fn encode_record(record: &DumpRecord) -> Vec<u8> {
    match record {
        DumpRecord::Global(r) => encode_global(r),
        DumpRecord::Kit(r) => encode_kit(r),
        DumpRecord::Pattern(r) => encode_pattern(r),
        DumpRecord::Song(r) => encode_song(r),
    }
}

/// Decode a dump frame through the codec matching `dump_type`.
pub fn decode_record(dump_type: DumpType, frame: &Frame) -> Result<DumpRecord, CodecError> {
    Ok(match dump_type {
        DumpType::Global => DumpRecord::Global(decode_global(frame)?),
        DumpType::Kit => DumpRecord::Kit(decode_kit(frame)?),
        DumpType::Pattern => DumpRecord::Pattern(decode_pattern(frame)?),
        DumpType::Song => DumpRecord::Song(decode_song(frame)?),
    })
}

/// Build a dump request frame for one slot. The slot must already be
/// validated; it is additionally masked to the type's bit-width.
pub fn encode_request(dump_type: DumpType, slot: u8) -> Vec<u8> {
    let mut b = FrameBuilder::new(MD_PREFIX, dump_type.request_kind());
    b.put_masked(slot & dump_type.slot_mask());
    b.finish()
}

/// Recompute a dump frame's checksum and compare it against the stored
/// field. Opt-in: the device never validates inbound checksums, so
/// callers enable this explicitly via configuration.
pub fn verify_checksum(frame: &Frame) -> Result<(), CodecError> {
    let payload = frame.payload();
    if payload.len() < 7 {
        return Err(CodecError::Truncated {
            expected: 7,
            actual: payload.len(),
        });
    }
    let body = &payload[3..payload.len() - 4];
    let computed = body
        .iter()
        .fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)) & 0x3FFF);
    let stored = join_u14(payload[payload.len() - 4], payload[payload.len() - 3]);
    if stored != computed {
        return Err(CodecError::ChecksumMismatch { stored, computed });
    }
    Ok(())
}

/// Validate the frame envelope of a dump and return
/// `(version, revision, slot, body)` where `body` spans the bytes
/// between the slot byte and the checksum field.
pub(crate) fn check_dump(
    frame: &Frame,
    dump_type: DumpType,
    min_frame_len: usize,
) -> Result<(u8, u8, u8, &[u8]), CodecError> {
    if !frame.is_md() {
        return Err(CodecError::ForeignFrame);
    }
    if frame.kind() != dump_type.dump_kind() {
        return Err(CodecError::WrongKind {
            expected: dump_type.dump_kind(),
            actual: frame.kind(),
        });
    }
    if frame.len() < min_frame_len {
        return Err(CodecError::Truncated {
            expected: min_frame_len,
            actual: frame.len(),
        });
    }
    // The declared length covers slot byte through checksum low byte;
    // for the frame to be complete it must match the surrounding bytes.
    let min_declared = (min_frame_len - 12) as u16;
    match frame.declared_len() {
        Some(declared) if declared >= min_declared => {}
        Some(declared) => {
            return Err(CodecError::Truncated {
                expected: min_declared as usize,
                actual: declared as usize,
            });
        }
        None => {
            return Err(CodecError::Truncated {
                expected: min_frame_len,
                actual: frame.len(),
            });
        }
    }

    let payload = frame.payload();
    let version = payload[0];
    let revision = payload[1];
    let slot = dump_type.clamp_slot(payload[2] & dump_type.slot_mask());
    let body = &payload[3..payload.len() - 4];
    Ok((version, revision, slot, body))
}

/// Start a dump frame: header, version, revision, slot, checksum mark.
pub(crate) fn start_dump(dump_type: DumpType, version: u8, revision: u8, slot: u8) -> FrameBuilder {
    let mut b = FrameBuilder::new(MD_PREFIX, dump_type.dump_kind());
    b.put_u7(version)
        .put_u7(revision)
        .put_masked(dump_type.clamp_slot(slot) & dump_type.slot_mask())
        .mark_checksum();
    b
}

/// Sequential reader over a dump body. Every `take` that runs past the
/// end is a truncation error.
pub(crate) struct BodyReader<'a> {
    body: &'a [u8],
    pos: usize,
}

impl<'a> BodyReader<'a> {
    pub fn new(body: &'a [u8]) -> Self {
        Self { body, pos: 0 }
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.pos + n > self.body.len() {
            return Err(CodecError::Truncated {
                expected: self.pos + n,
                actual: self.body.len(),
            });
        }
        let out = &self.body[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn u7(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0] & 0x7F)
    }

    pub fn u14(&mut self) -> Result<u16, CodecError> {
        let b = self.take(2)?;
        Ok(join_u14(b[0], b[1]))
    }

    /// Read a fixed packed field and unpack it to its raw length.
    pub fn unpack(&mut self, raw_len: usize, encoded_len: usize) -> Result<Vec<u8>, CodecError> {
        let packed = self.take(encoded_len)?;
        let raw = packing::unpack(packed, raw_len);
        if raw.len() < raw_len {
            return Err(CodecError::Truncated {
                expected: raw_len,
                actual: raw.len(),
            });
        }
        Ok(raw)
    }

    /// Remaining unread bytes.
    pub fn rest(&mut self) -> &'a [u8] {
        let out = &self.body[self.pos..];
        self.pos = self.body.len();
        out
    }
}

/// Read a 7-bit ASCII, NUL-padded name field.
pub(crate) fn name_from_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take_while(|&&b| b != 0)
        .map(|&b| (b & 0x7F) as char)
        .collect()
}

/// Write a name into a fixed-size NUL-padded field.
pub(crate) fn name_to_bytes(name: &str, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    for (dst, ch) in out.iter_mut().zip(name.chars()) {
        *dst = if ch.is_ascii() && ch != '\0' {
            ch as u8 & 0x7F
        } else {
            b'?'
        };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::GlobalRecord;

    #[test]
    fn test_request_frames_mask_slot() {
        let bytes = encode_request(DumpType::Global, 7);
        assert_eq!(bytes[6], DumpType::Global.request_kind());
        assert_eq!(bytes[7], 7);

        // A wild slot byte still goes out within the bit-width.
        let bytes = encode_request(DumpType::Song, 0xFF);
        assert_eq!(bytes[7], 0x1F);
    }

    #[test]
    fn test_verify_checksum_accepts_own_output() {
        let frame = Frame::parse(encode_global(&GlobalRecord::default())).unwrap();
        verify_checksum(&frame).unwrap();
    }

    #[test]
    fn test_verify_checksum_detects_corruption() {
        let mut bytes = encode_global(&GlobalRecord::default());
        let n = bytes.len();
        bytes[n - 10] ^= 0x01; // flip a body bit
        let frame = Frame::parse(bytes).unwrap();
        assert!(matches!(
            verify_checksum(&frame),
            Err(CodecError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_checksum_is_14_bit_sum_of_body() {
        let frame = Frame::parse(encode_global(&GlobalRecord::default())).unwrap();
        let p = frame.payload();
        let body = &p[3..p.len() - 4];
        let sum = body
            .iter()
            .fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)) & 0x3FFF);
        assert_eq!(join_u14(p[p.len() - 4], p[p.len() - 3]), sum);
    }

    #[test]
    fn test_name_field_roundtrip_and_fallback() {
        let bytes = name_to_bytes("BD KIT", 16);
        assert_eq!(bytes.len(), 16);
        assert_eq!(name_from_bytes(&bytes), "BD KIT");

        let bytes = name_to_bytes("Ænima", 16);
        assert_eq!(name_from_bytes(&bytes), "?nima");
    }
}
