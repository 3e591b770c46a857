//! 7-bit packing for SysEx payloads
//!
//! SysEx payload bytes must stay below 0x80, so oversized 8-bit blocks
//! travel in groups of seven: one header byte carrying the top bit of
//! each byte in the group, followed by the seven low-bit-stripped bytes.
//! A short final group is zero-padded on the wire.

/// Pack an 8-bit byte sequence into a 7-bit-safe sequence.
///
/// Each group of up to 7 input bytes becomes 1 header byte plus the
/// group, so `n` raw bytes encode to `n + ceil(n / 7)` bytes.
pub fn pack(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(packed_len(raw.len()));

    for group in raw.chunks(7) {
        let mut header = 0u8;
        for (k, &byte) in group.iter().enumerate() {
            if byte & 0x80 != 0 {
                header |= 0x40 >> k;
            }
        }
        out.push(header);
        for &byte in group {
            out.push(byte & 0x7F);
        }
    }

    out
}

/// Unpack a 7-bit-safe sequence back into raw 8-bit bytes.
///
/// Stops after producing `needed_raw_len` bytes or when `packed` runs
/// out, whichever comes first. A short result is not an error here;
/// callers that required the full length must treat it as truncation.
pub fn unpack(packed: &[u8], needed_raw_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(needed_raw_len);

    for group in packed.chunks(8) {
        let header = group[0];
        for (k, &byte) in group[1..].iter().enumerate() {
            if out.len() == needed_raw_len {
                return out;
            }
            let high = if header & (0x40 >> k) != 0 { 0x80 } else { 0 };
            out.push((byte & 0x7F) | high);
        }
    }

    out
}

/// Encoded length for a raw block of `raw_len` bytes.
pub fn packed_len(raw_len: usize) -> usize {
    raw_len + raw_len.div_ceil(7)
}

/// Largest raw length a packed block of `packed_len` bytes can hold.
pub fn max_raw_len(packed_len: usize) -> usize {
    let full = (packed_len / 8) * 7;
    let rem = packed_len % 8;
    full + rem.saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_exhaustive_lengths() {
        for len in 0..64usize {
            let raw: Vec<u8> = (0..len).map(|i| (i * 37 + 11) as u8).collect();
            let packed = pack(&raw);
            assert!(packed.iter().all(|&b| b < 0x80), "len {}", len);
            assert_eq!(unpack(&packed, raw.len()), raw, "len {}", len);
        }
    }

    #[test]
    fn test_high_bits_land_in_header() {
        // 7 bytes all with the top bit set: header carries all of them.
        let raw = [0xFFu8; 7];
        let packed = pack(&raw);
        assert_eq!(packed.len(), 8);
        assert_eq!(packed[0], 0x7F & (0x40 | 0x20 | 0x10 | 0x08 | 0x04 | 0x02 | 0x01));
        assert!(packed[1..].iter().all(|&b| b == 0x7F));
    }

    #[test]
    fn test_documented_length_pairs() {
        // The kit machine table and LFO table sizes.
        assert_eq!(packed_len(64), 74);
        assert_eq!(packed_len(576), 659);
        assert_eq!(packed_len(128), 147);
        assert_eq!(packed_len(8), 10);
    }

    #[test]
    fn test_short_input_yields_short_output() {
        let raw = [0x80u8, 0x01, 0x82];
        let packed = pack(&raw);
        // Drop the last packed byte: one raw byte is unrecoverable.
        let short = unpack(&packed[..packed.len() - 1], raw.len());
        assert_eq!(short, &raw[..2]);
    }

    #[test]
    fn test_max_raw_len_matches_packed_len() {
        for raw in 0..200usize {
            assert_eq!(max_raw_len(packed_len(raw)), raw);
        }
    }

    #[test]
    fn test_unpack_stops_at_needed_len() {
        let raw: Vec<u8> = (0..21).map(|i| i as u8 | 0x80).collect();
        let packed = pack(&raw);
        assert_eq!(unpack(&packed, 5), &raw[..5]);
    }
}
