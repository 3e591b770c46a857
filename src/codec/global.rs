//! Global settings codec (kinds 0x50/0x51)

use crate::records::{DumpType, GlobalRecord, SyncFlags, CHANNEL_OFF, KEYMAP_LEN, TRACKS};
use crate::wire::Frame;

use super::{check_dump, start_dump, BodyReader, CodecError, GLOBAL_MESSAGE_LEN};

const VERSION: u8 = 0x05;
const REVISION: u8 = 0x01;

/// Encoded size of the packed keymap field.
const KEYMAP_PACKED_LEN: usize = 147;

/// Highest routable output per track.
const MAX_ROUTING: u8 = 6;

/// Encode a global record. Tempo is stored as `round(bpm * 24)` in a
/// 14-bit field; routing and channel values are clamped before writing.
pub fn encode_global(record: &GlobalRecord) -> Vec<u8> {
    let mut b = start_dump(DumpType::Global, VERSION, REVISION, record.slot);

    for &out in &record.drum_routing {
        b.put_u7(out.min(MAX_ROUTING));
    }
    b.put_packed(&record.keymap, KEYMAP_PACKED_LEN);

    // 0-15 or the OFF sentinel; anything else falls back to OFF.
    let channel = if record.midi_base_channel <= 15 {
        record.midi_base_channel
    } else {
        CHANNEL_OFF
    };
    b.put_u7(channel);

    let tempo_raw = (record.tempo * 24.0).round().clamp(0.0, 0x3FFF as f32) as u16;
    b.put_u14(tempo_raw);
    b.put_u7(record.sync.to_bits());

    b.finish_dump()
}

/// Decode a global dump frame.
pub fn decode_global(frame: &Frame) -> Result<GlobalRecord, CodecError> {
    let (_version, _revision, slot, body) = check_dump(frame, DumpType::Global, GLOBAL_MESSAGE_LEN)?;
    let mut r = BodyReader::new(body);

    let mut drum_routing = [0u8; TRACKS];
    for out in drum_routing.iter_mut() {
        *out = r.u7()?.min(MAX_ROUTING);
    }

    let keymap_raw = r.unpack(KEYMAP_LEN, KEYMAP_PACKED_LEN)?;
    let mut keymap = [0u8; KEYMAP_LEN];
    keymap.copy_from_slice(&keymap_raw);

    let raw_channel = r.u7()?;
    let midi_base_channel = if raw_channel <= 15 {
        raw_channel
    } else {
        CHANNEL_OFF
    };

    let tempo = f32::from(r.u14()?) / 24.0;
    let sync = SyncFlags::from_bits(r.u7()?);

    Ok(GlobalRecord {
        slot,
        drum_routing,
        keymap,
        midi_base_channel,
        tempo,
        sync,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> GlobalRecord {
        let mut rec = GlobalRecord {
            slot: 3,
            midi_base_channel: 9,
            tempo: 135.5,
            ..Default::default()
        };
        rec.drum_routing[0] = 5;
        rec.drum_routing[15] = 2;
        for (i, k) in rec.keymap.iter_mut().enumerate() {
            *k = (i % 128) as u8;
        }
        rec.sync.clock_in = true;
        rec.sync.transport_out = true;
        rec
    }

    #[test]
    fn test_roundtrip() {
        let rec = sample();
        let frame = Frame::parse(encode_global(&rec)).unwrap();
        assert_eq!(frame.len(), GLOBAL_MESSAGE_LEN);
        assert_eq!(decode_global(&frame).unwrap(), rec);
    }

    #[test]
    fn test_tempo_120_wire_bytes() {
        // round(120 * 24) = 2880; hi = (2880 >> 7) & 0x7F, lo = 2880 & 0x7F.
        let rec = GlobalRecord {
            tempo: 120.0,
            ..Default::default()
        };
        let bytes = encode_global(&rec);
        // Tempo sits right after routing(16), keymap(147), channel(1).
        let tempo_off = 7 + 3 + 16 + 147 + 1;
        assert_eq!(bytes[tempo_off], ((2880 >> 7) & 0x7F) as u8);
        assert_eq!(bytes[tempo_off + 1], (2880 & 0x7F) as u8);

        let frame = Frame::parse(bytes).unwrap();
        assert_eq!(decode_global(&frame).unwrap().tempo, 120.0);
    }

    #[test]
    fn test_channel_off_sentinel_survives_roundtrip() {
        let rec = GlobalRecord {
            midi_base_channel: CHANNEL_OFF,
            ..Default::default()
        };
        let frame = Frame::parse(encode_global(&rec)).unwrap();
        assert_eq!(decode_global(&frame).unwrap().midi_base_channel, CHANNEL_OFF);
    }

    #[test]
    fn test_out_of_range_channel_becomes_sentinel() {
        let rec = GlobalRecord {
            midi_base_channel: 42,
            ..Default::default()
        };
        let frame = Frame::parse(encode_global(&rec)).unwrap();
        assert_eq!(decode_global(&frame).unwrap().midi_base_channel, CHANNEL_OFF);
    }

    #[test]
    fn test_routing_clamped_on_encode() {
        let mut rec = GlobalRecord::default();
        rec.drum_routing[2] = 99;
        let frame = Frame::parse(encode_global(&rec)).unwrap();
        assert_eq!(decode_global(&frame).unwrap().drum_routing[2], 6);
    }

    #[test]
    fn test_truncated_rejected() {
        let mut bytes = encode_global(&GlobalRecord::default());
        bytes.truncate(GLOBAL_MESSAGE_LEN - 40);
        bytes.push(crate::wire::SYSEX_END);
        let frame = Frame::parse(bytes).unwrap();
        assert!(matches!(
            decode_global(&frame),
            Err(CodecError::Truncated { .. })
        ));
    }
}
