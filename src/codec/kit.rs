//! Kit codec (kinds 0x52/0x53)
//!
//! Fixed-size dump, 0x4D1 bytes including the frame markers. The
//! machine table is sixteen 32-bit words; how a word is interpreted
//! depends on the dump's format version, and that branch lives in
//! exactly two functions here ([`read_machine_word`] /
//! [`write_machine_word`]) rather than being scattered.

use crate::records::{
    machine, DumpType, KitRecord, Lfo, MasterFx, TrackSound, GROUP_OFF, LFO_BLOCK_LEN,
    MODERN_KIT_VERSION, PARAMS_PER_PAGE, TRACKS,
};
use crate::wire::Frame;

use super::{check_dump, name_from_bytes, name_to_bytes, start_dump, BodyReader, CodecError,
    KIT_MESSAGE_LEN};

const REVISION: u8 = 0x01;

const NAME_LEN: usize = 16;
const MACHINE_TABLE_RAW: usize = TRACKS * 4; // 64
const MACHINE_TABLE_PACKED: usize = 74;
const LFO_TABLE_RAW: usize = TRACKS * LFO_BLOCK_LEN; // 576
const LFO_TABLE_PACKED: usize = 659;
const RESERVED_LEN: usize = 4;

/// Interpret one machine-table word under the given format version.
///
/// Modern dumps (`version >= 0x40`) carry a 14-bit machine id with the
/// tonal flag in bit 31. Legacy dumps carry a 7-bit id remapped through
/// the legacy table and have no tonal flag.
fn read_machine_word(word: u32, version: u8) -> (u16, bool) {
    if version >= MODERN_KIT_VERSION {
        let tonal = word & 0x8000_0000 != 0;
        let id = machine::clamp((word & 0x3FFF) as u16);
        (id, tonal)
    } else {
        (machine::from_legacy((word & 0x7F) as u8), false)
    }
}

/// Build one machine-table word under the given format version.
fn write_machine_word(id: u16, tonal: bool, version: u8) -> u32 {
    if version >= MODERN_KIT_VERSION {
        (u32::from(tonal) << 31) | u32::from(machine::clamp(id) & 0x3FFF)
    } else {
        u32::from(machine::to_legacy(id))
    }
}

/// Encode a kit record. All parameter bytes are clamped to 0-127.
pub fn encode_kit(record: &KitRecord) -> Vec<u8> {
    let mut b = start_dump(DumpType::Kit, record.version, REVISION, record.slot);

    b.put_slice(&name_to_bytes(&record.name, NAME_LEN));

    for track in &record.tracks {
        for &p in &track.synthesis {
            b.put_u7(p);
        }
        for &p in &track.effects {
            b.put_u7(p);
        }
        for &p in &track.routing {
            b.put_u7(p);
        }
    }

    for track in &record.tracks {
        b.put_u7(track.level);
    }

    let mut machine_table = [0u8; MACHINE_TABLE_RAW];
    for (i, track) in record.tracks.iter().enumerate() {
        let word = write_machine_word(track.machine, track.tonal, record.version);
        machine_table[i * 4..i * 4 + 4].copy_from_slice(&word.to_be_bytes());
    }
    b.put_packed(&machine_table, MACHINE_TABLE_PACKED);

    let mut lfo_table = [0u8; LFO_TABLE_RAW];
    for (i, track) in record.tracks.iter().enumerate() {
        lfo_table[i * LFO_BLOCK_LEN..(i + 1) * LFO_BLOCK_LEN]
            .copy_from_slice(&track.lfo.to_bytes());
    }
    b.put_packed(&lfo_table, LFO_TABLE_PACKED);

    for block in [
        &record.master_fx.delay,
        &record.master_fx.reverb,
        &record.master_fx.eq,
        &record.master_fx.dynamics,
    ] {
        for &v in block {
            b.put_u7(v);
        }
    }

    for &g in &record.trig_groups {
        b.put_u7(if g < TRACKS as u8 { g } else { GROUP_OFF });
    }
    for &g in &record.mute_groups {
        b.put_u7(if g < TRACKS as u8 { g } else { GROUP_OFF });
    }

    b.put_u7(record.accent_level);
    b.put_slice(&[0u8; RESERVED_LEN]);

    b.finish_dump()
}

/// Decode a kit dump frame. Anything short of the fixed message size is
/// `Truncated` and nothing is applied.
pub fn decode_kit(frame: &Frame) -> Result<KitRecord, CodecError> {
    let (version, _revision, slot, body) = check_dump(frame, DumpType::Kit, KIT_MESSAGE_LEN)?;
    let mut r = BodyReader::new(body);

    let name = name_from_bytes(r.take(NAME_LEN)?);

    let mut params = [[0u8; PARAMS_PER_PAGE * 3]; TRACKS];
    for page in params.iter_mut() {
        page.copy_from_slice(r.take(PARAMS_PER_PAGE * 3)?);
    }

    let levels = r.take(TRACKS)?.to_vec();

    let machine_table = r.unpack(MACHINE_TABLE_RAW, MACHINE_TABLE_PACKED)?;
    let lfo_table = r.unpack(LFO_TABLE_RAW, LFO_TABLE_PACKED)?;

    let mut tracks: [TrackSound; TRACKS] = std::array::from_fn(|_| TrackSound::default());
    for (i, track) in tracks.iter_mut().enumerate() {
        let word = u32::from_be_bytes(machine_table[i * 4..i * 4 + 4].try_into().unwrap());
        // The version branch happens exactly where the word is read.
        let (machine, tonal) = read_machine_word(word, version);
        track.machine = machine;
        track.tonal = tonal;

        let p = &params[i];
        track.synthesis.copy_from_slice(&p[0..8]);
        track.effects.copy_from_slice(&p[8..16]);
        track.routing.copy_from_slice(&p[16..24]);
        for v in track
            .synthesis
            .iter_mut()
            .chain(track.effects.iter_mut())
            .chain(track.routing.iter_mut())
        {
            *v &= 0x7F;
        }
        track.level = levels[i] & 0x7F;

        let block: [u8; LFO_BLOCK_LEN] = lfo_table
            [i * LFO_BLOCK_LEN..(i + 1) * LFO_BLOCK_LEN]
            .try_into()
            .unwrap();
        track.lfo = Lfo::from_bytes(&block);
    }

    let mut master_fx = MasterFx::default();
    master_fx.delay.copy_from_slice(r.take(8)?);
    master_fx.reverb.copy_from_slice(r.take(8)?);
    master_fx.eq.copy_from_slice(r.take(8)?);
    master_fx.dynamics.copy_from_slice(r.take(8)?);

    let mut trig_groups = [GROUP_OFF; TRACKS];
    for (g, &raw) in trig_groups.iter_mut().zip(r.take(TRACKS)?) {
        *g = if raw < TRACKS as u8 { raw } else { GROUP_OFF };
    }
    let mut mute_groups = [GROUP_OFF; TRACKS];
    for (g, &raw) in mute_groups.iter_mut().zip(r.take(TRACKS)?) {
        *g = if raw < TRACKS as u8 { raw } else { GROUP_OFF };
    }

    let accent_level = r.u7()?;

    Ok(KitRecord {
        slot,
        version,
        name,
        tracks,
        master_fx,
        trig_groups,
        mute_groups,
        accent_level,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::SYSEX_END;

    fn sample() -> KitRecord {
        let mut rec = KitRecord {
            slot: 17,
            name: "STEEL".to_string(),
            accent_level: 48,
            ..Default::default()
        };
        rec.tracks[0].machine = 16; // TRX kick
        rec.tracks[0].tonal = true;
        rec.tracks[0].synthesis = [1, 2, 3, 4, 5, 6, 7, 8];
        rec.tracks[0].level = 110;
        rec.tracks[5].machine = 97; // ROM
        rec.tracks[5].lfo.dest_track = 5;
        rec.tracks[5].lfo.state[10] = 0x42;
        rec.master_fx.delay = [10, 20, 30, 40, 50, 60, 70, 80];
        rec.trig_groups[0] = 1;
        rec.mute_groups[3] = 7;
        rec
    }

    #[test]
    fn test_message_is_exactly_0x4d1_bytes() {
        assert_eq!(encode_kit(&sample()).len(), 0x4D1);
    }

    #[test]
    fn test_roundtrip_modern() {
        let rec = sample();
        let frame = Frame::parse(encode_kit(&rec)).unwrap();
        assert_eq!(decode_kit(&frame).unwrap(), rec);
    }

    #[test]
    fn test_short_kit_rejected_as_truncated() {
        let mut bytes = encode_kit(&sample());
        bytes.truncate(0x4D1 - 100);
        bytes.push(SYSEX_END);
        let frame = Frame::parse(bytes).unwrap();
        assert!(matches!(
            decode_kit(&frame),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn test_unknown_machine_id_clamped_to_gnd() {
        let mut rec = sample();
        rec.tracks[2].machine = 300; // not a machine
        let frame = Frame::parse(encode_kit(&rec)).unwrap();
        assert_eq!(decode_kit(&frame).unwrap().tracks[2].machine, machine::GND_EMPTY);
    }

    #[test]
    fn test_legacy_version_remaps_machine_ids() {
        let mut rec = sample();
        rec.version = 0x20;
        rec.tracks[0].machine = 16;
        rec.tracks[0].tonal = false; // legacy words have no tonal bit
        rec.tracks[5].machine = 97;
        rec.tracks[5].tonal = false;

        let frame = Frame::parse(encode_kit(&rec)).unwrap();
        let decoded = decode_kit(&frame).unwrap();
        assert_eq!(decoded.version, 0x20);
        // 16 survives the legacy remap; 97 (ROM) is inexpressible and
        // falls back to GND.
        assert_eq!(decoded.tracks[0].machine, 16);
        assert_eq!(decoded.tracks[5].machine, machine::GND_EMPTY);
        assert!(!decoded.tracks[0].tonal);
    }

    #[test]
    fn test_tonal_flag_rides_bit_31() {
        let word = write_machine_word(16, true, MODERN_KIT_VERSION);
        assert_eq!(word & 0x8000_0000, 0x8000_0000);
        assert_eq!(read_machine_word(word, MODERN_KIT_VERSION), (16, true));

        // Same bit pattern under a legacy version reads differently.
        let (id, tonal) = read_machine_word(word, 0x10);
        assert_eq!(id, machine::from_legacy(16));
        assert!(!tonal);
    }

    #[test]
    fn test_wrong_kind_rejected() {
        let frame =
            Frame::parse(crate::codec::encode_global(&Default::default())).unwrap();
        assert!(matches!(
            decode_kit(&frame),
            Err(CodecError::WrongKind { .. })
        ));
    }

    #[test]
    fn test_params_clamped_on_encode() {
        let mut rec = sample();
        rec.tracks[1].synthesis[0] = 200;
        let frame = Frame::parse(encode_kit(&rec)).unwrap();
        assert_eq!(decode_kit(&frame).unwrap().tracks[1].synthesis[0], 0x7F);
    }
}
