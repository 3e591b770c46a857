//! Pattern codec (kinds 0x67/0x68)

use crate::records::{
    DumpType, LockRow, PatternRecord, LOCK_DEF_SLOTS, MAX_LOCK_ROWS, MAX_STEPS, NO_KIT_LINK,
    TRACKS,
};
use crate::wire::Frame;

use super::{check_dump, start_dump, BodyReader, CodecError, PATTERN_MESSAGE_LEN};

const VERSION: u8 = 0x03;
const REVISION: u8 = 0x01;

const TRIG_TABLE_RAW: usize = TRACKS * 8; // 128
const TRIG_TABLE_PACKED: usize = 147;
const STEP_MASK_RAW: usize = 8;
const STEP_MASK_PACKED: usize = 10;
const LOCK_DEF_RAW: usize = LOCK_DEF_SLOTS * 2; // 64
const LOCK_DEF_PACKED: usize = 74;
const LOCK_VAL_RAW: usize = MAX_LOCK_ROWS * MAX_STEPS as usize; // 576
const LOCK_VAL_PACKED: usize = 659;

/// Unassigned entry in the lock definition table.
const DEF_UNUSED: u8 = 0xFF;

/// Encode a pattern record.
pub fn encode_pattern(record: &PatternRecord) -> Vec<u8> {
    let mut b = start_dump(DumpType::Pattern, VERSION, REVISION, record.slot);

    b.put_u7(record.steps.clamp(1, MAX_STEPS));
    b.put_u7(record.tempo_multiplier);

    let mut trig_table = [0u8; TRIG_TABLE_RAW];
    for (i, &mask) in record.trigs.iter().enumerate() {
        trig_table[i * 8..i * 8 + 8].copy_from_slice(&mask.to_le_bytes());
    }
    b.put_packed(&trig_table, TRIG_TABLE_PACKED);

    for mask in [record.accents, record.slides, record.swings] {
        b.put_packed(&mask.to_le_bytes(), STEP_MASK_PACKED);
    }

    b.put_u7(record.accent_amount);
    b.put_u7(record.swing_amount);

    let mut defs = [DEF_UNUSED; LOCK_DEF_RAW];
    let mut values = [DEF_UNUSED; LOCK_VAL_RAW];
    for (i, row) in record.locks.iter().take(MAX_LOCK_ROWS).enumerate() {
        defs[i * 2] = row.track.min(TRACKS as u8 - 1);
        defs[i * 2 + 1] = row.param & 0x7F;
        values[i * MAX_STEPS as usize..(i + 1) * MAX_STEPS as usize]
            .copy_from_slice(&row.values);
    }
    b.put_packed(&defs, LOCK_DEF_PACKED);
    b.put_packed(&values, LOCK_VAL_PACKED);

    b.put_u7(if record.kit_link <= DumpType::Kit.max_slot() {
        record.kit_link
    } else {
        NO_KIT_LINK
    });

    b.finish_dump()
}

/// Decode a pattern dump frame.
pub fn decode_pattern(frame: &Frame) -> Result<PatternRecord, CodecError> {
    let (_version, _revision, slot, body) =
        check_dump(frame, DumpType::Pattern, PATTERN_MESSAGE_LEN)?;
    let mut r = BodyReader::new(body);

    let steps = r.u7()?.clamp(1, MAX_STEPS);
    let tempo_multiplier = r.u7()?;

    let trig_table = r.unpack(TRIG_TABLE_RAW, TRIG_TABLE_PACKED)?;
    let mut trigs = [0u64; TRACKS];
    for (i, mask) in trigs.iter_mut().enumerate() {
        *mask = u64::from_le_bytes(trig_table[i * 8..i * 8 + 8].try_into().unwrap());
    }

    let mut step_masks = [0u64; 3];
    for mask in step_masks.iter_mut() {
        let raw = r.unpack(STEP_MASK_RAW, STEP_MASK_PACKED)?;
        *mask = u64::from_le_bytes(raw.as_slice().try_into().unwrap());
    }

    let accent_amount = r.u7()?;
    let swing_amount = r.u7()?;

    let defs = r.unpack(LOCK_DEF_RAW, LOCK_DEF_PACKED)?;
    let values = r.unpack(LOCK_VAL_RAW, LOCK_VAL_PACKED)?;
    let mut locks = Vec::new();
    for i in 0..MAX_LOCK_ROWS {
        let track = defs[i * 2];
        if track == DEF_UNUSED {
            continue;
        }
        let mut row = LockRow::new(track.min(TRACKS as u8 - 1), defs[i * 2 + 1] & 0x7F);
        row.values
            .copy_from_slice(&values[i * MAX_STEPS as usize..(i + 1) * MAX_STEPS as usize]);
        locks.push(row);
    }

    let raw_link = r.u7()?;
    let kit_link = if raw_link <= DumpType::Kit.max_slot() {
        raw_link
    } else {
        NO_KIT_LINK
    };

    Ok(PatternRecord {
        slot,
        steps,
        tempo_multiplier,
        trigs,
        accents: step_masks[0],
        slides: step_masks[1],
        swings: step_masks[2],
        accent_amount,
        swing_amount,
        locks,
        kit_link,
    })
}
