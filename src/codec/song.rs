//! Song codec (kinds 0x69/0x6A)
//!
//! The only variable-length dump: after the name, the row list travels
//! as a single 7-bit packed block of 10-byte raw rows, terminated by an
//! explicit END row. Control rows reuse the musical-data byte positions
//! for their own fields.

use crate::packing;
use crate::records::{
    DumpType, SongRecord, SongRow, NO_KIT_CHANGE, ROW_END, ROW_HALT, ROW_JUMP, ROW_LOOP,
    ROW_RAW_LEN,
};
use crate::wire::Frame;

use super::{check_dump, name_from_bytes, name_to_bytes, start_dump, BodyReader, CodecError,
    SONG_MIN_MESSAGE_LEN};

const VERSION: u8 = 0x02;
const REVISION: u8 = 0x01;

const NAME_LEN: usize = 16;

fn row_to_raw(row: &SongRow) -> [u8; ROW_RAW_LEN] {
    let mut raw = [0u8; ROW_RAW_LEN];
    match row {
        SongRow::Pattern {
            pattern,
            kit,
            tempo,
            mutes,
            start,
            end,
        } => {
            raw[0] = pattern & 0x7F;
            raw[1] = if *kit <= DumpType::Kit.max_slot() {
                *kit
            } else {
                NO_KIT_CHANGE
            };
            raw[2..4].copy_from_slice(&(tempo & 0x3FFF).to_be_bytes());
            raw[4..6].copy_from_slice(&mutes.to_be_bytes());
            raw[6] = start & 0x7F;
            raw[7] = end & 0x7F;
        }
        SongRow::Loop { target, repeats } => {
            raw[0] = ROW_LOOP;
            raw[1] = *target;
            raw[2] = *repeats;
        }
        SongRow::Jump { target } => {
            raw[0] = ROW_JUMP;
            raw[1] = *target;
        }
        SongRow::Halt => {
            raw[0] = ROW_HALT;
        }
    }
    raw
}

fn row_from_raw(raw: &[u8]) -> SongRow {
    match raw[0] {
        ROW_LOOP => SongRow::Loop {
            target: raw[1],
            repeats: raw[2],
        },
        ROW_JUMP => SongRow::Jump { target: raw[1] },
        ROW_HALT => SongRow::Halt,
        first => SongRow::Pattern {
            pattern: first & 0x7F,
            kit: if raw[1] <= DumpType::Kit.max_slot() {
                raw[1]
            } else {
                NO_KIT_CHANGE
            },
            tempo: u16::from_be_bytes([raw[2], raw[3]]) & 0x3FFF,
            mutes: u16::from_be_bytes([raw[4], raw[5]]),
            start: raw[6] & 0x7F,
            end: raw[7] & 0x7F,
        },
    }
}

/// Encode a song record. The END row is appended automatically.
pub fn encode_song(record: &SongRecord) -> Vec<u8> {
    let mut b = start_dump(DumpType::Song, VERSION, REVISION, record.slot);

    b.put_slice(&name_to_bytes(&record.name, NAME_LEN));

    let mut raw = Vec::with_capacity((record.rows.len() + 1) * ROW_RAW_LEN);
    for row in &record.rows {
        raw.extend_from_slice(&row_to_raw(row));
    }
    let mut end = [0u8; ROW_RAW_LEN];
    end[0] = ROW_END;
    raw.extend_from_slice(&end);

    let packed = packing::pack(&raw);
    b.put_packed(&raw, packed.len());

    b.finish_dump()
}

/// Decode a song dump frame. A row list with no END row is truncated.
pub fn decode_song(frame: &Frame) -> Result<SongRecord, CodecError> {
    let (_version, _revision, slot, body) =
        check_dump(frame, DumpType::Song, SONG_MIN_MESSAGE_LEN)?;
    let mut r = BodyReader::new(body);

    let name = name_from_bytes(r.take(NAME_LEN)?);

    let packed = r.rest();
    let raw = packing::unpack(packed, packing::max_raw_len(packed.len()));

    let mut rows = Vec::new();
    let mut terminated = false;
    for chunk in raw.chunks_exact(ROW_RAW_LEN) {
        if chunk[0] == ROW_END {
            terminated = true;
            break;
        }
        rows.push(row_from_raw(chunk));
    }
    if !terminated {
        return Err(CodecError::Truncated {
            expected: (rows.len() + 1) * ROW_RAW_LEN,
            actual: raw.len(),
        });
    }

    Ok(SongRecord { slot, name, rows })
}
