//! Slot library - the commit boundary for received records
//!
//! The store itself belongs to the editor layer; the core only funnels
//! records through [`SlotLibrary::commit`]. At most one writer is
//! active per array at a time; the device facade's busy flag serializes
//! bulk against manual operations.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::records::{DumpRecord, DumpType};

/// Where decoded records land and where outbound records come from.
pub trait SlotLibrary: Send + Sync {
    /// Store a record (or clear the slot with `None`).
    fn commit(&self, dump_type: DumpType, slot: u8, record: Option<DumpRecord>);

    /// Fetch a copy of a stored record, for send-direction transfers.
    fn fetch(&self, dump_type: DumpType, slot: u8) -> Option<DumpRecord>;
}

/// A plain in-memory library, sufficient for headless use and tests.
#[derive(Default)]
pub struct MemoryLibrary {
    slots: Mutex<HashMap<(DumpType, u8), DumpRecord>>,
}

impl MemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed slots of one type.
    pub fn count(&self, dump_type: DumpType) -> usize {
        self.slots
            .lock()
            .unwrap()
            .keys()
            .filter(|(t, _)| *t == dump_type)
            .count()
    }
}

impl SlotLibrary for MemoryLibrary {
    fn commit(&self, dump_type: DumpType, slot: u8, record: Option<DumpRecord>) {
        let mut slots = self.slots.lock().unwrap();
        match record {
            Some(record) => {
                slots.insert((dump_type, slot), record);
            }
            None => {
                slots.remove(&(dump_type, slot));
            }
        }
    }

    fn fetch(&self, dump_type: DumpType, slot: u8) -> Option<DumpRecord> {
        self.slots.lock().unwrap().get(&(dump_type, slot)).cloned()
    }
}
