//! The single "current search" slot shared by the two monitors.
//!
//! Writes replace the whole record behind an `Arc`, so a reader sees either a
//! complete record or nothing. Only the `SearchPublisher` can write, and there
//! is exactly one of it per slot.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::models::SearchRecord;

type Slot = Arc<RwLock<Option<Arc<SearchRecord>>>>;

pub fn search_slot() -> (SearchPublisher, SearchReader) {
    let slot: Slot = Arc::new(RwLock::new(None));
    (
        SearchPublisher {
            slot: Arc::clone(&slot),
        },
        SearchReader { slot },
    )
}

/// Write side of the slot, owned by the search monitor.
pub struct SearchPublisher {
    slot: Slot,
}

impl SearchPublisher {
    pub fn publish(&self, record: SearchRecord) -> Arc<SearchRecord> {
        let record = Arc::new(record);
        *write(&self.slot) = Some(Arc::clone(&record));
        record
    }
}

/// Read side of the slot; cheap to clone and safe to use from any thread.
#[derive(Clone)]
pub struct SearchReader {
    slot: Slot,
}

impl SearchReader {
    pub fn current(&self) -> Option<Arc<SearchRecord>> {
        read(&self.slot).clone()
    }

    /// An owned copy, detached from later publishes. Used to label captures
    /// that are still being processed when the search changes.
    pub fn snapshot(&self) -> Option<SearchRecord> {
        read(&self.slot).as_deref().cloned()
    }
}

fn read(slot: &Slot) -> RwLockReadGuard<'_, Option<Arc<SearchRecord>>> {
    match slot.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write(slot: &Slot) -> RwLockWriteGuard<'_, Option<Arc<SearchRecord>>> {
    match slot.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
