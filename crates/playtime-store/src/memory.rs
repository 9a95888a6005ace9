//! In-memory store for tests

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::{LedgerSnapshot, Store, StoreError, StoreResult};

/// Keeps the last saved snapshot in memory
#[derive(Default)]
pub struct MemoryStore {
    snapshot: Mutex<Option<LedgerSnapshot>>,
    fail_saves: AtomicBool,
    save_count: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `snapshot` already saved
    pub fn with_snapshot(snapshot: LedgerSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
            ..Self::default()
        }
    }

    /// Make every following save fail with an I/O error
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }

    /// Last successfully saved snapshot
    pub fn saved(&self) -> Option<LedgerSnapshot> {
        self.snapshot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Store for MemoryStore {
    fn load_snapshot(&self) -> StoreResult<Option<LedgerSnapshot>> {
        Ok(self.saved())
    }

    fn save_snapshot(&self, snapshot: &LedgerSnapshot) -> StoreResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Io(io::Error::other("injected save failure")));
        }

        *self.snapshot.lock().unwrap_or_else(|e| e.into_inner()) = Some(snapshot.clone());
        self.save_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        !self.fail_saves.load(Ordering::SeqCst)
    }
}
