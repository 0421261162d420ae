//! In-process dedup of already-delivered message ids.
//!
//! State is process-memory only and grows for the process lifetime; nothing
//! is persisted across restarts and nothing is evicted.

use std::collections::HashSet;
use std::sync::Mutex;

/// Tracks message ids that have already been seen by any poller.
#[derive(Debug, Default)]
pub struct DedupStore {
    seen: Mutex<HashSet<String>>,
}

impl DedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically record `id` as seen. Returns `true` if the id was newly
    /// inserted (message is new), `false` if it was already present.
    pub fn mark_seen(&self, id: &str) -> bool {
        let mut seen = self.seen.lock().unwrap();
        seen.insert(id.to_string())
    }

    /// Insert a batch of ids without triggering delivery. Used by the
    /// initial seeding pass so pre-existing inbox contents are never relayed.
    pub fn seed<I>(&self, ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut seen = self.seen.lock().unwrap();
        seen.extend(ids);
    }

    /// Number of ids tracked (reported by the health endpoint).
    pub fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
