//! Persisted unread ledger
//!
//! The router's bounded record of updates no surface has acknowledged yet.
//! At most one entry per thread (upsert), insertion-order eviction at
//! capacity, written through to the local storage namespace.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::debug;

use crate::storage::{Namespace, Storage};
use crewlink_protocol::{UnreadEntry, UpdatePayload};
use crewlink_utils::{CrewlinkError, Result};

/// Maximum retained entries
pub const LEDGER_CAPACITY: usize = 10;

/// Storage key in the local namespace
const LEDGER_KEY: &str = "unread_ledger";

/// Insertion-ordered, bounded unread ledger
pub struct UnreadLedger {
    entries: VecDeque<UnreadEntry>,
    capacity: usize,
}

impl UnreadLedger {
    pub fn new() -> Self {
        Self::with_capacity(LEDGER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Restore from storage; a missing or unreadable record starts empty
    pub fn load(storage: &Arc<dyn Storage>) -> Self {
        let mut ledger = Self::new();
        if let Ok(Some(value)) = storage.get(Namespace::Local, LEDGER_KEY) {
            match serde_json::from_value::<Vec<UnreadEntry>>(value) {
                Ok(entries) => {
                    for entry in entries.into_iter().take(ledger.capacity) {
                        ledger.entries.push_back(entry);
                    }
                }
                Err(e) => debug!("Discarding unreadable unread ledger: {}", e),
            }
        }
        ledger
    }

    /// Write through to storage
    pub fn persist(&self, storage: &Arc<dyn Storage>) -> Result<()> {
        let entries: Vec<&UnreadEntry> = self.entries.iter().collect();
        let value = serde_json::to_value(entries)
            .map_err(|e| CrewlinkError::storage(e.to_string()))?;
        storage.set(Namespace::Local, LEDGER_KEY, value)
    }

    /// Insert or refresh the entry for `thread_id`. An existing entry keeps
    /// its position and unread state; a new entry at capacity evicts the
    /// earliest-inserted one first.
    pub fn upsert(&mut self, thread_id: &str, update: UpdatePayload, timestamp: i64) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.thread_id == thread_id)
        {
            entry.update = update;
            entry.timestamp = timestamp;
            return;
        }

        if self.entries.len() >= self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                debug!(thread_id = %evicted.thread_id, "Evicting oldest unread entry");
            }
        }
        self.entries.push_back(UnreadEntry {
            thread_id: thread_id.to_string(),
            update,
            timestamp,
            unread: true,
        });
    }

    /// Drop the entry for a thread once a surface marked it read.
    /// Returns whether an entry existed.
    pub fn remove(&mut self, thread_id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.thread_id != thread_id);
        self.entries.len() != before
    }

    /// Snapshot of all entries, oldest first
    pub fn entries(&self) -> Vec<UnreadEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for UnreadLedger {
    fn default() -> Self {
        Self::new()
    }
}
