//! Bounded notification ledger
//!
//! What one surface shows the user: at most one entry per thread, capacity
//! 10, insertion-order eviction. The unread count is maintained, not
//! recounted, and only moves when an entry comes into existence unread or
//! an unread entry leaves that state.

use std::collections::VecDeque;

use crewlink_protocol::UpdatePayload;

/// Maximum entries a surface retains
pub const NOTIFICATION_CAPACITY: usize = 10;

/// One displayed notification
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEntry {
    pub thread_id: String,
    pub update: UpdatePayload,
    pub timestamp: i64,
    pub unread: bool,
    /// Arrived live over the push channel, as opposed to startup hydration
    pub is_new: bool,
}

/// What an upsert did, for the surface runtime to react to
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    /// Thread whose entry was evicted to make room, if any
    pub evicted: Option<String>,
    /// The surface should bring itself to the user's attention
    pub reveal: bool,
}

/// Insertion-ordered, bounded notification ledger
pub struct NotificationLedger {
    entries: VecDeque<NotificationEntry>,
    capacity: usize,
    unread: usize,
}

impl NotificationLedger {
    pub fn new() -> Self {
        Self::with_capacity(NOTIFICATION_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            unread: 0,
        }
    }

    /// Insert or refresh the entry for `thread_id`.
    ///
    /// An existing entry is refreshed in place: position kept, unread flag
    /// kept, so a repeat update never double-counts. A new entry is always
    /// unread; at capacity the earliest-inserted entry is evicted first.
    pub fn upsert(
        &mut self,
        thread_id: &str,
        update: UpdatePayload,
        timestamp: i64,
        is_new: bool,
    ) -> UpsertOutcome {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.thread_id == thread_id)
        {
            entry.update = update;
            entry.timestamp = timestamp;
            entry.is_new = entry.is_new || is_new;
            return UpsertOutcome {
                evicted: None,
                reveal: is_new,
            };
        }

        let mut evicted = None;
        if self.entries.len() >= self.capacity {
            if let Some(old) = self.entries.pop_front() {
                if old.unread {
                    self.unread = self.unread.saturating_sub(1);
                }
                evicted = Some(old.thread_id);
            }
        }

        self.entries.push_back(NotificationEntry {
            thread_id: thread_id.to_string(),
            update,
            timestamp,
            unread: true,
            is_new,
        });
        self.unread += 1;
        UpsertOutcome {
            evicted,
            reveal: is_new,
        }
    }

    /// Flip an entry unread → read. Returns whether it was unread.
    pub fn mark_as_read(&mut self, thread_id: &str) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|e| e.thread_id == thread_id && e.unread)
        {
            Some(entry) => {
                entry.unread = false;
                self.unread = self.unread.saturating_sub(1);
                true
            }
            None => false,
        }
    }

    /// Mark every unread entry read; returns the affected thread ids
    pub fn mark_all_as_read(&mut self) -> Vec<String> {
        let mut marked = Vec::new();
        for entry in self.entries.iter_mut().filter(|e| e.unread) {
            entry.unread = false;
            marked.push(entry.thread_id.clone());
        }
        self.unread = 0;
        marked
    }

    /// Remove an entry outright. Returns whether it existed.
    pub fn evict(&mut self, thread_id: &str) -> bool {
        match self.entries.iter().position(|e| e.thread_id == thread_id) {
            Some(idx) => {
                if let Some(entry) = self.entries.remove(idx) {
                    if entry.unread {
                        self.unread = self.unread.saturating_sub(1);
                    }
                }
                true
            }
            None => false,
        }
    }

    /// The most-recently-inserted unread entries, newest first, at most
    /// `max` of them. These are what the auto-read timer marks.
    pub fn auto_read_candidates(&self, max: usize) -> Vec<String> {
        self.entries
            .iter()
            .rev()
            .filter(|e| e.unread)
            .take(max)
            .map(|e| e.thread_id.clone())
            .collect()
    }

    pub fn unread_count(&self) -> usize {
        self.unread
    }

    /// Snapshot of all entries, oldest first
    pub fn entries(&self) -> impl Iterator<Item = &NotificationEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for NotificationLedger {
    fn default() -> Self {
        Self::new()
    }
}
