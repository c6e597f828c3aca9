//! Bounded audit trail of sync and migration outcomes.

use hangar_sync_protocol::{LogType, SyncLogEntry};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// In-memory ring of [`SyncLogEntry`] records; the oldest record is evicted
/// when the capacity is reached.
///
/// Every appended record is also emitted as a `tracing` event.
#[derive(Debug)]
pub struct SyncLog {
    capacity: usize,
    entries: Mutex<VecDeque<SyncLogEntry>>,
}

impl SyncLog {
    /// Creates a log holding at most `capacity` records.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    /// Appends a record.
    pub fn append(&self, entry: SyncLogEntry) {
        match entry.kind {
            LogType::Error => tracing::warn!(
                operation = %entry.operation,
                entity = %entry.entity,
                "{}",
                entry.message
            ),
            LogType::Success | LogType::Info => tracing::info!(
                operation = %entry.operation,
                entity = %entry.entity,
                "{}",
                entry.message
            ),
        }

        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Returns up to `limit` records, most recent first.
    pub fn recent(&self, limit: usize) -> Vec<SyncLogEntry> {
        self.entries.lock().iter().rev().take(limit).cloned().collect()
    }

    /// Returns the number of retained records.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if no records are retained.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Removes every record.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_is_most_recent_first() {
        let log = SyncLog::new(10);
        log.append(SyncLogEntry::info("sync", "queue", "first"));
        log.append(SyncLogEntry::success("update", "task/T-1", "second"));

        let recent = log.recent(10);
        assert_eq!(recent[0].message, "second");
        assert_eq!(recent[1].message, "first");
        assert_eq!(log.recent(1).len(), 1);
    }

    #[test]
    fn oldest_is_evicted() {
        let log = SyncLog::new(3);
        for n in 0..5 {
            log.append(SyncLogEntry::info("sync", "queue", n.to_string()));
        }

        let messages: Vec<_> = log.recent(10).into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["4", "3", "2"]);
    }

    #[test]
    fn clear_empties_log() {
        let log = SyncLog::new(3);
        log.append(SyncLogEntry::error("delete", "task/T-1", "rejected"));
        log.clear();
        assert!(log.is_empty());
    }
}
