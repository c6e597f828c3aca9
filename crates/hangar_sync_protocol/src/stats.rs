//! Published sync statistics.

use crate::entry::QueueCounts;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A derived snapshot of queue and executor state.
///
/// # Invariants
///
/// - `synced_items + pending_items + error_items == total_items`
/// - In-flight entries are reported as pending
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    /// All queue entries.
    pub total_items: usize,
    /// Entries applied remotely.
    pub synced_items: usize,
    /// Entries waiting or in flight.
    pub pending_items: usize,
    /// Entries in the terminal Failed state.
    pub error_items: usize,
    /// Whether the client is online.
    pub is_online: bool,
    /// Whether a sync pass is running.
    pub sync_in_progress: bool,
}

impl SyncStats {
    /// Builds a snapshot from queue counts.
    pub fn from_counts(counts: QueueCounts, is_online: bool, sync_in_progress: bool) -> Self {
        Self {
            total_items: counts.total,
            synced_items: counts.synced,
            pending_items: counts.pending + counts.in_flight,
            error_items: counts.failed,
            is_online,
            sync_in_progress,
        }
    }

    /// Returns true if every entry is counted exactly once.
    pub fn is_consistent(&self) -> bool {
        self.synced_items + self.pending_items + self.error_items == self.total_items
    }

    /// Reduces the snapshot to a compact status.
    pub fn status(&self) -> SyncStatus {
        SyncStatus::from_stats(self)
    }
}

/// Compact, user-facing sync status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// The client is offline.
    Offline,
    /// A sync pass is running.
    Syncing,
    /// At least one entry needs attention.
    Error,
    /// Entries are waiting to be synced.
    Pending,
    /// Everything is synced.
    Synced,
}

impl SyncStatus {
    /// Computes the status in priority order:
    /// offline, syncing, error, pending, synced.
    pub fn from_stats(stats: &SyncStats) -> Self {
        if !stats.is_online {
            SyncStatus::Offline
        } else if stats.sync_in_progress {
            SyncStatus::Syncing
        } else if stats.error_items > 0 {
            SyncStatus::Error
        } else if stats.pending_items > 0 {
            SyncStatus::Pending
        } else {
            SyncStatus::Synced
        }
    }

    /// Returns the lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Offline => "offline",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Error => "error",
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
