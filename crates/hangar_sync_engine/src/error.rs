//! Error types for the sync engine.

use hangar_sync_protocol::{EntryId, EntryState, ProtocolError};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// Business-level failures (a rejected payload, an unreachable remote) are
/// recorded on queue entries or in migration results; these errors signal
/// that the engine itself could not proceed.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The local store failed or is unavailable.
    #[error("storage error: {0}")]
    Storage(#[from] hangar_storage::StorageError),

    /// A stored entry could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] ProtocolError),

    /// No entry with this ID exists.
    #[error("queue entry not found: {0}")]
    EntryNotFound(EntryId),

    /// The entry is not in the state the transition requires.
    #[error("invalid state transition for {id}: {from:?} -> {to:?}")]
    InvalidStateTransition {
        /// Entry ID.
        id: EntryId,
        /// Current state.
        from: EntryState,
        /// Attempted target state.
        to: EntryState,
    },

    /// The queue cannot be cleared while entries are in flight.
    #[error("queue busy: {in_flight} entries in flight")]
    QueueBusy {
        /// Number of in-flight entries.
        in_flight: usize,
    },

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,
}
