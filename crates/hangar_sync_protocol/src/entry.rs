//! Queue entries.

use crate::entity::{EntityType, Operation};
use crate::error::{ClassifiedError, ProtocolError, ProtocolResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a queue entry, stable across retries.
pub type EntryId = Uuid;

/// Lifecycle state of a queue entry.
///
/// ```text
/// Pending ──claim──▶ InFlight ──ack──▶ Synced
///    ▲                  │
///    └──retryable fail──┤
///                       └──terminal fail──▶ Failed ──explicit retry──▶ Pending
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    /// Waiting to be claimed by the executor.
    Pending,
    /// Claimed by the executor; a remote call may be outstanding.
    InFlight,
    /// Applied to the remote store.
    Synced,
    /// Stopped retrying; needs explicit action.
    Failed,
}

impl EntryState {
    /// Returns the lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryState::Pending => "pending",
            EntryState::InFlight => "in_flight",
            EntryState::Synced => "synced",
            EntryState::Failed => "failed",
        }
    }
}

/// One pending local mutation.
///
/// # Fields
///
/// - `id`: Unique entry identifier (stable across retries)
/// - `seq`: Creation sequence; defines FIFO order within the queue
/// - `entity_type` / `entity_id`: The affected record
/// - `operation`: Create, Update or Delete
/// - `payload`: Opaque record snapshot (absent for Delete)
/// - `attempts`: Remote attempts made so far
/// - `next_attempt_at`: Earliest time the entry may be claimed again
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueEntry {
    /// Entry ID.
    pub id: EntryId,
    /// Creation sequence number.
    pub seq: u64,
    /// Kind of the affected record.
    pub entity_type: EntityType,
    /// Identifier of the affected record.
    pub entity_id: String,
    /// Mutation kind.
    pub operation: Operation,
    /// Serialized record snapshot taken at enqueue time.
    pub payload: Option<Vec<u8>>,
    /// Number of remote attempts so far.
    pub attempts: u32,
    /// Last classified failure.
    pub last_error: Option<ClassifiedError>,
    /// Lifecycle state.
    pub state: EntryState,
    /// When the entry was created.
    pub created_at: DateTime<Utc>,
    /// When the entry was last sent to the remote.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Earliest time the entry may be claimed again.
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl SyncQueueEntry {
    /// Creates a new pending entry.
    pub fn new(
        seq: u64,
        entity_type: EntityType,
        entity_id: impl Into<String>,
        operation: Operation,
        payload: Option<Vec<u8>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            seq,
            entity_type,
            entity_id: entity_id.into(),
            operation,
            payload: if operation.carries_payload() {
                payload
            } else {
                None
            },
            attempts: 0,
            last_error: None,
            state: EntryState::Pending,
            created_at: Utc::now(),
            last_attempt_at: None,
            next_attempt_at: None,
        }
    }

    /// Returns true if this entry targets the given record.
    pub fn targets(&self, entity_type: &EntityType, entity_id: &str) -> bool {
        self.entity_type == *entity_type && self.entity_id == entity_id
    }

    /// Returns a printable `type/id` label for the affected record.
    pub fn entity_label(&self) -> String {
        format!("{}/{}", self.entity_type, self.entity_id)
    }

    /// Returns true if the entry is Pending and its backoff has elapsed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state == EntryState::Pending && self.next_attempt_at.map_or(true, |at| at <= now)
    }

    /// Returns the storage key; keys sort in creation order.
    pub fn storage_key(&self) -> String {
        format!("{:020}", self.seq)
    }

    /// Returns the size of the payload in bytes.
    pub fn payload_size(&self) -> usize {
        self.payload.as_ref().map_or(0, Vec::len)
    }

    /// Encodes to CBOR bytes.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(self, &mut bytes)
            .map_err(|e| ProtocolError::Encode(e.to_string()))?;
        Ok(bytes)
    }

    /// Decodes from CBOR bytes.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

/// Per-state entry counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueCounts {
    /// Entries waiting to be claimed.
    pub pending: usize,
    /// Entries claimed by the executor.
    pub in_flight: usize,
    /// Entries in the terminal Failed state.
    pub failed: usize,
    /// Entries applied remotely.
    pub synced: usize,
    /// All entries.
    pub total: usize,
}

impl QueueCounts {
    /// Counts entries by state.
    pub fn tally<'a>(entries: impl IntoIterator<Item = &'a SyncQueueEntry>) -> Self {
        let mut counts = Self::default();
        for entry in entries {
            match entry.state {
                EntryState::Pending => counts.pending += 1,
                EntryState::InFlight => counts.in_flight += 1,
                EntryState::Failed => counts.failed += 1,
                EntryState::Synced => counts.synced += 1,
            }
            counts.total += 1;
        }
        counts
    }

    /// Returns true if every entry is counted exactly once.
    pub fn is_consistent(&self) -> bool {
        self.pending + self.in_flight + self.failed + self.synced == self.total
    }
}
