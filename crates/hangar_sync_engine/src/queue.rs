//! Durable queue of pending local mutations.
//!
//! Entries live in the `sync_queue` table of a [`LocalStore`], keyed by
//! their zero-padded sequence number so that a table listing returns them
//! in creation order. An in-memory index mirrors the table; every change is
//! written to the store before it is applied to the index, so a storage
//! failure leaves the queue as it was.
//!
//! ## Ordering
//!
//! For each `(entity_type, entity_id)` at most one entry is claimed at a
//! time, and it is always the oldest unsynced entry of that entity. A
//! `Failed` entry therefore blocks later entries of the same entity until
//! it is retried or the queue is cleared.

use crate::config::{RetryConfig, SyncConfig};
use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use hangar_storage::{LocalStore, WriteBatch};
use hangar_sync_protocol::{
    ClassifiedError, EntityType, EntryId, EntryState, Operation, QueueCounts, SyncQueueEntry,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Table holding queue entries.
pub const QUEUE_TABLE: &str = "sync_queue";

/// Which failed entries [`SyncQueue::retry_failed`] requeues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryScope {
    /// Only entries whose last failure is of a retryable kind.
    Retryable,
    /// Every failed entry.
    All,
}

#[derive(Default)]
struct QueueState {
    entries: BTreeMap<u64, SyncQueueEntry>,
    by_id: HashMap<EntryId, u64>,
    next_seq: u64,
}

impl QueueState {
    fn insert(&mut self, entry: SyncQueueEntry) {
        self.by_id.insert(entry.id, entry.seq);
        self.next_seq = self.next_seq.max(entry.seq + 1);
        self.entries.insert(entry.seq, entry);
    }

    fn lookup(&self, id: EntryId) -> SyncResult<&SyncQueueEntry> {
        self.by_id
            .get(&id)
            .and_then(|seq| self.entries.get(seq))
            .ok_or(SyncError::EntryNotFound(id))
    }

    fn latest_open(&self, entity_type: &EntityType, entity_id: &str) -> Option<&SyncQueueEntry> {
        self.entries
            .values()
            .rev()
            .find(|e| e.state != EntryState::Synced && e.targets(entity_type, entity_id))
    }
}

/// Durable, ordered store of pending mutations.
pub struct SyncQueue {
    store: Arc<dyn LocalStore>,
    retry: RetryConfig,
    collapse: bool,
    state: Mutex<QueueState>,
}

impl SyncQueue {
    /// Opens the queue, loading persisted entries.
    ///
    /// Entries left `InFlight` by an interrupted pass are returned to
    /// `Pending`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable or an entry cannot be
    /// decoded.
    pub fn open(store: Arc<dyn LocalStore>, config: &SyncConfig) -> SyncResult<Self> {
        let mut state = QueueState::default();
        let mut recovered = Vec::new();

        for (_, bytes) in store.list(QUEUE_TABLE)? {
            let mut entry = SyncQueueEntry::decode(&bytes)?;
            if entry.state == EntryState::InFlight {
                entry.state = EntryState::Pending;
                recovered.push(entry.clone());
            }
            state.insert(entry);
        }

        let queue = Self {
            store,
            retry: config.retry.clone(),
            collapse: config.collapse_mutations,
            state: Mutex::new(QueueState::default()),
        };

        if !recovered.is_empty() {
            queue.persist(&recovered)?;
            info!(count = recovered.len(), "recovered in-flight queue entries");
        }
        debug!(entries = state.entries.len(), "sync queue opened");
        *queue.state.lock() = state;
        Ok(queue)
    }

    /// Records a local mutation and returns the ID of the entry holding it.
    ///
    /// When collapsing is enabled and the newest unsynced entry of the same
    /// record is not in flight, the mutation is merged into it:
    ///
    /// | queued           | incoming       | result                       |
    /// |------------------|----------------|------------------------------|
    /// | Create / Update  | Create / Update| queued op, incoming payload  |
    /// | any              | Delete         | Delete                       |
    /// | Delete           | Create / Update| appended                     |
    ///
    /// A merged entry is reset to `Pending` with no attempts.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be persisted.
    pub fn enqueue(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        operation: Operation,
        payload: Option<Vec<u8>>,
    ) -> SyncResult<EntryId> {
        let mut state = self.state.lock();

        if self.collapse {
            let target = state
                .latest_open(&entity_type, entity_id)
                .filter(|e| matches!(e.state, EntryState::Pending | EntryState::Failed));
            if let Some(target) = target {
                if let Some(merged_op) = collapse(target.operation, operation) {
                    let mut merged = target.clone();
                    merged.operation = merged_op;
                    merged.payload = if merged_op.carries_payload() {
                        payload
                    } else {
                        None
                    };
                    merged.attempts = 0;
                    merged.last_error = None;
                    merged.state = EntryState::Pending;
                    merged.next_attempt_at = None;

                    self.persist(std::slice::from_ref(&merged))?;
                    debug!(
                        entry_id = %merged.id,
                        entity = %merged.entity_label(),
                        operation = merged_op.as_str(),
                        "collapsed mutation into queued entry"
                    );
                    let id = merged.id;
                    state.insert(merged);
                    return Ok(id);
                }
            }
        }

        let entry = SyncQueueEntry::new(state.next_seq, entity_type, entity_id, operation, payload);
        self.persist(std::slice::from_ref(&entry))?;
        debug!(
            entry_id = %entry.id,
            entity = %entry.entity_label(),
            operation = operation.as_str(),
            "enqueued mutation"
        );
        let id = entry.id;
        state.insert(entry);
        Ok(id)
    }

    /// Claims up to `max` due entries and marks them `InFlight`.
    ///
    /// # Errors
    ///
    /// Returns an error if the claim cannot be persisted; nothing is
    /// claimed in that case.
    pub fn next_batch(&self, max: usize) -> SyncResult<Vec<SyncQueueEntry>> {
        self.next_batch_at(max, Utc::now())
    }

    /// Like [`Self::next_batch`], with an explicit clock reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the claim cannot be persisted.
    pub fn next_batch_at(&self, max: usize, now: DateTime<Utc>) -> SyncResult<Vec<SyncQueueEntry>> {
        let mut state = self.state.lock();
        let mut seen: HashSet<(&EntityType, &str)> = HashSet::new();
        let mut claimed = Vec::new();

        for entry in state.entries.values() {
            if claimed.len() >= max {
                break;
            }
            if entry.state == EntryState::Synced {
                continue;
            }
            // Only the oldest unsynced entry of each record is eligible.
            if !seen.insert((&entry.entity_type, entry.entity_id.as_str())) {
                continue;
            }
            if entry.is_due(now) {
                let mut claim = entry.clone();
                claim.state = EntryState::InFlight;
                claim.last_attempt_at = Some(now);
                claimed.push(claim);
            }
        }

        if claimed.is_empty() {
            return Ok(claimed);
        }

        self.persist(&claimed)?;
        for entry in &claimed {
            state.insert(entry.clone());
        }
        debug!(count = claimed.len(), "claimed queue batch");
        Ok(claimed)
    }

    /// Marks an in-flight entry as applied remotely.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry is unknown, not in flight, or the
    /// update cannot be persisted.
    pub fn mark_synced(&self, id: EntryId) -> SyncResult<()> {
        let mut state = self.state.lock();
        let mut entry = Self::expect_in_flight(&state, id, EntryState::Synced)?;
        entry.state = EntryState::Synced;
        entry.last_error = None;
        entry.next_attempt_at = None;

        self.persist(std::slice::from_ref(&entry))?;
        state.insert(entry);
        Ok(())
    }

    /// Records a failed attempt and returns the entry's resulting state.
    ///
    /// Retryable failures under the attempt ceiling return the entry to
    /// `Pending` with a backoff; everything else ends in `Failed`.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry is unknown, not in flight, or the
    /// update cannot be persisted.
    pub fn mark_failed(&self, id: EntryId, error: ClassifiedError) -> SyncResult<EntryState> {
        self.mark_failed_at(id, error, Utc::now())
    }

    /// Like [`Self::mark_failed`], with an explicit clock reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry is unknown, not in flight, or the
    /// update cannot be persisted.
    pub fn mark_failed_at(
        &self,
        id: EntryId,
        error: ClassifiedError,
        now: DateTime<Utc>,
    ) -> SyncResult<EntryState> {
        let mut state = self.state.lock();
        let mut entry = Self::expect_in_flight(&state, id, EntryState::Failed)?;
        entry.attempts += 1;

        let ceiling = self.retry.ceiling_for(error.kind);
        if error.is_retryable() && entry.attempts < ceiling {
            let delay = self.retry.delay_for_attempt(entry.attempts);
            entry.state = EntryState::Pending;
            let backoff =
                chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
            entry.next_attempt_at = Some(now + backoff);
            debug!(
                entry_id = %id,
                attempts = entry.attempts,
                delay_ms = delay.as_millis() as u64,
                kind = error.kind.as_str(),
                "entry scheduled for retry"
            );
        } else {
            entry.state = EntryState::Failed;
            entry.next_attempt_at = None;
            warn!(
                entry_id = %id,
                entity = %entry.entity_label(),
                attempts = entry.attempts,
                kind = error.kind.as_str(),
                "entry failed"
            );
        }
        entry.last_error = Some(error);

        let result = entry.state;
        self.persist(std::slice::from_ref(&entry))?;
        state.insert(entry);
        Ok(result)
    }

    /// Returns a claimed entry to `Pending` without counting an attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry is unknown, not in flight, or the
    /// update cannot be persisted.
    pub fn release(&self, id: EntryId) -> SyncResult<()> {
        let mut state = self.state.lock();
        let mut entry = Self::expect_in_flight(&state, id, EntryState::Pending)?;
        entry.state = EntryState::Pending;

        self.persist(std::slice::from_ref(&entry))?;
        state.insert(entry);
        Ok(())
    }

    /// Returns every `InFlight` entry to `Pending` without counting an
    /// attempt. Returns how many were released.
    ///
    /// Only valid when no pass is running. The in-memory state is updated
    /// even if the store rejects the write: a persisted `InFlight` entry is
    /// recovered as `Pending` on the next open, so both views agree.
    pub fn release_in_flight(&self) -> usize {
        let mut state = self.state.lock();
        let released: Vec<SyncQueueEntry> = state
            .entries
            .values()
            .filter(|e| e.state == EntryState::InFlight)
            .map(|e| {
                let mut entry = e.clone();
                entry.state = EntryState::Pending;
                entry
            })
            .collect();
        if released.is_empty() {
            return 0;
        }

        if let Err(error) = self.persist(&released) {
            warn!(%error, count = released.len(), "could not persist released entries");
        }
        let count = released.len();
        for entry in released {
            state.insert(entry);
        }
        info!(count, "released stranded in-flight entries");
        count
    }

    /// Moves failed entries back to `Pending` with a fresh attempt budget.
    /// Returns how many were requeued.
    ///
    /// # Errors
    ///
    /// Returns an error if the update cannot be persisted.
    pub fn retry_failed(&self, scope: RetryScope) -> SyncResult<usize> {
        let mut state = self.state.lock();
        let requeued: Vec<SyncQueueEntry> = state
            .entries
            .values()
            .filter(|e| e.state == EntryState::Failed)
            .filter(|e| match scope {
                RetryScope::All => true,
                RetryScope::Retryable => e.last_error.as_ref().map_or(true, |err| err.is_retryable()),
            })
            .map(|e| {
                let mut entry = e.clone();
                entry.state = EntryState::Pending;
                entry.attempts = 0;
                entry.last_error = None;
                entry.next_attempt_at = None;
                entry
            })
            .collect();

        if requeued.is_empty() {
            return Ok(0);
        }

        self.persist(&requeued)?;
        let count = requeued.len();
        for entry in requeued {
            state.insert(entry);
        }
        info!(count, ?scope, "requeued failed entries");
        Ok(count)
    }

    /// Removes every entry. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::QueueBusy`] if any entry is in flight, or a
    /// storage error.
    pub fn clear(&self) -> SyncResult<usize> {
        let mut state = self.state.lock();
        let in_flight = state
            .entries
            .values()
            .filter(|e| e.state == EntryState::InFlight)
            .count();
        if in_flight > 0 {
            return Err(SyncError::QueueBusy { in_flight });
        }

        self.store.clear_table(QUEUE_TABLE)?;
        let removed = state.entries.len();
        state.entries.clear();
        state.by_id.clear();
        info!(removed, "sync queue cleared");
        Ok(removed)
    }

    /// Removes synced entries. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal cannot be persisted.
    pub fn purge_synced(&self) -> SyncResult<usize> {
        let mut state = self.state.lock();
        let synced: Vec<(u64, String, EntryId)> = state
            .entries
            .values()
            .filter(|e| e.state == EntryState::Synced)
            .map(|e| (e.seq, e.storage_key(), e.id))
            .collect();

        if synced.is_empty() {
            return Ok(0);
        }

        let mut batch = WriteBatch::new();
        for (_, key, _) in &synced {
            batch.delete(key.clone());
        }
        self.store.write_batch(QUEUE_TABLE, batch)?;

        for (seq, _, id) in &synced {
            state.entries.remove(seq);
            state.by_id.remove(id);
        }
        debug!(count = synced.len(), "purged synced entries");
        Ok(synced.len())
    }

    /// Returns per-state counts.
    pub fn counts(&self) -> QueueCounts {
        QueueCounts::tally(self.state.lock().entries.values())
    }

    /// Returns a copy of one entry.
    pub fn get(&self, id: EntryId) -> Option<SyncQueueEntry> {
        self.state.lock().lookup(id).ok().cloned()
    }

    /// Returns a copy of every entry in creation order.
    pub fn entries(&self) -> Vec<SyncQueueEntry> {
        self.state.lock().entries.values().cloned().collect()
    }

    /// Returns true if no entry is pending, in flight, or failed.
    pub fn is_drained(&self) -> bool {
        self.state
            .lock()
            .entries
            .values()
            .all(|e| e.state == EntryState::Synced)
    }

    fn expect_in_flight(state: &QueueState, id: EntryId, to: EntryState) -> SyncResult<SyncQueueEntry> {
        let entry = state.lookup(id)?;
        if entry.state != EntryState::InFlight {
            return Err(SyncError::InvalidStateTransition {
                id,
                from: entry.state,
                to,
            });
        }
        Ok(entry.clone())
    }

    fn persist(&self, entries: &[SyncQueueEntry]) -> SyncResult<()> {
        let mut batch = WriteBatch::new();
        for entry in entries {
            batch.put(entry.storage_key(), entry.encode()?);
        }
        self.store.write_batch(QUEUE_TABLE, batch)?;
        Ok(())
    }
}

impl std::fmt::Debug for SyncQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncQueue")
            .field("counts", &self.counts())
            .field("collapse", &self.collapse)
            .finish_non_exhaustive()
    }
}

/// Merges an incoming operation into a queued one, or returns `None` if
/// the incoming operation must be appended.
fn collapse(queued: Operation, incoming: Operation) -> Option<Operation> {
    match (queued, incoming) {
        (_, Operation::Delete) => Some(Operation::Delete),
        (Operation::Delete, _) => None,
        (queued, _) => Some(queued),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hangar_storage::InMemoryStore;
    use hangar_sync_protocol::ErrorKind;

    fn setup(config: SyncConfig) -> (Arc<InMemoryStore>, SyncQueue) {
        let store = Arc::new(InMemoryStore::new());
        let queue = SyncQueue::open(store.clone(), &config).unwrap();
        (store, queue)
    }

    fn config() -> SyncConfig {
        SyncConfig::new().with_retry(RetryConfig::immediate(3))
    }

    fn network() -> ClassifiedError {
        ClassifiedError::new(ErrorKind::Network, "connection refused")
    }

    #[test]
    fn enqueue_persists_entry() {
        let (store, queue) = setup(config());
        let id = queue
            .enqueue(EntityType::Aircraft, "EC-MKV", Operation::Create, Some(b"v1".to_vec()))
            .unwrap();

        assert_eq!(store.count(QUEUE_TABLE).unwrap(), 1);
        let entry = queue.get(id).unwrap();
        assert_eq!(entry.state, EntryState::Pending);
        assert_eq!(entry.payload.as_deref(), Some(&b"v1"[..]));
    }

    #[test]
    fn update_after_create_keeps_create_with_new_payload() {
        let (_, queue) = setup(config());
        let first = queue
            .enqueue(EntityType::Aircraft, "EC-MKV", Operation::Create, Some(b"v1".to_vec()))
            .unwrap();
        let second = queue
            .enqueue(EntityType::Aircraft, "EC-MKV", Operation::Update, Some(b"v2".to_vec()))
            .unwrap();

        assert_eq!(first, second);
        let entries = queue.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].operation, Operation::Create);
        assert_eq!(entries[0].payload.as_deref(), Some(&b"v2"[..]));
    }

    #[test]
    fn delete_supersedes_pending_update() {
        let (_, queue) = setup(config());
        queue
            .enqueue(EntityType::Task, "T-1", Operation::Update, Some(b"v1".to_vec()))
            .unwrap();
        queue.enqueue(EntityType::Task, "T-1", Operation::Delete, None).unwrap();

        let entries = queue.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].operation, Operation::Delete);
        assert_eq!(entries[0].payload, None);
    }

    #[test]
    fn create_after_delete_is_appended() {
        let (_, queue) = setup(config());
        queue.enqueue(EntityType::Task, "T-1", Operation::Delete, None).unwrap();
        queue
            .enqueue(EntityType::Task, "T-1", Operation::Create, Some(b"new".to_vec()))
            .unwrap();

        let ops: Vec<_> = queue.entries().iter().map(|e| e.operation).collect();
        assert_eq!(ops, vec![Operation::Delete, Operation::Create]);
    }

    #[test]
    fn in_flight_entry_is_not_collapsed() {
        let (_, queue) = setup(config());
        queue
            .enqueue(EntityType::Task, "T-1", Operation::Update, Some(b"v1".to_vec()))
            .unwrap();
        let claimed = queue.next_batch(10).unwrap();
        assert_eq!(claimed.len(), 1);

        queue
            .enqueue(EntityType::Task, "T-1", Operation::Update, Some(b"v2".to_vec()))
            .unwrap();
        assert_eq!(queue.entries().len(), 2);
        assert_eq!(claimed[0].payload.as_deref(), Some(&b"v1"[..]));
    }

    #[test]
    fn collapsing_disabled_appends_everything() {
        let (_, queue) = setup(config().with_collapse_mutations(false));
        for payload in [b"v1", b"v2", b"v3"] {
            queue
                .enqueue(EntityType::Employee, "E-7", Operation::Update, Some(payload.to_vec()))
                .unwrap();
        }
        assert_eq!(queue.counts().pending, 3);
    }

    #[test]
    fn one_entry_per_entity_per_batch() {
        let (_, queue) = setup(config().with_collapse_mutations(false));
        queue.enqueue(EntityType::Task, "A", Operation::Update, None).unwrap();
        queue.enqueue(EntityType::Task, "A", Operation::Update, None).unwrap();
        queue.enqueue(EntityType::Task, "B", Operation::Update, None).unwrap();

        let batch = queue.next_batch(10).unwrap();
        let ids: Vec<_> = batch.iter().map(|e| e.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert_eq!(batch[0].seq, 0);

        // A's second entry waits until the first is settled.
        assert!(queue.next_batch(10).unwrap().is_empty());
        queue.mark_synced(batch[0].id).unwrap();
        let next = queue.next_batch(10).unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].seq, 1);
    }

    #[test]
    fn batch_size_is_respected() {
        let (_, queue) = setup(config());
        for id in 0..5 {
            queue
                .enqueue(EntityType::Aircraft, &format!("A-{id}"), Operation::Create, None)
                .unwrap();
        }
        assert_eq!(queue.next_batch(2).unwrap().len(), 2);
        assert_eq!(queue.counts().in_flight, 2);
    }

    #[test]
    fn retryable_failure_returns_to_pending() {
        let (_, queue) = setup(config());
        let id = queue.enqueue(EntityType::Task, "T-1", Operation::Update, None).unwrap();

        queue.next_batch(1).unwrap();
        assert_eq!(queue.mark_failed(id, network()).unwrap(), EntryState::Pending);
        let entry = queue.get(id).unwrap();
        assert_eq!(entry.attempts, 1);
        assert_eq!(entry.last_error.unwrap().kind, ErrorKind::Network);
    }

    #[test]
    fn ceiling_moves_entry_to_failed() {
        let (_, queue) = setup(config());
        let id = queue.enqueue(EntityType::Task, "T-1", Operation::Update, None).unwrap();

        let mut last = EntryState::Pending;
        for _ in 0..3 {
            assert_eq!(queue.next_batch(1).unwrap().len(), 1);
            last = queue.mark_failed(id, network()).unwrap();
        }
        assert_eq!(last, EntryState::Failed);
        assert_eq!(queue.get(id).unwrap().attempts, 3);
        assert!(queue.next_batch(1).unwrap().is_empty());
    }

    #[test]
    fn terminal_failure_fails_immediately() {
        let (_, queue) = setup(config());
        let id = queue.enqueue(EntityType::Task, "T-1", Operation::Update, None).unwrap();
        queue.next_batch(1).unwrap();

        let state = queue
            .mark_failed(id, ClassifiedError::new(ErrorKind::Validation, "missing tail"))
            .unwrap();
        assert_eq!(state, EntryState::Failed);
        assert_eq!(queue.counts().failed, 1);
    }

    #[test]
    fn backoff_defers_claim() {
        let retry = RetryConfig::new(5)
            .with_initial_delay(std::time::Duration::from_secs(10))
            .with_jitter(false);
        let (_, queue) = setup(SyncConfig::new().with_retry(retry));
        let id = queue.enqueue(EntityType::Task, "T-1", Operation::Update, None).unwrap();

        let now = Utc::now();
        queue.next_batch_at(1, now).unwrap();
        queue.mark_failed_at(id, network(), now).unwrap();

        // 10s * 2^1
        assert!(queue.next_batch_at(1, now + chrono::Duration::seconds(19)).unwrap().is_empty());
        assert_eq!(
            queue.next_batch_at(1, now + chrono::Duration::seconds(20)).unwrap().len(),
            1
        );
    }

    #[test]
    fn failed_entry_blocks_later_entries_of_same_record() {
        let (_, queue) = setup(config().with_collapse_mutations(false));
        let first = queue.enqueue(EntityType::Task, "T-1", Operation::Update, None).unwrap();
        queue.enqueue(EntityType::Task, "T-1", Operation::Update, None).unwrap();

        queue.next_batch(10).unwrap();
        queue
            .mark_failed(first, ClassifiedError::new(ErrorKind::Conflict, "stale"))
            .unwrap();
        assert!(queue.next_batch(10).unwrap().is_empty());

        assert_eq!(queue.retry_failed(RetryScope::All).unwrap(), 1);
        let batch = queue.next_batch(10).unwrap();
        assert_eq!(batch[0].id, first);
    }

    #[test]
    fn retry_scope_filters_kinds() {
        let (_, queue) = setup(config());
        let a = queue.enqueue(EntityType::Task, "A", Operation::Update, None).unwrap();
        let b = queue.enqueue(EntityType::Task, "B", Operation::Update, None).unwrap();
        queue.next_batch(10).unwrap();
        queue
            .mark_failed(a, ClassifiedError::new(ErrorKind::Auth, "token expired"))
            .unwrap();
        for _ in 0..3 {
            if queue.get(b).unwrap().state == EntryState::InFlight {
                queue.mark_failed(b, network()).unwrap();
            }
            queue.next_batch(10).unwrap();
        }
        assert_eq!(queue.counts().failed, 2);

        assert_eq!(queue.retry_failed(RetryScope::Retryable).unwrap(), 1);
        let entry = queue.get(b).unwrap();
        assert_eq!(entry.state, EntryState::Pending);
        assert_eq!(entry.attempts, 0);
        assert_eq!(queue.get(a).unwrap().state, EntryState::Failed);
    }

    #[test]
    fn collapse_into_failed_entry_resets_it() {
        let (_, queue) = setup(config());
        let id = queue
            .enqueue(EntityType::Employee, "E-1", Operation::Update, Some(b"bad".to_vec()))
            .unwrap();
        queue.next_batch(1).unwrap();
        queue
            .mark_failed(id, ClassifiedError::new(ErrorKind::Validation, "bad email"))
            .unwrap();

        let merged = queue
            .enqueue(EntityType::Employee, "E-1", Operation::Update, Some(b"fixed".to_vec()))
            .unwrap();
        assert_eq!(merged, id);
        let entry = queue.get(id).unwrap();
        assert_eq!(entry.state, EntryState::Pending);
        assert_eq!(entry.attempts, 0);
        assert!(entry.last_error.is_none());
    }

    #[test]
    fn clear_refuses_while_in_flight() {
        let (store, queue) = setup(config());
        let id = queue.enqueue(EntityType::Task, "T-1", Operation::Update, None).unwrap();
        queue.next_batch(1).unwrap();

        assert!(matches!(queue.clear(), Err(SyncError::QueueBusy { in_flight: 1 })));

        queue.release(id).unwrap();
        assert_eq!(queue.clear().unwrap(), 1);
        assert_eq!(queue.counts().total, 0);
        assert_eq!(store.count(QUEUE_TABLE).unwrap(), 0);
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let (_, queue) = setup(config());
        let id = queue.enqueue(EntityType::Task, "T-1", Operation::Update, None).unwrap();

        assert!(matches!(
            queue.mark_synced(id),
            Err(SyncError::InvalidStateTransition { from: EntryState::Pending, .. })
        ));
        assert!(matches!(
            queue.mark_synced(uuid::Uuid::new_v4()),
            Err(SyncError::EntryNotFound(_))
        ));
    }

    #[test]
    fn reopen_recovers_in_flight_entries() {
        let store = Arc::new(InMemoryStore::new());
        let id = {
            let queue = SyncQueue::open(store.clone(), &config()).unwrap();
            let id = queue.enqueue(EntityType::Task, "T-1", Operation::Update, None).unwrap();
            queue.enqueue(EntityType::Task, "T-2", Operation::Update, None).unwrap();
            queue.next_batch(1).unwrap();
            id
        };

        let queue = SyncQueue::open(store, &config()).unwrap();
        assert_eq!(queue.get(id).unwrap().state, EntryState::Pending);
        assert_eq!(queue.counts().pending, 2);

        let next = queue.enqueue(EntityType::Task, "T-3", Operation::Update, None).unwrap();
        assert_eq!(queue.get(next).unwrap().seq, 2);
    }

    #[test]
    fn storage_failure_leaves_queue_unchanged() {
        let (store, queue) = setup(config());
        queue.enqueue(EntityType::Task, "T-1", Operation::Update, None).unwrap();

        store.close();
        assert!(matches!(
            queue.enqueue(EntityType::Task, "T-2", Operation::Update, None),
            Err(SyncError::Storage(_))
        ));
        assert!(queue.next_batch(10).is_err());
        assert_eq!(queue.counts().pending, 1);
        assert_eq!(queue.counts().in_flight, 0);
    }

    #[test]
    fn purge_removes_only_synced() {
        let (_, queue) = setup(config());
        let a = queue.enqueue(EntityType::Task, "A", Operation::Update, None).unwrap();
        queue.enqueue(EntityType::Task, "B", Operation::Update, None).unwrap();
        queue.next_batch(1).unwrap();
        queue.mark_synced(a).unwrap();

        assert_eq!(queue.purge_synced().unwrap(), 1);
        assert!(queue.get(a).is_none());
        assert_eq!(queue.counts().total, 1);
        assert!(!queue.is_drained());
    }

    #[test]
    fn release_in_flight_survives_store_outage() {
        let (store, queue) = setup(config());
        for id in ["A", "B", "C"] {
            queue.enqueue(EntityType::Task, id, Operation::Update, None).unwrap();
        }
        assert_eq!(queue.next_batch(2).unwrap().len(), 2);

        store.close();
        assert_eq!(queue.release_in_flight(), 2);
        let counts = queue.counts();
        assert_eq!(counts.in_flight, 0);
        assert_eq!(counts.pending, 3);

        store.reopen();
        assert_eq!(queue.release_in_flight(), 0);
        let reopened = SyncQueue::open(store, &config()).unwrap();
        assert_eq!(reopened.counts().pending, 3);
    }
}
