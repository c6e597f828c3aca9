//! Remote store abstraction.
//!
//! The executor and the migration engine talk to the remote side only
//! through [`RemoteStore`]. Adapters translate their transport failures into
//! [`RemoteError`] variants so the classifier can decide what to retry.

use async_trait::async_trait;
use hangar_storage::{LocalStore, StorageError};
use hangar_sync_protocol::{EntityType, RemoteError};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A remote store that accepts record upserts and deletes.
///
/// # Invariants
///
/// - `upsert` is idempotent: applying the same payload twice leaves the
///   same remote state
/// - `check` performs no mutation
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Creates or replaces a record.
    async fn upsert(
        &self,
        entity_type: &EntityType,
        entity_id: &str,
        payload: &[u8],
    ) -> Result<(), RemoteError>;

    /// Deletes a record. Returns [`RemoteError::NotFound`] if it is absent.
    async fn delete(&self, entity_type: &EntityType, entity_id: &str) -> Result<(), RemoteError>;

    /// Verifies that the remote is configured and reachable.
    async fn check(&self) -> Result<(), RemoteError>;
}

/// A call observed by [`MockRemote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    /// An upsert.
    Upsert {
        /// Entity type.
        entity_type: EntityType,
        /// Entity ID.
        entity_id: String,
        /// Payload bytes.
        payload: Vec<u8>,
    },
    /// A delete.
    Delete {
        /// Entity type.
        entity_type: EntityType,
        /// Entity ID.
        entity_id: String,
    },
    /// A reachability check.
    Check,
}

impl RemoteCall {
    /// Returns the entity ID the call addressed, if any.
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            RemoteCall::Upsert { entity_id, .. } | RemoteCall::Delete { entity_id, .. } => {
                Some(entity_id)
            }
            RemoteCall::Check => None,
        }
    }
}

/// An in-memory remote for testing.
///
/// Failures can be scripted per entity ID, either once (`fail_next`) or
/// for every call (`fail_always`). An unreachable mock fails every call
/// with [`RemoteError::Network`].
#[derive(Debug, Default)]
pub struct MockRemote {
    records: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    calls: Mutex<Vec<RemoteCall>>,
    next_failures: Mutex<HashMap<String, VecDeque<RemoteError>>>,
    permanent_failures: Mutex<HashMap<String, RemoteError>>,
    unreachable: AtomicBool,
    latency: Mutex<Option<Duration>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl MockRemote {
    /// Creates a reachable, empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the mock reachable or unreachable.
    pub fn set_reachable(&self, reachable: bool) {
        self.unreachable.store(!reachable, Ordering::SeqCst);
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Fails the next call for `entity_id` with `error`. Calls queue up.
    pub fn fail_next(&self, entity_id: &str, error: RemoteError) {
        self.next_failures
            .lock()
            .entry(entity_id.to_string())
            .or_default()
            .push_back(error);
    }

    /// Fails every call for `entity_id` with `error`.
    pub fn fail_always(&self, entity_id: &str, error: RemoteError) {
        self.permanent_failures
            .lock()
            .insert(entity_id.to_string(), error);
    }

    /// Removes every scripted failure.
    pub fn clear_failures(&self) {
        self.next_failures.lock().clear();
        self.permanent_failures.lock().clear();
    }

    /// Seeds a record without recording a call.
    pub fn insert(&self, entity_type: &EntityType, entity_id: &str, payload: &[u8]) {
        self.records
            .lock()
            .insert(Self::key(entity_type, entity_id), payload.to_vec());
    }

    /// Returns a stored record.
    pub fn record(&self, entity_type: &EntityType, entity_id: &str) -> Option<Vec<u8>> {
        self.records
            .lock()
            .get(&Self::key(entity_type, entity_id))
            .cloned()
    }

    /// Returns the number of stored records.
    pub fn record_count(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns every stored record keyed by `(entity_type, entity_id)`.
    pub fn records(&self) -> BTreeMap<(String, String), Vec<u8>> {
        self.records.lock().clone()
    }

    /// Returns every call in arrival order.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().clone()
    }

    /// Returns the calls that addressed `entity_id`.
    pub fn calls_for(&self, entity_id: &str) -> Vec<RemoteCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.entity_id() == Some(entity_id))
            .cloned()
            .collect()
    }

    /// Returns the highest number of simultaneous calls observed.
    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn key(entity_type: &EntityType, entity_id: &str) -> (String, String) {
        (entity_type.as_str().to_string(), entity_id.to_string())
    }

    async fn enter(&self, call: RemoteCall) -> Result<ActiveCall<'_>, RemoteError> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        let guard = ActiveCall(&self.active);

        let entity_id = call.entity_id().map(str::to_string);
        self.calls.lock().push(call);

        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if self.unreachable.load(Ordering::SeqCst) {
            return Err(RemoteError::Network("remote unreachable".into()));
        }
        if let Some(id) = entity_id {
            if let Some(error) = self.next_failures.lock().get_mut(&id).and_then(VecDeque::pop_front) {
                return Err(error);
            }
            if let Some(error) = self.permanent_failures.lock().get(&id) {
                return Err(error.clone());
            }
        }
        Ok(guard)
    }
}

struct ActiveCall<'a>(&'a AtomicUsize);

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteStore for MockRemote {
    async fn upsert(
        &self,
        entity_type: &EntityType,
        entity_id: &str,
        payload: &[u8],
    ) -> Result<(), RemoteError> {
        let _active = self
            .enter(RemoteCall::Upsert {
                entity_type: entity_type.clone(),
                entity_id: entity_id.to_string(),
                payload: payload.to_vec(),
            })
            .await?;
        self.insert(entity_type, entity_id, payload);
        Ok(())
    }

    async fn delete(&self, entity_type: &EntityType, entity_id: &str) -> Result<(), RemoteError> {
        let _active = self
            .enter(RemoteCall::Delete {
                entity_type: entity_type.clone(),
                entity_id: entity_id.to_string(),
            })
            .await?;
        match self.records.lock().remove(&Self::key(entity_type, entity_id)) {
            Some(_) => Ok(()),
            None => Err(RemoteError::NotFound(format!("{entity_type}/{entity_id}"))),
        }
    }

    async fn check(&self) -> Result<(), RemoteError> {
        let _active = self.enter(RemoteCall::Check).await?;
        Ok(())
    }
}

/// A remote that mirrors records into another [`LocalStore`], one table
/// per entity type.
///
/// Used by the CLI to sync one store directory into another.
pub struct StoreRemote {
    store: Arc<dyn LocalStore>,
}

impl StoreRemote {
    /// Creates a mirror over `store`.
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    /// Returns the mirror store.
    pub fn store(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }
}

impl std::fmt::Debug for StoreRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRemote").finish_non_exhaustive()
    }
}

fn storage_to_remote(error: StorageError) -> RemoteError {
    match error {
        StorageError::Closed | StorageError::Locked => RemoteError::Network(error.to_string()),
        StorageError::InvalidTable(table) => {
            RemoteError::Rejected(format!("unsupported entity type: {table}"))
        }
        other => RemoteError::Server {
            status: 500,
            message: other.to_string(),
        },
    }
}

#[async_trait]
impl RemoteStore for StoreRemote {
    async fn upsert(
        &self,
        entity_type: &EntityType,
        entity_id: &str,
        payload: &[u8],
    ) -> Result<(), RemoteError> {
        self.store
            .put(entity_type.table_name(), entity_id, payload)
            .map_err(storage_to_remote)
    }

    async fn delete(&self, entity_type: &EntityType, entity_id: &str) -> Result<(), RemoteError> {
        let existed = self
            .store
            .delete(entity_type.table_name(), entity_id)
            .map_err(storage_to_remote)?;
        if existed {
            Ok(())
        } else {
            Err(RemoteError::NotFound(format!("{entity_type}/{entity_id}")))
        }
    }

    async fn check(&self) -> Result<(), RemoteError> {
        self.store.tables().map(|_| ()).map_err(storage_to_remote)
    }
}
