//! Test fixtures and store helpers.
//!
//! Provides seeded legacy datasets, record payloads, and temporary
//! file-backed stores.

use hangar_storage::{FileStore, InMemoryStore, LocalStore, StorageResult, WriteBatch};
use hangar_sync_protocol::EntityType;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Record counts of a legacy dataset, one field per migrated table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyDataset {
    /// Records in `aircraft`.
    pub aircraft: usize,
    /// Records in `employees`.
    pub employees: usize,
    /// Records in `tasks`.
    pub tasks: usize,
    /// Records in `flight_sheets`.
    pub flight_sheets: usize,
}

impl LegacyDataset {
    /// The dataset used by the migration scenarios: 5 aircraft, 3
    /// employees, no tasks, 2 flight sheets.
    pub fn standard() -> Self {
        Self {
            aircraft: 5,
            employees: 3,
            tasks: 0,
            flight_sheets: 2,
        }
    }

    /// Returns the total number of records.
    pub fn total(&self) -> usize {
        self.aircraft + self.employees + self.tasks + self.flight_sheets
    }

    /// Returns `(entity type, count)` pairs in migration order.
    pub fn tables(&self) -> Vec<(EntityType, usize)> {
        vec![
            (EntityType::Aircraft, self.aircraft),
            (EntityType::Employee, self.employees),
            (EntityType::Task, self.tasks),
            (EntityType::FlightSheet, self.flight_sheets),
        ]
    }

    /// Writes the dataset into `store`. Record IDs are
    /// `{entity_type}-{n}` with `n` starting at 1.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects a write.
    pub fn seed(&self, store: &dyn LocalStore) -> StorageResult<()> {
        for (entity_type, count) in self.tables() {
            let mut batch = WriteBatch::new();
            for n in 1..=count {
                let id = legacy_id(&entity_type, n);
                batch.put(id.clone(), record_payload(&entity_type, &id));
            }
            store.write_batch(entity_type.table_name(), batch)?;
        }
        Ok(())
    }
}

/// Returns the ID [`LegacyDataset::seed`] gives to the `n`-th record.
pub fn legacy_id(entity_type: &EntityType, n: usize) -> String {
    format!("{}-{n}", entity_type.as_str())
}

/// Builds a JSON record payload.
pub fn record_payload(entity_type: &EntityType, id: &str) -> Vec<u8> {
    json!({
        "id": id,
        "type": entity_type.as_str(),
        "revision": 1,
    })
    .to_string()
    .into_bytes()
}

/// Builds a JSON aircraft payload.
pub fn aircraft_payload(registration: &str, model: &str, hours: u32) -> Vec<u8> {
    json!({
        "registration": registration,
        "model": model,
        "totalHours": hours,
    })
    .to_string()
    .into_bytes()
}

/// Returns a fresh in-memory store.
pub fn memory_store() -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::new())
}

/// A file store in a temporary directory, removed on drop.
pub struct TempStore {
    /// The store.
    pub store: Arc<FileStore>,
    dir: TempDir,
}

impl TempStore {
    /// Opens a file store in a new temporary directory.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::open(&dir.path().join("store")).expect("Failed to open file store");
        Self {
            store: Arc::new(store),
            dir,
        }
    }

    /// Closes and reopens the store, as after a process restart.
    ///
    /// Panics if another clone of the store is still alive, since it
    /// holds the directory lock.
    pub fn reopen(self) -> Self {
        let Self { store, dir } = self;
        assert_eq!(
            Arc::strong_count(&store),
            1,
            "store still shared; drop every clone before reopening"
        );
        drop(store);
        let store = FileStore::open(&dir.path().join("store")).expect("Failed to reopen file store");
        Self {
            store: Arc::new(store),
            dir,
        }
    }

    /// Returns the store directory.
    pub fn path(&self) -> std::path::PathBuf {
        self.dir.path().join("store")
    }

    /// Returns the temporary root directory.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}

impl Default for TempStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TempStore {
    type Target = FileStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}
