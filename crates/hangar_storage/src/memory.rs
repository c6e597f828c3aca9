//! In-memory store for tests and ephemeral clients.

use crate::backend::{validate_table, BatchOp, LocalStore, WriteBatch};
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

type Tables = BTreeMap<String, BTreeMap<String, Vec<u8>>>;

/// An in-memory store.
///
/// This store keeps all tables in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Clients that do not need to survive a restart
///
/// A store can be [`close`](Self::close)d to simulate the local persistence
/// layer becoming unavailable; every operation then fails with
/// [`StorageError::Closed`] until [`reopen`](Self::reopen) is called.
///
/// # Example
///
/// ```rust
/// use hangar_storage::{InMemoryStore, LocalStore};
///
/// let store = InMemoryStore::new();
/// store.put("aircraft", "EC-MKV", b"{}").unwrap();
/// assert_eq!(store.count("aircraft").unwrap(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    closed: AtomicBool,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the store unavailable.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Makes a closed store available again, keeping its contents.
    pub fn reopen(&self) {
        self.closed.store(false, Ordering::SeqCst);
    }

    /// Returns a copy of every table.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, BTreeMap<String, Vec<u8>>> {
        self.tables.read().clone()
    }

    fn check_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }
}

impl LocalStore for InMemoryStore {
    fn get(&self, table: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.check_open()?;
        Ok(self
            .tables
            .read()
            .get(table)
            .and_then(|records| records.get(key))
            .cloned())
    }

    fn put(&self, table: &str, key: &str, value: &[u8]) -> StorageResult<()> {
        self.check_open()?;
        validate_table(table)?;
        self.tables
            .write()
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, table: &str, key: &str) -> StorageResult<bool> {
        self.check_open()?;
        let mut tables = self.tables.write();
        let removed = match tables.get_mut(table) {
            Some(records) => records.remove(key).is_some(),
            None => false,
        };
        if tables.get(table).is_some_and(BTreeMap::is_empty) {
            tables.remove(table);
        }
        Ok(removed)
    }

    fn list(&self, table: &str) -> StorageResult<Vec<(String, Vec<u8>)>> {
        self.check_open()?;
        Ok(self
            .tables
            .read()
            .get(table)
            .map(|records| {
                records
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn tables(&self) -> StorageResult<Vec<String>> {
        self.check_open()?;
        Ok(self.tables.read().keys().cloned().collect())
    }

    fn count(&self, table: &str) -> StorageResult<usize> {
        self.check_open()?;
        Ok(self.tables.read().get(table).map_or(0, BTreeMap::len))
    }

    fn write_batch(&self, table: &str, batch: WriteBatch) -> StorageResult<()> {
        self.check_open()?;
        validate_table(table)?;
        let mut tables = self.tables.write();
        let records = tables.entry(table.to_string()).or_default();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { key, value } => {
                    records.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    records.remove(&key);
                }
            }
        }
        if records.is_empty() {
            tables.remove(table);
        }
        Ok(())
    }

    fn flush(&self) -> StorageResult<()> {
        // Nothing is buffered
        self.check_open()
    }
}
