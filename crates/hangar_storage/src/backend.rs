//! Local store trait definition.

use crate::error::{StorageError, StorageResult};

/// A single write inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Insert or overwrite `key` with `value`.
    Put {
        /// Record key.
        key: String,
        /// Record bytes.
        value: Vec<u8>,
    },
    /// Remove `key` if present.
    Delete {
        /// Record key.
        key: String,
    },
}

/// An ordered group of writes against one table.
///
/// Backends that can persist a table in one step override
/// [`LocalStore::write_batch`] so the whole batch becomes durable together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a put.
    pub fn put(&mut self, key: impl Into<String>, value: Vec<u8>) -> &mut Self {
        self.ops.push(BatchOp::Put {
            key: key.into(),
            value,
        });
        self
    }

    /// Queues a delete.
    pub fn delete(&mut self, key: impl Into<String>) -> &mut Self {
        self.ops.push(BatchOp::Delete { key: key.into() });
        self
    }

    /// Returns true if the batch holds no writes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Returns the number of queued writes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns the queued writes in order.
    #[must_use]
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Consumes the batch, returning its writes.
    #[must_use]
    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

/// A durable key-value store organised into named tables.
///
/// Stores are **opaque byte stores**. They do not interpret record values;
/// the sync queue and the legacy dataset both keep their own encodings.
///
/// # Invariants
///
/// - `list` returns records ordered by key
/// - a successful `put` is visible to every later `get` and `list`
/// - a table that was never written behaves as an empty table
/// - implementations must be `Send + Sync` and use interior mutability
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For tests and ephemeral clients
/// - [`super::FileStore`] - For persistent storage in a directory
pub trait LocalStore: Send + Sync {
    /// Reads the record stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn get(&self, table: &str, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Inserts or overwrites a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the table name is invalid or the write fails.
    fn put(&self, table: &str, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Removes a record, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn delete(&self, table: &str, key: &str) -> StorageResult<bool>;

    /// Lists every record of a table ordered by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn list(&self, table: &str) -> StorageResult<Vec<(String, Vec<u8>)>>;

    /// Lists the names of all non-empty tables.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn tables(&self) -> StorageResult<Vec<String>>;

    /// Returns the number of records in a table.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn count(&self, table: &str) -> StorageResult<usize> {
        Ok(self.list(table)?.len())
    }

    /// Applies a batch of writes to one table.
    ///
    /// The default implementation applies the writes one at a time.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered.
    fn write_batch(&self, table: &str, batch: WriteBatch) -> StorageResult<()> {
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { key, value } => self.put(table, &key, &value)?,
                BatchOp::Delete { key } => {
                    self.delete(table, &key)?;
                }
            }
        }
        Ok(())
    }

    /// Removes every record of a table, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn clear_table(&self, table: &str) -> StorageResult<usize> {
        let records = self.list(table)?;
        let mut batch = WriteBatch::new();
        for (key, _) in &records {
            batch.delete(key.clone());
        }
        self.write_batch(table, batch)?;
        Ok(records.len())
    }

    /// Flushes pending writes to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&self) -> StorageResult<()>;
}

/// Validates a table name: ASCII alphanumerics, `_` and `-` only.
pub(crate) fn validate_table(table: &str) -> StorageResult<()> {
    let valid = !table.is_empty()
        && table.len() <= 64
        && table
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidTable(table.to_string()))
    }
}
