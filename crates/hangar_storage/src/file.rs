//! Directory-backed store for persistent storage.

use crate::backend::{validate_table, BatchOp, LocalStore, WriteBatch};
use crate::error::{StorageError, StorageResult};
use ciborium::value::Value;
use fs2::FileExt;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Lock file name within the store directory.
const LOCK_FILE: &str = "LOCK";
/// Extension of table files.
const TABLE_EXT: &str = "tbl";
/// Current table file format version.
const FORMAT_VERSION: i64 = 1;

type Records = BTreeMap<String, Vec<u8>>;

/// A directory-backed store.
///
/// Each table is a single CBOR file (`<table>.tbl`) holding a map of keys to
/// byte strings. Tables are loaded once when the store opens and rewritten
/// atomically (temp file, fsync, rename) on every write, so a crash leaves
/// either the old or the new table contents on disk.
///
/// ```text
/// <dir>/
/// ├─ LOCK              # Advisory lock for single-writer
/// ├─ sync_queue.tbl
/// ├─ aircraft.tbl
/// └─ ...
/// ```
///
/// # Example
///
/// ```no_run
/// use hangar_storage::{FileStore, LocalStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("client-data")).unwrap();
/// store.put("aircraft", "EC-MKV", b"{}").unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    tables: RwLock<BTreeMap<String, Records>>,
    _lock_file: File,
}

impl FileStore {
    /// Opens or creates a store directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - Another process holds the lock (returns `Locked`)
    /// - A table file cannot be decoded (returns `Corrupted`)
    pub fn open(path: &Path) -> StorageResult<Self> {
        fs::create_dir_all(path)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked);
        }

        let mut tables = BTreeMap::new();
        for dir_entry in fs::read_dir(path)? {
            let file_path = dir_entry?.path();
            if file_path.extension().and_then(|e| e.to_str()) != Some(TABLE_EXT) {
                continue;
            }
            let Some(table) = file_path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let records = read_table(table, &file_path)?;
            debug!(table, records = records.len(), "loaded table");
            tables.insert(table.to_string(), records);
        }

        Ok(Self {
            path: path.to_path_buf(),
            tables: RwLock::new(tables),
            _lock_file: lock_file,
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn table_path(&self, table: &str) -> PathBuf {
        self.path.join(format!("{table}.{TABLE_EXT}"))
    }

    /// Persists `records` as the new contents of `table`.
    fn persist(&self, table: &str, records: &Records) -> StorageResult<()> {
        let target = self.table_path(table);
        if records.is_empty() {
            if target.exists() {
                fs::remove_file(&target)?;
            }
            return Ok(());
        }

        let bytes = encode_table(table, records)?;
        let temp = self.path.join(format!("{table}.{TABLE_EXT}.tmp"));
        {
            let mut file = File::create(&temp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&temp, &target)?;
        Ok(())
    }

    /// Applies `ops` to a copy of the table, persists it, then publishes it.
    fn mutate(&self, table: &str, ops: Vec<BatchOp>) -> StorageResult<()> {
        validate_table(table)?;
        let mut tables = self.tables.write();
        let mut records = tables.get(table).cloned().unwrap_or_default();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    records.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    records.remove(&key);
                }
            }
        }
        self.persist(table, &records)?;
        if records.is_empty() {
            tables.remove(table);
        } else {
            tables.insert(table.to_string(), records);
        }
        Ok(())
    }
}

impl LocalStore for FileStore {
    fn get(&self, table: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self
            .tables
            .read()
            .get(table)
            .and_then(|records| records.get(key))
            .cloned())
    }

    fn put(&self, table: &str, key: &str, value: &[u8]) -> StorageResult<()> {
        self.mutate(
            table,
            vec![BatchOp::Put {
                key: key.to_string(),
                value: value.to_vec(),
            }],
        )
    }

    fn delete(&self, table: &str, key: &str) -> StorageResult<bool> {
        let existed = self
            .tables
            .read()
            .get(table)
            .is_some_and(|records| records.contains_key(key));
        if existed {
            self.mutate(
                table,
                vec![BatchOp::Delete {
                    key: key.to_string(),
                }],
            )?;
        }
        Ok(existed)
    }

    fn list(&self, table: &str) -> StorageResult<Vec<(String, Vec<u8>)>> {
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
        Ok(self.tables.read().keys().cloned().collect())
    }

    fn count(&self, table: &str) -> StorageResult<usize> {
        Ok(self.tables.read().get(table).map_or(0, BTreeMap::len))
    }

    fn write_batch(&self, table: &str, batch: WriteBatch) -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.mutate(table, batch.into_ops())
    }

    fn flush(&self) -> StorageResult<()> {
        // Every write is synced before it is published
        Ok(())
    }
}

fn encode_table(table: &str, records: &Records) -> StorageResult<Vec<u8>> {
    let entries = records
        .iter()
        .map(|(k, v)| (Value::Text(k.clone()), Value::Bytes(v.clone())))
        .collect();
    let document = Value::Map(vec![
        (
            Value::Text("version".into()),
            Value::Integer(FORMAT_VERSION.into()),
        ),
        (Value::Text("records".into()), Value::Map(entries)),
    ]);

    let mut bytes = Vec::new();
    ciborium::ser::into_writer(&document, &mut bytes)
        .map_err(|e| StorageError::corrupted(table, format!("encode failed: {e}")))?;
    Ok(bytes)
}

fn read_table(table: &str, path: &Path) -> StorageResult<Records> {
    let bytes = fs::read(path)?;
    let document: Value = ciborium::de::from_reader(bytes.as_slice())
        .map_err(|e| StorageError::corrupted(table, format!("decode failed: {e}")))?;

    let Value::Map(fields) = document else {
        return Err(StorageError::corrupted(table, "expected map"));
    };

    let version = fields
        .iter()
        .find(|(k, _)| k.as_text() == Some("version"))
        .and_then(|(_, v)| v.as_integer())
        .and_then(|v| i64::try_from(v).ok())
        .ok_or_else(|| StorageError::corrupted(table, "missing version"))?;
    if version != FORMAT_VERSION {
        return Err(StorageError::corrupted(
            table,
            format!("unsupported format version {version}"),
        ));
    }

    let entries = fields
        .into_iter()
        .find(|(k, _)| k.as_text() == Some("records"))
        .map(|(_, v)| v)
        .ok_or_else(|| StorageError::corrupted(table, "missing records"))?;
    let Value::Map(entries) = entries else {
        return Err(StorageError::corrupted(table, "records must be a map"));
    };

    let mut records = Records::new();
    for (key, value) in entries {
        match (key, value) {
            (Value::Text(key), Value::Bytes(value)) => {
                records.insert(key, value);
            }
            _ => return Err(StorageError::corrupted(table, "record must be text -> bytes")),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store");

        let store = FileStore::open(&path).unwrap();
        assert!(store.tables().unwrap().is_empty());
        assert!(path.join(LOCK_FILE).exists());
        assert_eq!(store.path(), path);
    }

    #[test]
    fn file_put_and_get() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.put("aircraft", "EC-MKV", b"a320").unwrap();
        assert_eq!(
            store.get("aircraft", "EC-MKV").unwrap(),
            Some(b"a320".to_vec())
        );
        assert!(dir.path().join("aircraft.tbl").exists());
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();

        {
            let store = FileStore::open(dir.path()).unwrap();
            store.put("employees", "e1", b"alice").unwrap();
            store.put("employees", "e2", b"bob").unwrap();
            store.delete("employees", "e1").unwrap();
        }

        {
            let store = FileStore::open(dir.path()).unwrap();
            let records = store.list("employees").unwrap();
            assert_eq!(records, vec![("e2".to_string(), b"bob".to_vec())]);
        }
    }

    #[test]
    fn file_second_open_is_locked() {
        let dir = tempdir().unwrap();
        let _first = FileStore::open(dir.path()).unwrap();

        let second = FileStore::open(dir.path());
        assert!(matches!(second, Err(StorageError::Locked)));
    }

    #[test]
    fn file_empty_table_removes_file() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.put("tasks", "t1", b"x").unwrap();
        assert_eq!(store.clear_table("tasks").unwrap(), 1);
        assert!(!dir.path().join("tasks.tbl").exists());
        assert!(store.tables().unwrap().is_empty());
    }

    #[test]
    fn file_write_batch_is_single_rewrite() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        let mut batch = WriteBatch::new();
        for i in 0..10 {
            batch.put(format!("k{i:02}"), vec![i]);
        }
        store.write_batch("q", batch).unwrap();

        assert_eq!(store.count("q").unwrap(), 10);
        assert!(!dir.path().join("q.tbl.tmp").exists());
    }

    #[test]
    fn file_corrupted_table_is_reported() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("broken.tbl"), b"\xff\x00not cbor").unwrap();

        let result = FileStore::open(dir.path());
        assert!(matches!(result, Err(StorageError::Corrupted { .. })));
    }

    #[test]
    fn file_delete_missing_is_false() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(!store.delete("nothing", "here").unwrap());
    }
}
