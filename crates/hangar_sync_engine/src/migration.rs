//! One-shot transfer of a legacy local dataset into the remote store.
//!
//! Tables are migrated one after another and records in key order. A record
//! that fails is recorded and skipped; the run always produces a
//! [`MigrationResult`] instead of an error, including when the remote is
//! unreachable. Records are upserted, so re-running a migration is safe.

use crate::config::{MigrationConfig, MigrationTable};
use crate::error::SyncResult;
use crate::lock::RunLock;
use crate::log::SyncLog;
use crate::remote::RemoteStore;
use chrono::Utc;
use hangar_storage::{LocalStore, WriteBatch};
use hangar_sync_protocol::{
    LocalCounts, MigrationDetails, MigrationProgress, MigrationResult, MigrationStatus,
    RemoteError, SyncLogEntry, TableCount,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Table recording which legacy records have been pushed.
pub const SYNC_MARKS_TABLE: &str = "_sync_marks";

/// Drives a migration run.
pub struct MigrationEngine {
    config: MigrationConfig,
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
    log: Arc<SyncLog>,
    lock: RunLock,
    cancelled: AtomicBool,
}

impl MigrationEngine {
    /// Creates an engine over the legacy store.
    pub fn new(
        config: MigrationConfig,
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        log: Arc<SyncLog>,
        lock: RunLock,
    ) -> Self {
        Self {
            config,
            store,
            remote,
            log,
            lock,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Returns the configured tables in migration order.
    pub fn tables(&self) -> &[MigrationTable] {
        &self.config.tables
    }

    /// Returns true if the remote answers its reachability check.
    pub async fn is_remote_configured(&self) -> bool {
        self.check_remote().await.is_ok()
    }

    /// Counts the records of each configured table.
    ///
    /// # Errors
    ///
    /// Returns an error if the local store is unavailable.
    pub fn local_counts(&self) -> SyncResult<LocalCounts> {
        let mut pairs = Vec::with_capacity(self.config.tables.len());
        for table in &self.config.tables {
            pairs.push((table.name.clone(), self.store.count(&table.name)?));
        }
        Ok(LocalCounts::from_pairs(pairs))
    }

    /// Stops a running migration at the next record boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Pushes every record of every configured table to the remote.
    ///
    /// Waits for any running sync pass to finish first and holds the run
    /// lock for the whole migration. `on_progress` is called after each
    /// record and once more when a table ends. A cancel issued while
    /// waiting for the lock ends the run before any record is pushed.
    pub async fn migrate_all<F>(&self, mut on_progress: F) -> MigrationResult
    where
        F: FnMut(MigrationProgress) + Send,
    {
        self.cancelled.store(false, Ordering::SeqCst);
        let _lock = self.lock.acquire().await;
        if self.cancelled.load(Ordering::SeqCst) {
            let message = "migration cancelled after 0 records".to_string();
            info!("migration cancelled before it started");
            self.log
                .append(SyncLogEntry::error("migrate", "all", message.clone()));
            return MigrationResult {
                success: false,
                message,
                details: MigrationDetails::default(),
            };
        }
        self.log
            .append(SyncLogEntry::info("migrate", "all", "migration started"));

        if let Err(error) = self.check_remote().await {
            let message = format!("remote store is not reachable: {error}");
            self.log
                .append(SyncLogEntry::error("migrate", "all", message.clone()));
            return MigrationResult {
                success: false,
                message,
                details: MigrationDetails::default(),
            };
        }

        let mut details = MigrationDetails::default();
        let mut cancelled = false;

        for table in &self.config.tables {
            let records = match self.store.list(&table.name) {
                Ok(records) => records,
                Err(error) => {
                    self.record_error(&mut details, format!("{}: {error}", table.name));
                    details.migrated.push(TableCount {
                        table: table.name.clone(),
                        count: 0,
                    });
                    on_progress(progress(table, 0, 0, MigrationStatus::Error));
                    continue;
                }
            };

            let total = records.len();
            let mut migrated = 0;
            let mut failed = 0;
            debug!(table = %table.name, total, "migrating table");
            on_progress(progress(table, 0, total, MigrationStatus::Migrating));

            for (index, (id, payload)) in records.iter().enumerate() {
                if self.cancelled.load(Ordering::SeqCst) {
                    cancelled = true;
                    break;
                }
                match self.upsert(table, id, payload).await {
                    Ok(()) => migrated += 1,
                    Err(error) => {
                        failed += 1;
                        warn!(table = %table.name, record = %id, %error, "record migration failed");
                        self.record_error(&mut details, format!("{}/{id}: {error}", table.name));
                    }
                }
                on_progress(progress(table, index + 1, total, MigrationStatus::Migrating));
            }

            details.migrated.push(TableCount {
                table: table.name.clone(),
                count: migrated,
            });
            if cancelled {
                on_progress(progress(table, migrated + failed, total, MigrationStatus::Error));
                break;
            }

            let status = if failed == 0 {
                MigrationStatus::Completed
            } else {
                MigrationStatus::Error
            };
            on_progress(progress(table, total, total, status));
            let summary = format!("migrated {migrated} of {total} records");
            if failed == 0 {
                self.log
                    .append(SyncLogEntry::success("migrate", table.name.clone(), summary));
            } else {
                self.log
                    .append(SyncLogEntry::error("migrate", table.name.clone(), summary));
            }
        }

        let migrated = details.total_migrated();
        let (success, message) = if cancelled {
            (false, format!("migration cancelled after {migrated} records"))
        } else if details.error_count == 0 {
            (true, format!("migrated {migrated} records"))
        } else {
            (
                false,
                format!(
                    "migrated {migrated} records; {} failed",
                    details.error_count
                ),
            )
        };

        info!(success, migrated, errors = details.error_count, "migration finished");
        self.log.append(if success {
            SyncLogEntry::success("migrate", "all", message.clone())
        } else {
            SyncLogEntry::error("migrate", "all", message.clone())
        });

        MigrationResult {
            success,
            message,
            details,
        }
    }

    /// Records every record of every configured table as synced. Returns
    /// the number of marks written.
    ///
    /// # Errors
    ///
    /// Returns an error if the local store fails.
    pub fn mark_all_synced(&self) -> SyncResult<usize> {
        let stamp = Utc::now().to_rfc3339().into_bytes();
        let mut batch = WriteBatch::new();
        for table in &self.config.tables {
            for (id, _) in self.store.list(&table.name)? {
                batch.put(mark_key(&table.name, &id), stamp.clone());
            }
        }

        let marked = batch.len();
        self.store.write_batch(SYNC_MARKS_TABLE, batch)?;
        info!(marked, "legacy records marked synced");
        Ok(marked)
    }

    /// Returns true if [`Self::mark_all_synced`] covered this record.
    ///
    /// # Errors
    ///
    /// Returns an error if the local store fails.
    pub fn is_record_synced(&self, table: &str, id: &str) -> SyncResult<bool> {
        Ok(self.store.get(SYNC_MARKS_TABLE, &mark_key(table, id))?.is_some())
    }

    async fn check_remote(&self) -> Result<(), RemoteError> {
        match tokio::time::timeout(self.config.request_timeout, self.remote.check()).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout),
        }
    }

    async fn upsert(&self, table: &MigrationTable, id: &str, payload: &[u8]) -> Result<(), RemoteError> {
        let call = self.remote.upsert(&table.entity_type, id, payload);
        match tokio::time::timeout(self.config.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout),
        }
    }

    fn record_error(&self, details: &mut MigrationDetails, message: String) {
        if details.errors.len() < self.config.max_reported_errors {
            details.errors.push(message);
        }
        details.error_count += 1;
    }
}

impl std::fmt::Debug for MigrationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationEngine")
            .field("tables", &self.config.tables.len())
            .finish_non_exhaustive()
    }
}

fn progress(table: &MigrationTable, current: usize, total: usize, status: MigrationStatus) -> MigrationProgress {
    MigrationProgress {
        table: table.name.clone(),
        current,
        total,
        status,
    }
}

fn mark_key(table: &str, id: &str) -> String {
    format!("{table}:{id}")
}
