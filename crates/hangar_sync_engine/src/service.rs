//! Application-facing facade.

use crate::config::{MigrationConfig, SyncConfig};
use crate::connectivity::{ConnectivityMonitor, ConnectivityProbe};
use crate::error::SyncResult;
use crate::executor::SyncExecutor;
use crate::lock::RunLock;
use crate::log::SyncLog;
use crate::migration::MigrationEngine;
use crate::queue::SyncQueue;
use crate::remote::RemoteStore;
use crate::stats::{StatsPublisher, Subscription};
use hangar_storage::LocalStore;
use hangar_sync_protocol::{
    ConnectionStatus, EntityType, EntryId, LocalCounts, MigrationProgress, MigrationResult,
    Operation, SyncLogEntry, SyncQueueEntry, SyncStats, SyncStatus,
};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, warn};

/// Wires the sync components together over one local store and one remote.
///
/// The queue and the legacy tables share the local store; they live in
/// different tables.
pub struct SyncService {
    config: SyncConfig,
    queue: Arc<SyncQueue>,
    connectivity: Arc<ConnectivityMonitor>,
    stats: StatsPublisher,
    log: Arc<SyncLog>,
    executor: Arc<SyncExecutor>,
    migration: Arc<MigrationEngine>,
}

impl SyncService {
    /// Opens the service, recovering any interrupted queue state.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be loaded.
    pub fn open(
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        probe: Arc<dyn ConnectivityProbe>,
        config: SyncConfig,
        migration_config: MigrationConfig,
    ) -> SyncResult<Self> {
        let queue = Arc::new(SyncQueue::open(store.clone(), &config)?);
        let connectivity = Arc::new(ConnectivityMonitor::new(probe));
        let stats = StatsPublisher::new();
        let log = Arc::new(SyncLog::new(config.log_capacity));
        let lock = RunLock::new();

        let executor = Arc::new(SyncExecutor::new(
            config.clone(),
            queue.clone(),
            remote.clone(),
            connectivity.clone(),
            stats.clone(),
            log.clone(),
            lock.clone(),
        ));
        let migration = Arc::new(MigrationEngine::new(
            migration_config,
            store,
            remote,
            log.clone(),
            lock,
        ));

        stats.set_online(connectivity.is_online());
        stats.refresh_counts(|| queue.counts());

        Ok(Self {
            config,
            queue,
            connectivity,
            stats,
            log,
            executor,
            migration,
        })
    }

    /// Records a local mutation for later sync.
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
        let id = self
            .queue
            .enqueue(entity_type, entity_id, operation, payload)?;
        self.publish();
        Ok(id)
    }

    /// Registers a stats callback; the current snapshot is delivered at once.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SyncStats) + Send + Sync + 'static,
    {
        self.stats.subscribe(callback)
    }

    /// Returns the current stats snapshot.
    pub fn stats(&self) -> SyncStats {
        self.stats.current()
    }

    /// Returns the compact status.
    pub fn status(&self) -> SyncStatus {
        self.stats.current().status()
    }

    /// Returns the current network observation.
    pub fn connection_status(&self) -> ConnectionStatus {
        self.connectivity.status()
    }

    /// Runs a sync pass now. Returns false if the pass was skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue's storage fails.
    pub async fn force_sync_now(&self) -> SyncResult<bool> {
        self.connectivity.refresh();
        self.executor.run_once().await
    }

    /// Requeues retryable failures and runs a sync pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue's storage fails.
    pub async fn retry_failed_operations(&self) -> SyncResult<bool> {
        self.executor.retry_failed_operations().await
    }

    /// Stops a running sync pass at the next entry boundary.
    pub fn cancel_sync(&self) {
        self.executor.cancel();
    }

    /// Returns up to `limit` log records, most recent first.
    pub fn sync_log(&self, limit: usize) -> Vec<SyncLogEntry> {
        self.log.recent(limit)
    }

    /// Empties the sync log.
    pub fn clear_sync_log(&self) {
        self.log.clear();
    }

    /// Returns every queue entry in creation order.
    pub fn queue_entries(&self) -> Vec<SyncQueueEntry> {
        self.queue.entries()
    }

    /// Returns the queue.
    pub fn queue(&self) -> &Arc<SyncQueue> {
        &self.queue
    }

    /// Returns true if the remote answers its reachability check.
    pub async fn is_remote_configured(&self) -> bool {
        self.migration.is_remote_configured().await
    }

    /// Counts the legacy records awaiting migration.
    ///
    /// # Errors
    ///
    /// Returns an error if the local store is unavailable.
    pub fn local_counts(&self) -> SyncResult<LocalCounts> {
        self.migration.local_counts()
    }

    /// Migrates the legacy dataset. Waits for a running sync pass first.
    ///
    /// Sync requests made while the migration holds the run lock are
    /// skipped, so pending entries are drained by one pass afterwards.
    pub async fn migrate_all<F>(&self, on_progress: F) -> MigrationResult
    where
        F: FnMut(MigrationProgress) + Send,
    {
        let result = self.migration.migrate_all(on_progress).await;
        if self.queue.counts().pending > 0 {
            if let Err(error) = self.executor.run_once().await {
                warn!(%error, "sync pass after migration failed");
            }
        }
        result
    }

    /// Stops a running migration at the next record boundary.
    pub fn cancel_migration(&self) {
        self.migration.cancel();
    }

    /// Removes every queue entry.
    ///
    /// # Errors
    ///
    /// Returns an error if entries are in flight or the store fails.
    pub fn clear_queue(&self) -> SyncResult<usize> {
        let removed = self.queue.clear()?;
        self.publish();
        Ok(removed)
    }

    /// Marks every legacy record as synced.
    ///
    /// # Errors
    ///
    /// Returns an error if the local store fails.
    pub fn mark_all_synced(&self) -> SyncResult<usize> {
        self.migration.mark_all_synced()
    }

    /// Returns true if a legacy record has been marked synced.
    ///
    /// # Errors
    ///
    /// Returns an error if the local store fails.
    pub fn is_record_synced(&self, table: &str, id: &str) -> SyncResult<bool> {
        self.migration.is_record_synced(table, id)
    }

    /// Starts connectivity polling and automatic sync.
    ///
    /// A pass runs on every offline-to-online transition and on each
    /// `sync_interval` tick. Must be called from within a tokio runtime.
    pub fn start_background(self: &Arc<Self>) -> BackgroundHandle {
        let poller = self.connectivity.spawn_polling(self.config.poll_interval);
        let mut events = self.connectivity.subscribe();
        let service = Arc::clone(self);

        let worker = tokio::spawn(async move {
            let mut ticker = service.config.sync_interval.map(|every| {
                let mut ticker = tokio::time::interval(every);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker
            });

            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(event) => {
                            service.stats.set_online(event.is_online());
                            if !event.is_online() {
                                continue;
                            }
                            debug!("back online; starting sync");
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(skipped, "connectivity events lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = tick(&mut ticker) => {}
                }

                if let Err(error) = service.executor.run_once().await {
                    warn!(%error, "background sync pass failed");
                }
            }
        });

        BackgroundHandle {
            tasks: vec![poller, worker],
        }
    }

    fn publish(&self) {
        self.stats.refresh_counts(|| self.queue.counts());
    }
}

impl std::fmt::Debug for SyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService")
            .field("stats", &self.stats.current())
            .finish_non_exhaustive()
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Background tasks started by [`SyncService::start_background`]. Stops
/// them when dropped.
#[derive(Debug)]
pub struct BackgroundHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl BackgroundHandle {
    /// Stops the background tasks.
    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Drop for BackgroundHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::ManualConnectivity;
    use crate::remote::MockRemote;
    use hangar_storage::InMemoryStore;
    use std::time::Duration;

    fn service(online: bool) -> (Arc<ManualConnectivity>, Arc<MockRemote>, Arc<SyncService>) {
        let probe = Arc::new(ManualConnectivity::new(online));
        let remote = Arc::new(MockRemote::new());
        let config = SyncConfig::new()
            .with_poll_interval(Duration::from_millis(10))
            .with_sync_interval(None);
        let service = SyncService::open(
            Arc::new(InMemoryStore::new()),
            remote.clone(),
            probe.clone(),
            config,
            MigrationConfig::default(),
        )
        .unwrap();
        (probe, remote, Arc::new(service))
    }

    #[tokio::test]
    async fn enqueue_publishes_stats() {
        let (_, _, service) = service(true);
        service
            .enqueue(EntityType::Task, "T-1", Operation::Update, Some(b"t".to_vec()))
            .unwrap();

        assert_eq!(service.stats().pending_items, 1);
        assert_eq!(service.status(), SyncStatus::Pending);

        assert!(service.force_sync_now().await.unwrap());
        assert_eq!(service.status(), SyncStatus::Synced);
    }

    #[tokio::test]
    async fn offline_status_wins() {
        let (_, _, service) = service(false);
        service
            .enqueue(EntityType::Task, "T-1", Operation::Update, Some(b"t".to_vec()))
            .unwrap();

        assert_eq!(service.status(), SyncStatus::Offline);
        assert!(!service.force_sync_now().await.unwrap());
    }

    #[tokio::test]
    async fn migration_drains_pending_entries_when_done() {
        let (_, remote, service) = service(true);
        service
            .enqueue(EntityType::Task, "T-1", Operation::Update, Some(b"t".to_vec()))
            .unwrap();

        assert!(service.migrate_all(|_| {}).await.success);

        assert_eq!(remote.record(&EntityType::Task, "T-1"), Some(b"t".to_vec()));
        assert_eq!(service.status(), SyncStatus::Synced);
    }

    #[tokio::test]
    async fn reconnect_triggers_background_sync() {
        let (probe, remote, service) = service(false);
        service
            .enqueue(EntityType::Aircraft, "EC-MKV", Operation::Create, Some(b"a".to_vec()))
            .unwrap();
        let background = service.start_background();

        probe.set_online(true);
        tokio::time::timeout(Duration::from_secs(5), async {
            while remote.record_count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        // Stats are republished at the end of the pass.
        tokio::time::timeout(Duration::from_secs(5), async {
            while service.status() != SyncStatus::Synced {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        background.shutdown();
    }
}
