//! Queue draining.
//!
//! A pass claims batches from the [`SyncQueue`], pushes each entry to the
//! [`RemoteStore`] with bounded concurrency, and records the outcome on the
//! entry. Only one pass runs at a time; a request that arrives while a
//! pass is running makes that pass drain once more instead of starting a
//! second one.

use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::error::SyncResult;
use crate::lock::RunLock;
use crate::log::SyncLog;
use crate::queue::{RetryScope, SyncQueue};
use crate::remote::RemoteStore;
use crate::stats::StatsPublisher;
use futures::stream::{self, StreamExt};
use hangar_sync_protocol::{
    ClassifiedError, EntryState, Operation, RemoteError, SyncLogEntry, SyncQueueEntry,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Summary of one sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Entries applied remotely.
    pub synced: usize,
    /// Entries scheduled for another attempt.
    pub retried: usize,
    /// Entries moved to `Failed`.
    pub failed: usize,
    /// Claimed entries returned unsent because of cancellation.
    pub released: usize,
    /// Drain rounds performed (more than one when requests were coalesced).
    pub rounds: usize,
    /// Whether the pass stopped because of [`SyncExecutor::cancel`].
    pub cancelled: bool,
}

/// Single-flight drain of the sync queue.
pub struct SyncExecutor {
    config: SyncConfig,
    queue: Arc<SyncQueue>,
    remote: Arc<dyn RemoteStore>,
    connectivity: Arc<ConnectivityMonitor>,
    stats: StatsPublisher,
    log: Arc<SyncLog>,
    lock: RunLock,
    running: AtomicBool,
    rerun: AtomicBool,
    cancelled: AtomicBool,
}

/// Clears the running flag and the published in-progress flag on every
/// exit path of a pass. Entries still `InFlight` at that point belong to no
/// pass and go back to `Pending`.
struct PassGuard<'a> {
    running: &'a AtomicBool,
    stats: &'a StatsPublisher,
    queue: &'a SyncQueue,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        if self.queue.release_in_flight() > 0 {
            self.stats.refresh_counts(|| self.queue.counts());
        }
        self.stats.set_in_progress(false);
        self.running.store(false, Ordering::SeqCst);
    }
}

enum Outcome {
    Synced,
    Retried,
    Failed,
    Released,
}

impl SyncExecutor {
    /// Creates an executor.
    pub fn new(
        config: SyncConfig,
        queue: Arc<SyncQueue>,
        remote: Arc<dyn RemoteStore>,
        connectivity: Arc<ConnectivityMonitor>,
        stats: StatsPublisher,
        log: Arc<SyncLog>,
        lock: RunLock,
    ) -> Self {
        Self {
            config,
            queue,
            remote,
            connectivity,
            stats,
            log,
            lock,
            running: AtomicBool::new(false),
            rerun: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Returns true while a pass is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stops the running pass at the next entry boundary. Entries already
    /// sent complete normally; claimed but unsent entries return to `Pending`.
    pub fn cancel(&self) {
        if self.is_running() {
            info!("sync pass cancellation requested");
            self.cancelled.store(true, Ordering::SeqCst);
        }
    }

    /// Drains the queue once. Returns false without doing anything when
    /// offline, when a pass is already running, or when a migration holds
    /// the run lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue's storage fails. Entries claimed by
    /// the failed pass go back to `Pending`.
    pub async fn run_once(&self) -> SyncResult<bool> {
        Ok(self.run_pass().await?.is_some())
    }

    /// Like [`Self::run_once`], returning a report when a pass ran.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue's storage fails.
    pub async fn run_pass(&self) -> SyncResult<Option<PassReport>> {
        let online = self.connectivity.status().is_online;
        self.stats.set_online(online);
        if !online {
            debug!("sync skipped: offline");
            return Ok(None);
        }

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("sync already running; coalescing request");
            self.rerun.store(true, Ordering::SeqCst);
            return Ok(None);
        }
        let _pass = PassGuard {
            running: &self.running,
            stats: &self.stats,
            queue: &self.queue,
        };

        let Some(_lock) = self.lock.try_acquire() else {
            debug!("sync skipped: run lock held");
            return Ok(None);
        };

        self.cancelled.store(false, Ordering::SeqCst);
        self.stats.set_in_progress(true);
        self.publish();

        let started = Instant::now();
        let mut report = PassReport::default();

        'rounds: loop {
            self.rerun.store(false, Ordering::SeqCst);
            report.rounds += 1;

            loop {
                if self.cancelled.load(Ordering::SeqCst) {
                    report.cancelled = true;
                    break 'rounds;
                }
                if !self.connectivity.status().is_online {
                    debug!("went offline during sync pass");
                    self.stats.set_online(false);
                    break 'rounds;
                }

                let batch = self.queue.next_batch(self.config.batch_size)?;
                if batch.is_empty() {
                    break;
                }
                self.dispatch(batch, &mut report).await?;
                self.publish();
            }

            if !self.rerun.swap(false, Ordering::SeqCst) {
                break;
            }
        }

        self.publish();
        info!(
            synced = report.synced,
            retried = report.retried,
            failed = report.failed,
            rounds = report.rounds,
            cancelled = report.cancelled,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "sync pass finished"
        );
        if report.synced + report.failed + report.retried > 0 {
            self.log.append(SyncLogEntry::info(
                "sync",
                "queue",
                format!(
                    "pass finished: {} synced, {} retrying, {} failed",
                    report.synced, report.retried, report.failed
                ),
            ));
        }
        Ok(Some(report))
    }

    /// Requeues failed entries whose last failure is retryable, then runs
    /// a pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue's storage fails.
    pub async fn retry_failed_operations(&self) -> SyncResult<bool> {
        let requeued = self.queue.retry_failed(RetryScope::Retryable)?;
        if requeued > 0 {
            self.publish();
        }
        self.run_once().await
    }

    /// Pushes a claimed batch and settles every result.
    ///
    /// A queue write failure stops further pushes, but results already in
    /// progress are still awaited and settled where the store allows; the
    /// first failure is returned once the batch has drained.
    async fn dispatch(&self, batch: Vec<SyncQueueEntry>, report: &mut PassReport) -> SyncResult<()> {
        let halted = AtomicBool::new(false);
        let halted = &halted;
        let mut pushes = stream::iter(batch.into_iter().map(|entry| async move {
            if self.cancelled.load(Ordering::SeqCst) || halted.load(Ordering::SeqCst) {
                return (entry, None);
            }
            let result = self.push(&entry).await;
            (entry, Some(result))
        }))
        .buffer_unordered(self.config.push_concurrency);

        let mut failure = None;
        while let Some((entry, result)) = pushes.next().await {
            match self.settle(&entry, result) {
                Ok(Outcome::Synced) => report.synced += 1,
                Ok(Outcome::Retried) => report.retried += 1,
                Ok(Outcome::Failed) => report.failed += 1,
                Ok(Outcome::Released) => report.released += 1,
                Err(error) => {
                    warn!(entry_id = %entry.id, %error, "could not record sync outcome");
                    halted.store(true, Ordering::SeqCst);
                    failure.get_or_insert(error);
                }
            }
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn push(&self, entry: &SyncQueueEntry) -> Result<(), RemoteError> {
        let call = async {
            match entry.operation {
                Operation::Create | Operation::Update => {
                    let Some(payload) = entry.payload.as_deref() else {
                        return Err(RemoteError::Rejected(format!(
                            "{} of {} has no payload",
                            entry.operation,
                            entry.entity_label()
                        )));
                    };
                    self.remote
                        .upsert(&entry.entity_type, &entry.entity_id, payload)
                        .await
                }
                Operation::Delete => {
                    match self.remote.delete(&entry.entity_type, &entry.entity_id).await {
                        // Already absent remotely: the delete has its effect.
                        Err(RemoteError::NotFound(_)) => Ok(()),
                        other => other,
                    }
                }
            }
        };

        match tokio::time::timeout(self.config.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout),
        }
    }

    fn settle(
        &self,
        entry: &SyncQueueEntry,
        result: Option<Result<(), RemoteError>>,
    ) -> SyncResult<Outcome> {
        let operation = entry.operation.as_str();
        let label = entry.entity_label();

        match result {
            None => {
                self.queue.release(entry.id)?;
                Ok(Outcome::Released)
            }
            Some(Ok(())) => {
                self.queue.mark_synced(entry.id)?;
                self.log
                    .append(SyncLogEntry::success(operation, label, "synced"));
                Ok(Outcome::Synced)
            }
            Some(Err(error)) => {
                let classified = ClassifiedError::from_remote(&error);
                let kind = classified.kind;
                let state = self.queue.mark_failed(entry.id, classified)?;
                let attempts = entry.attempts + 1;
                if state == EntryState::Pending {
                    self.log.append(SyncLogEntry::error(
                        operation,
                        label,
                        format!("{error} ({kind}, attempt {attempts}, will retry)"),
                    ));
                    Ok(Outcome::Retried)
                } else {
                    self.log.append(SyncLogEntry::error(
                        operation,
                        label,
                        format!("{error} ({kind}, attempt {attempts}, needs attention)"),
                    ));
                    Ok(Outcome::Failed)
                }
            }
        }
    }

    fn publish(&self) {
        self.stats.refresh_counts(|| self.queue.counts());
    }
}

impl std::fmt::Debug for SyncExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncExecutor")
            .field("running", &self.is_running())
            .field("batch_size", &self.config.batch_size)
            .field("push_concurrency", &self.config.push_concurrency)
            .finish_non_exhaustive()
    }
}
