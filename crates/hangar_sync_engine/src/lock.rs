//! Mutual exclusion between sync passes and migration runs.

use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lock shared by [`crate::SyncExecutor`] and [`crate::MigrationEngine`].
///
/// The executor only ever tries the lock and skips its pass when it is
/// held; a migration waits for the running pass to finish.
#[derive(Debug, Clone, Default)]
pub struct RunLock {
    inner: Arc<Mutex<()>>,
}

/// Proof of holding the [`RunLock`]. Released on drop.
#[derive(Debug)]
pub struct RunGuard {
    _guard: OwnedMutexGuard<()>,
}

impl RunLock {
    /// Creates an unlocked lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock if it is free.
    pub fn try_acquire(&self) -> Option<RunGuard> {
        self.inner
            .clone()
            .try_lock_owned()
            .ok()
            .map(|guard| RunGuard { _guard: guard })
    }

    /// Waits for the lock.
    pub async fn acquire(&self) -> RunGuard {
        RunGuard {
            _guard: self.inner.clone().lock_owned().await,
        }
    }

    /// Returns true if someone holds the lock.
    pub fn is_held(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn try_acquire_fails_while_held() {
        let lock = RunLock::new();
        let guard = lock.acquire().await;

        assert!(lock.is_held());
        assert!(lock.try_acquire().is_none());

        drop(guard);
        assert!(!lock.is_held());
        assert!(lock.try_acquire().is_some());
    }

    #[tokio::test]
    async fn acquire_waits_for_release() {
        let lock = RunLock::new();
        let guard = lock.try_acquire().unwrap();

        let waiter = {
            let lock = lock.clone();
            tokio::spawn(async move {
                let _guard = lock.acquire().await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }
}
