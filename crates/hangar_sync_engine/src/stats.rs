//! Stats aggregation and fan-out.

use hangar_sync_protocol::{QueueCounts, SyncStats};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Callback invoked with every new stats snapshot.
pub type StatsCallback = Arc<dyn Fn(&SyncStats) + Send + Sync>;

struct Shared {
    current: Mutex<SyncStats>,
    subscribers: RwLock<Vec<(u64, StatsCallback)>>,
    next_id: AtomicU64,
    /// Serializes delivery; the flag marks a delivery loop on this thread.
    delivery: ReentrantMutex<RefCell<bool>>,
    outbox: Mutex<VecDeque<SyncStats>>,
}

/// Holds the current [`SyncStats`] and notifies subscribers when it changes.
///
/// Snapshots reach every subscriber in the order they were produced, each
/// exactly once. A callback may publish again; the nested snapshot is
/// delivered after the current one has reached every subscriber.
#[derive(Clone)]
pub struct StatsPublisher {
    shared: Arc<Shared>,
}

impl StatsPublisher {
    /// Creates a publisher with an empty, offline snapshot.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                current: Mutex::new(SyncStats::default()),
                subscribers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
                delivery: ReentrantMutex::new(RefCell::new(false)),
                outbox: Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// Returns the current snapshot.
    pub fn current(&self) -> SyncStats {
        *self.shared.current.lock()
    }

    /// Registers a callback and immediately delivers the current snapshot to it.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SyncStats) + Send + Sync + 'static,
    {
        let callback: StatsCallback = Arc::new(callback);
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);

        let _guard = self.shared.delivery.lock();
        self.shared.subscribers.write().push((id, callback.clone()));
        callback(&self.current());

        Subscription {
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Returns the number of registered callbacks.
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.read().len()
    }

    /// Replaces the queue-derived counters. Returns true if subscribers
    /// were notified.
    pub fn publish_counts(&self, counts: QueueCounts) -> bool {
        self.update(|stats| {
            let next = SyncStats::from_counts(counts, stats.is_online, stats.sync_in_progress);
            *stats = next;
        })
    }

    /// Reads the queue counters with `read` and publishes them.
    ///
    /// The read happens under the delivery lock, so concurrent refreshes
    /// publish in the order they observed the queue.
    pub fn refresh_counts<F>(&self, read: F) -> bool
    where
        F: FnOnce() -> QueueCounts,
    {
        let _guard = self.shared.delivery.lock();
        let counts = read();
        self.publish_counts(counts)
    }

    /// Sets the online flag.
    pub fn set_online(&self, online: bool) -> bool {
        self.update(|stats| stats.is_online = online)
    }

    /// Sets the sync-in-progress flag.
    pub fn set_in_progress(&self, in_progress: bool) -> bool {
        self.update(|stats| stats.sync_in_progress = in_progress)
    }

    /// Applies `change` to the current snapshot and notifies subscribers
    /// if the snapshot differs afterwards.
    pub fn update<F>(&self, change: F) -> bool
    where
        F: FnOnce(&mut SyncStats),
    {
        let guard = self.shared.delivery.lock();

        {
            let mut current = self.shared.current.lock();
            let mut next = *current;
            change(&mut next);
            if next == *current {
                return false;
            }
            *current = next;
            self.shared.outbox.lock().push_back(next);
        }

        if *guard.borrow() {
            // An outer frame on this thread is delivering; it drains the outbox.
            return true;
        }

        *guard.borrow_mut() = true;
        loop {
            let Some(snapshot) = self.shared.outbox.lock().pop_front() else {
                break;
            };
            let subscribers: Vec<StatsCallback> = self
                .shared
                .subscribers
                .read()
                .iter()
                .map(|(_, cb)| cb.clone())
                .collect();
            for callback in subscribers {
                callback(&snapshot);
            }
        }
        *guard.borrow_mut() = false;
        true
    }
}

impl Default for StatsPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StatsPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsPublisher")
            .field("current", &self.current())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Handle returned by [`StatsPublisher::subscribe`].
///
/// Dropping the handle keeps the callback registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    shared: Weak<Shared>,
}

impl Subscription {
    /// Removes the callback. Snapshots already being delivered may still
    /// reach it.
    pub fn unsubscribe(self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.subscribers.write().retain(|(id, _)| *id != self.id);
        }
    }
}
