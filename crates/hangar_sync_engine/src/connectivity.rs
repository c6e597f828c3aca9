//! Connectivity monitoring.
//!
//! The platform signal sits behind [`ConnectivityProbe`]. The monitor polls
//! it and emits a [`ConnectivityEvent`] only when online/offline flips.

use hangar_sync_protocol::{ConnectionStatus, NetworkQuality};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Source of the online/offline signal.
pub trait ConnectivityProbe: Send + Sync {
    /// Returns true if the client believes it is online.
    fn is_online(&self) -> bool;

    /// Returns best-effort quality metrics, if the platform reports any.
    fn quality(&self) -> Option<NetworkQuality> {
        None
    }
}

/// A probe whose state is set explicitly. Used by tests and the CLI.
#[derive(Debug, Default)]
pub struct ManualConnectivity {
    online: AtomicBool,
    quality: RwLock<Option<NetworkQuality>>,
}

impl ManualConnectivity {
    /// Creates a probe with the given initial state.
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
            quality: RwLock::new(None),
        }
    }

    /// Sets the online flag.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Sets the reported quality.
    pub fn set_quality(&self, quality: Option<NetworkQuality>) {
        *self.quality.write() = quality;
    }
}

impl ConnectivityProbe for ManualConnectivity {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn quality(&self) -> Option<NetworkQuality> {
        *self.quality.read()
    }
}

/// An online/offline transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    /// The client went from offline to online.
    Online,
    /// The client went from online to offline.
    Offline,
}

impl ConnectivityEvent {
    /// Returns true for [`ConnectivityEvent::Online`].
    pub fn is_online(&self) -> bool {
        matches!(self, ConnectivityEvent::Online)
    }
}

/// Tracks connectivity and broadcasts transitions.
///
/// The first observation is taken at construction and is not reported as
/// a transition.
pub struct ConnectivityMonitor {
    probe: Arc<dyn ConnectivityProbe>,
    last_online: Mutex<bool>,
    events: broadcast::Sender<ConnectivityEvent>,
}

impl ConnectivityMonitor {
    /// Creates a monitor over a probe.
    pub fn new(probe: Arc<dyn ConnectivityProbe>) -> Self {
        let online = probe.is_online();
        let (events, _) = broadcast::channel(16);
        Self {
            probe,
            last_online: Mutex::new(online),
            events,
        }
    }

    /// Returns the current status, queried from the probe.
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus::new(self.probe.is_online(), self.probe.quality())
    }

    /// Returns the last observed online flag.
    pub fn is_online(&self) -> bool {
        *self.last_online.lock()
    }

    /// Polls the probe once, emitting an event if the state flipped.
    pub fn refresh(&self) -> Option<ConnectivityEvent> {
        let online = self.probe.is_online();
        let event = {
            let mut last = self.last_online.lock();
            if *last == online {
                return None;
            }
            *last = online;
            if online {
                ConnectivityEvent::Online
            } else {
                ConnectivityEvent::Offline
            }
        };

        info!(online, "connectivity changed");
        // No receivers is not an error; the transition is still recorded.
        let _ = self.events.send(event);
        Some(event)
    }

    /// Subscribes to transition events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.events.subscribe()
    }

    /// Spawns a task that polls the probe at `interval`.
    ///
    /// Must be called from within a tokio runtime. The task stops when the
    /// returned handle is aborted.
    pub fn spawn_polling(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        debug!(interval_ms = interval.as_millis() as u64, "connectivity polling started");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                monitor.refresh();
            }
        })
    }
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("last_online", &*self.last_online.lock())
            .finish_non_exhaustive()
    }
}
