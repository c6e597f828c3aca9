//! # Hangar Sync Engine
//!
//! Offline-first sync and one-time migration for Hangar clients.
//!
//! This crate provides:
//! - A durable mutation queue with per-record ordering and collapsing
//! - A single-flight executor that drains the queue while online
//! - Retry with exponential backoff driven by the failure taxonomy
//! - Connectivity monitoring behind a probe trait
//! - Stats fan-out to subscribers and a bounded audit log
//! - A one-shot migration of legacy local tables into the remote store
//!
//! ## Architecture
//!
//! ```text
//! enqueue ──▶ SyncQueue ──next_batch──▶ SyncExecutor ──▶ RemoteStore
//!                 ▲                         │   ▲
//!                 └──mark_synced/failed─────┘   └── ConnectivityMonitor
//!                                           │
//!                                           ▼
//!                                    StatsPublisher ──▶ subscribers
//!
//! MigrationEngine ──legacy tables──▶ RemoteStore   (holds the RunLock)
//! ```
//!
//! ## Key Invariants
//!
//! - At most one entry per record is in flight
//! - Entries of one record are applied in creation order
//! - `synced + pending + error == total` in every published snapshot
//! - A sync pass and a migration never run at the same time
//! - In-flight entries return to pending when the queue is reopened

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connectivity;
mod error;
mod executor;
mod http;
mod lock;
mod log;
mod migration;
mod queue;
mod remote;
mod service;
mod stats;

pub use config::{MigrationConfig, MigrationTable, RetryConfig, SyncConfig};
pub use connectivity::{
    ConnectivityEvent, ConnectivityMonitor, ConnectivityProbe, ManualConnectivity,
};
pub use error::{SyncError, SyncResult};
pub use executor::{PassReport, SyncExecutor};
pub use http::{
    status_error, HttpClient, HttpRemote, HttpRequest, HttpResponse, Method, TransportError,
};
pub use lock::{RunGuard, RunLock};
pub use log::SyncLog;
pub use migration::{MigrationEngine, SYNC_MARKS_TABLE};
pub use queue::{RetryScope, SyncQueue, QUEUE_TABLE};
pub use remote::{MockRemote, RemoteCall, RemoteStore, StoreRemote};
pub use service::{BackgroundHandle, SyncService};
pub use stats::{StatsCallback, StatsPublisher, Subscription};
