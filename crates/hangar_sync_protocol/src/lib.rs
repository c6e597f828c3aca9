//! # Hangar Sync Protocol
//!
//! Data model and error taxonomy shared by the Hangar sync engine.
//!
//! This crate provides:
//! - `SyncQueueEntry` for queued local mutations and its CBOR codec
//! - `SyncStats` / `SyncStatus` snapshots published to observers
//! - `ConnectionStatus` network observations
//! - `SyncLogEntry` audit records
//! - Migration progress and result types
//! - `RemoteError` and the pure [`classify`] function
//!
//! This is a pure crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod classify;
mod connection;
mod entity;
mod entry;
mod error;
mod log;
mod migration;
mod stats;

pub use classify::{classify, Classification};
pub use connection::{ConnectionStatus, ConnectionType, EffectiveType, NetworkQuality};
pub use entity::{EntityType, Operation};
pub use entry::{EntryId, EntryState, QueueCounts, SyncQueueEntry};
pub use error::{ClassifiedError, ErrorKind, ProtocolError, ProtocolResult, RemoteError};
pub use log::{LogType, SyncLogEntry};
pub use migration::{
    LocalCounts, MigrationDetails, MigrationProgress, MigrationResult, MigrationStatus, TableCount,
};
pub use stats::{SyncStats, SyncStatus};
