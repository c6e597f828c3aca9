//! # Hangar Storage
//!
//! Local durable store collaborator for the Hangar sync engine.
//!
//! This crate provides the lowest-level persistence abstraction used by the
//! sync queue and by the legacy dataset the migration engine reads from.
//! Stores are **opaque byte stores** organised into named tables - they do
//! not interpret the records they hold.
//!
//! ## Design Principles
//!
//! - Stores are simple keyed tables (get, put, delete, list)
//! - No knowledge of queue entries, payload schemas, or sync state
//! - Must be `Send + Sync` for concurrent access
//! - Callers own all record encodings
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral clients
//! - [`FileStore`] - For persistent storage in a locked directory
//!
//! ## Example
//!
//! ```rust
//! use hangar_storage::{InMemoryStore, LocalStore};
//!
//! let store = InMemoryStore::new();
//! store.put("tasks", "T-100", b"inspect landing gear").unwrap();
//! let data = store.get("tasks", "T-100").unwrap();
//! assert_eq!(data.as_deref(), Some(&b"inspect landing gear"[..]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{BatchOp, LocalStore, WriteBatch};
pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
