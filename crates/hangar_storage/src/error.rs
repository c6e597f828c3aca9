//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A table file could not be decoded.
    #[error("table '{table}' corrupted: {message}")]
    Corrupted {
        /// The affected table.
        table: String,
        /// Description of the corruption.
        message: String,
    },

    /// The table name contains characters that cannot be stored.
    #[error("invalid table name: {0:?}")]
    InvalidTable(String),

    /// The store is closed or otherwise unavailable.
    #[error("store is closed")]
    Closed,

    /// Another process holds the store directory.
    #[error("store locked: another process has exclusive access")]
    Locked,
}

impl StorageError {
    pub(crate) fn corrupted(table: &str, message: impl Into<String>) -> Self {
        Self::Corrupted {
            table: table.to_string(),
            message: message.into(),
        }
    }
}
