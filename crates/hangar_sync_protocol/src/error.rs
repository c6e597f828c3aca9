//! Error types and the failure taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for protocol (codec and parsing) operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding, decoding, or parsing protocol values.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Encoding to CBOR failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// Decoding from CBOR failed.
    #[error("decode error: {0}")]
    Decode(String),

    /// A textual value could not be parsed.
    #[error("invalid {what}: {value:?}")]
    Parse {
        /// What was being parsed.
        what: &'static str,
        /// The rejected input.
        value: String,
    },
}

/// A raw failure reported by the remote store.
///
/// Remote adapters translate their transport failures into these variants;
/// [`crate::classify`] then maps them onto an [`ErrorKind`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The remote could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The request did not complete in time.
    #[error("request timed out")]
    Timeout,

    /// Credentials are missing or expired.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Credentials are valid but lack permission.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The payload was rejected by remote validation.
    #[error("rejected by remote: {0}")]
    Rejected(String),

    /// The remote holds a newer, diverging version of the record.
    #[error("conflict: {message}")]
    Conflict {
        /// Remote explanation.
        message: String,
        /// The remote's current snapshot, if returned.
        remote: Option<Vec<u8>>,
    },

    /// The addressed record does not exist remotely.
    #[error("not found: {0}")]
    NotFound(String),

    /// The remote failed while handling the request.
    #[error("server error {status}: {message}")]
    Server {
        /// HTTP-like status code.
        status: u16,
        /// Remote explanation.
        message: String,
    },

    /// Any failure the adapter could not categorise.
    #[error("{0}")]
    Other(String),
}

impl RemoteError {
    /// Creates a conflict error without a remote snapshot.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            remote: None,
        }
    }
}

/// Failure taxonomy used for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connectivity failure; retried automatically.
    Network,
    /// Request deadline exceeded; retried automatically.
    Timeout,
    /// Authentication or authorization failure; needs re-authentication.
    Auth,
    /// Payload rejected by the remote; needs a human to fix the data.
    Validation,
    /// Diverging remote version; needs manual resolution.
    Conflict,
    /// Uncategorised failure; retried with a lower ceiling.
    Unknown,
}

impl ErrorKind {
    /// Returns true if failures of this kind are retried automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Network | ErrorKind::Timeout | ErrorKind::Unknown
        )
    }

    /// Returns the lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Auth => "auth",
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure recorded on a queue entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedError {
    /// Failure kind.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Remote snapshot for conflicts, kept for manual resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_snapshot: Option<Vec<u8>>,
}

impl ClassifiedError {
    /// Creates a classified error without a remote snapshot.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            remote_snapshot: None,
        }
    }

    /// Classifies a raw remote failure.
    pub fn from_remote(error: &RemoteError) -> Self {
        let classification = crate::classify(error);
        let remote_snapshot = match error {
            RemoteError::Conflict { remote, .. } => remote.clone(),
            _ => None,
        };
        Self {
            kind: classification.kind,
            message: error.to_string(),
            remote_snapshot,
        }
    }

    /// Returns true if the failure is retried automatically.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(ErrorKind::Network.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::Unknown.is_retryable());
        assert!(!ErrorKind::Auth.is_retryable());
        assert!(!ErrorKind::Validation.is_retryable());
        assert!(!ErrorKind::Conflict.is_retryable());
    }

    #[test]
    fn conflict_keeps_remote_snapshot() {
        let error = RemoteError::Conflict {
            message: "stale revision".into(),
            remote: Some(b"remote-version".to_vec()),
        };
        let classified = ClassifiedError::from_remote(&error);

        assert_eq!(classified.kind, ErrorKind::Conflict);
        assert_eq!(classified.remote_snapshot, Some(b"remote-version".to_vec()));
        assert!(classified.message.contains("stale revision"));
    }

    #[test]
    fn error_display() {
        let err = RemoteError::Server {
            status: 503,
            message: "maintenance".into(),
        };
        assert_eq!(err.to_string(), "server error 503: maintenance");

        let classified = ClassifiedError::new(ErrorKind::Validation, "tail number required");
        assert_eq!(classified.to_string(), "[validation] tail number required");
    }
}
