//! Failure classification.

use crate::error::{ErrorKind, RemoteError};

/// Outcome of classifying a remote failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Failure kind.
    pub kind: ErrorKind,
    /// Whether the failure is retried automatically.
    pub retryable: bool,
}

impl Classification {
    fn of(kind: ErrorKind) -> Self {
        Self {
            kind,
            retryable: kind.is_retryable(),
        }
    }
}

/// Maps a raw remote failure onto the retry taxonomy.
///
/// Deterministic and side-effect free.
///
/// | Remote failure | Kind |
/// |---|---|
/// | `Network`, `Server` 502/503/504 | `Network` |
/// | `Timeout`, `Server` 408 | `Timeout` |
/// | `Unauthorized`, `Forbidden` | `Auth` |
/// | `Rejected`, `NotFound` | `Validation` |
/// | `Conflict` | `Conflict` |
/// | other `Server`, `Other` | `Unknown` |
pub fn classify(error: &RemoteError) -> Classification {
    let kind = match error {
        RemoteError::Network(_) => ErrorKind::Network,
        RemoteError::Timeout => ErrorKind::Timeout,
        RemoteError::Unauthorized(_) | RemoteError::Forbidden(_) => ErrorKind::Auth,
        RemoteError::Rejected(_) | RemoteError::NotFound(_) => ErrorKind::Validation,
        RemoteError::Conflict { .. } => ErrorKind::Conflict,
        RemoteError::Server { status, .. } => match status {
            408 => ErrorKind::Timeout,
            502..=504 => ErrorKind::Network,
            _ => ErrorKind::Unknown,
        },
        RemoteError::Other(_) => ErrorKind::Unknown,
    };
    Classification::of(kind)
}
