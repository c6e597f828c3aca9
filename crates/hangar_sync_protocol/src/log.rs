//! Sync audit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome class of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    /// An operation completed.
    Success,
    /// An operation failed.
    Error,
    /// Informational record.
    Info,
}

/// An append-only audit record written by the executor and the migration engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    /// When the record was written.
    pub timestamp: DateTime<Utc>,
    /// Operation name (`create`, `update`, `delete`, `migrate`, `sync`).
    pub operation: String,
    /// Affected entity or table.
    pub entity: String,
    /// Outcome class.
    #[serde(rename = "type")]
    pub kind: LogType,
    /// Human-readable detail.
    pub message: String,
}

impl SyncLogEntry {
    /// Creates a record stamped with the current time.
    pub fn new(
        kind: LogType,
        operation: impl Into<String>,
        entity: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            operation: operation.into(),
            entity: entity.into(),
            kind,
            message: message.into(),
        }
    }

    /// Creates a success record.
    pub fn success(
        operation: impl Into<String>,
        entity: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(LogType::Success, operation, entity, message)
    }

    /// Creates an error record.
    pub fn error(
        operation: impl Into<String>,
        entity: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(LogType::Error, operation, entity, message)
    }

    /// Creates an informational record.
    pub fn info(
        operation: impl Into<String>,
        entity: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(LogType::Info, operation, entity, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_field_is_renamed() {
        let entry = SyncLogEntry::error("update", "aircraft/EC-MKV", "rejected");
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["type"], "error");
        assert_eq!(json["entity"], "aircraft/EC-MKV");
    }
}
