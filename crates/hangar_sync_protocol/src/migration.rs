//! Migration progress and result types.

use serde::{Deserialize, Serialize};

/// Per-table status during a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationStatus {
    /// Records of the table are being pushed.
    Migrating,
    /// Every record of the table was pushed.
    Completed,
    /// The table finished with at least one failed record.
    Error,
}

/// Transient progress report for the table being migrated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationProgress {
    /// Source table name.
    pub table: String,
    /// Records processed so far in this table.
    pub current: usize,
    /// Records in this table.
    pub total: usize,
    /// Table status.
    pub status: MigrationStatus,
}

/// Number of records in one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCount {
    /// Table name.
    pub table: String,
    /// Record count.
    pub count: usize,
}

/// Record counts of the legacy dataset, in migration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalCounts {
    /// Per-table counts.
    pub tables: Vec<TableCount>,
    /// Sum of all table counts.
    pub total: usize,
}

impl LocalCounts {
    /// Builds counts from `(table, count)` pairs.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, usize)>) -> Self {
        let tables: Vec<TableCount> = pairs
            .into_iter()
            .map(|(table, count)| TableCount { table, count })
            .collect();
        let total = tables.iter().map(|t| t.count).sum();
        Self { tables, total }
    }

    /// Returns the count for one table (0 if unknown).
    pub fn get(&self, table: &str) -> usize {
        self.tables
            .iter()
            .find(|t| t.table == table)
            .map_or(0, |t| t.count)
    }

    /// Returns true if there is nothing to migrate.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// Per-table outcome of a migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationDetails {
    /// Records migrated successfully, per table.
    pub migrated: Vec<TableCount>,
    /// Failure descriptions, capped for display.
    pub errors: Vec<String>,
    /// Exact number of failures.
    pub error_count: usize,
}

impl MigrationDetails {
    /// Returns the number of records migrated from one table.
    pub fn migrated(&self, table: &str) -> usize {
        self.migrated
            .iter()
            .find(|t| t.table == table)
            .map_or(0, |t| t.count)
    }

    /// Returns the number of records migrated across all tables.
    pub fn total_migrated(&self) -> usize {
        self.migrated.iter().map(|t| t.count).sum()
    }
}

/// Terminal outcome of a migration run. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationResult {
    /// True if no record failed.
    pub success: bool,
    /// Human-readable summary.
    pub message: String,
    /// Counts and failures.
    pub details: MigrationDetails,
}
