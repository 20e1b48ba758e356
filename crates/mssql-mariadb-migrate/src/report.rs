//! Structured per-run migration log.
//!
//! Only the orchestrator appends to a [`MigrationLog`]; entries are never
//! modified once written. Rendering to files is left to the caller.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{MigrateError, Result};
use crate::transfer::{FallbackReport, TransferFailure, TransferStats};

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryLevel {
    Info,
    Warn,
    Error,
}

/// One timestamped log entry.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: EntryLevel,
    pub phase: String,
    pub table: Option<String>,
    pub message: String,
}

/// Where a table ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    #[default]
    Pending,
    /// No schema could be introspected.
    Skipped,
    StructureFailed,
    StructureCreated,
    Transferred,
    TransferFailed,
}

/// Per-table counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableCounters {
    pub status: TableStatus,
    pub columns: usize,
    pub source_rows: i64,
    pub rows_transferred: i64,
    pub pages: u64,
    pub commits: u64,
    /// Rows left on the target by checkpoint commits after a failure.
    pub rows_committed_before_failure: i64,
    pub duration_secs: f64,
}

/// A failed batch, keyed by table and batch number.
#[derive(Debug, Clone, Serialize)]
pub struct BatchErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub table: String,
    pub batch_number: u64,
    pub error_code: Option<u16>,
    pub message: String,
    pub diagnosis: Option<FallbackReport>,
}

/// Log of one migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationLog {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub entries: Vec<LogEntry>,
    pub tables: BTreeMap<String, TableCounters>,
    pub batch_errors: Vec<BatchErrorRecord>,
}

impl MigrationLog {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            started_at: Utc::now(),
            finished_at: None,
            entries: Vec::new(),
            tables: BTreeMap::new(),
            batch_errors: Vec::new(),
        }
    }

    /// Append an entry.
    pub fn record(
        &mut self,
        level: EntryLevel,
        phase: &str,
        table: Option<&str>,
        message: impl Into<String>,
    ) {
        self.entries.push(LogEntry {
            timestamp: Utc::now(),
            level,
            phase: phase.to_string(),
            table: table.map(str::to_string),
            message: message.into(),
        });
    }

    /// Counters for a table, created on first use.
    pub fn table_mut(&mut self, table: &str) -> &mut TableCounters {
        self.tables.entry(table.to_string()).or_default()
    }

    pub fn record_transfer(&mut self, stats: &TransferStats) {
        let counters = self.table_mut(&stats.table);
        counters.status = TableStatus::Transferred;
        counters.source_rows = stats.total_rows;
        counters.rows_transferred = stats.rows;
        counters.pages = stats.pages;
        counters.commits = stats.commits;
        counters.duration_secs = stats.duration_secs;
    }

    pub fn record_batch_error(&mut self, failure: &TransferFailure) {
        let counters = self.table_mut(&failure.table);
        counters.status = TableStatus::TransferFailed;
        counters.rows_committed_before_failure = failure.committed_rows;

        self.batch_errors.push(BatchErrorRecord {
            timestamp: Utc::now(),
            table: failure.table.clone(),
            batch_number: failure.batch_number,
            error_code: match &failure.cause {
                MigrateError::Insert { code, .. } => Some(*code),
                _ => None,
            },
            message: failure.cause.to_string(),
            diagnosis: failure.diagnosis.clone(),
        });
    }

    /// Batch errors for one table.
    pub fn batch_errors_for<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a BatchErrorRecord> {
        self.batch_errors.iter().filter(move |e| e.table == table)
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_errors_are_keyed_by_table_and_batch() {
        let mut log = MigrationLog::new("run-1");
        log.record_batch_error(&TransferFailure {
            table: "Factory".into(),
            batch_number: 3,
            committed_rows: 200,
            cause: MigrateError::Insert {
                table: "Factory".into(),
                code: 1406,
                message: "Data too long".into(),
            },
            diagnosis: None,
        });

        let errors: Vec<_> = log.batch_errors_for("Factory").collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].batch_number, 3);
        assert_eq!(errors[0].error_code, Some(1406));
        assert_eq!(log.tables["Factory"].status, TableStatus::TransferFailed);
        assert_eq!(log.tables["Factory"].rows_committed_before_failure, 200);
        assert_eq!(log.batch_errors_for("Owner").count(), 0);
    }

    #[test]
    fn test_to_json() {
        let mut log = MigrationLog::new("run-2");
        log.record(EntryLevel::Info, "structure", Some("Owner"), "created");
        log.finish();
        let json = log.to_json().unwrap();
        assert!(json.contains("\"run_id\": \"run-2\""));
        assert!(json.contains("\"phase\": \"structure\""));
        assert!(json.contains("\"level\": \"info\""));
    }
}
