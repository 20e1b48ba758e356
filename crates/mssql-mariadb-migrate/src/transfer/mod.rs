//! Batched, table-scoped transactional transfer.
//!
//! A table is copied page by page (OFFSET/FETCH ordered by the primary key)
//! into a single target session with autocommit off. Any failed page rolls the
//! session back, so rows staged since the last commit never become visible.
//!
//! In [`CommitMode::Strict`] the only commit happens after the last page: the
//! table is all-or-nothing. In [`CommitMode::Checkpointed`] the session is also
//! committed every `checkpoint_every_pages` pages to bound transaction size; a
//! later failure then only undoes the uncommitted tail.

mod fallback;

pub use fallback::{fallback_insert, FallbackReport, RowError, MAX_LOGGED_ROW_ERRORS};

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{CommitMode, MigrationConfig};
use crate::core::schema::Table;
use crate::core::traits::{SourceReader, TargetSession, TargetWriter};
use crate::core::value::{Page, Row};
use crate::error::{MigrateError, Result};

/// Rows per multi-row INSERT statement.
pub const INSERT_CHUNK_ROWS: usize = 100;

/// Pages between progress log lines.
pub const PROGRESS_EVERY_PAGES: u64 = 50;

/// Transfer settings.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Rows per source page.
    pub batch_size: usize,
    pub commit_mode: CommitMode,
    /// Pages between intermediate commits in checkpointed mode.
    pub checkpoint_every_pages: usize,
    pub max_fallback_errors: usize,
    pub diagnose_failed_batches: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        TransferConfig::from(&MigrationConfig::default())
    }
}

impl From<&MigrationConfig> for TransferConfig {
    fn from(config: &MigrationConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            commit_mode: config.commit_mode,
            checkpoint_every_pages: config.checkpoint_every_pages,
            max_fallback_errors: config.max_fallback_errors,
            diagnose_failed_batches: config.diagnose_failed_batches,
        }
    }
}

/// Statistics from a completed table transfer.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransferStats {
    pub table: String,
    /// Source row count taken before the first page.
    pub total_rows: i64,
    /// Rows inserted and committed.
    pub rows: i64,
    pub pages: u64,
    /// Commits issued, including the final one.
    pub commits: u64,
    pub duration_secs: f64,
}

impl TransferStats {
    pub fn rows_per_second(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.rows as f64 / self.duration_secs
        } else {
            0.0
        }
    }
}

/// A table transfer that was aborted and rolled back.
#[derive(Error, Debug)]
#[error("transfer of {table} failed at batch {batch_number}: {cause}")]
pub struct TransferFailure {
    pub table: String,
    /// Page being processed when the failure occurred (0 before the first page).
    pub batch_number: u64,
    /// Rows made durable by checkpoint commits before the failure. Always 0
    /// in strict mode.
    pub committed_rows: i64,
    #[source]
    pub cause: MigrateError,
    /// Row-by-row diagnosis of the failed page, when enabled.
    pub diagnosis: Option<FallbackReport>,
}

/// Insert one page through an open session.
///
/// One row goes through a single-row insert, up to [`INSERT_CHUNK_ROWS`] rows
/// through one multi-row insert, and larger pages are split into chunks of
/// [`INSERT_CHUNK_ROWS`]. Returns the number of statements issued.
pub async fn insert_page(session: &mut dyn TargetSession, rows: &[Row]) -> Result<usize> {
    match rows.len() {
        0 => Ok(0),
        1 => {
            session.insert_row(&rows[0]).await?;
            Ok(1)
        }
        n if n <= INSERT_CHUNK_ROWS => {
            session.insert_rows(rows).await?;
            Ok(1)
        }
        _ => {
            let mut statements = 0;
            for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
                session.insert_rows(chunk).await?;
                statements += 1;
            }
            Ok(statements)
        }
    }
}

/// Copies tables from the source to the target.
pub struct TransferEngine {
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
    config: TransferConfig,
}

impl TransferEngine {
    pub fn new(
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
        config: TransferConfig,
    ) -> Self {
        Self {
            source,
            target,
            config,
        }
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Transfer every row of `table`, paging in `primary_key` order.
    ///
    /// The target table must already exist and be empty.
    pub async fn transfer(
        &self,
        table: &Table,
        primary_key: &[String],
    ) -> std::result::Result<TransferStats, TransferFailure> {
        let start = Instant::now();
        let mut stats = TransferStats {
            table: table.name.clone(),
            ..Default::default()
        };

        let total = self
            .source
            .row_count(&table.schema, &table.name)
            .await
            .map_err(|e| failure(table, 0, 0, e))?;
        stats.total_rows = total;
        info!(table = %table.name, phase = "transfer", "Source rows: {}", total);

        if total == 0 {
            info!(table = %table.name, phase = "transfer", "No rows, nothing to transfer");
            return Ok(stats);
        }

        if primary_key.is_empty() {
            warn!(
                table = %table.name,
                "No primary key: page order is unspecified and assumes a read-only source"
            );
        }

        let columns = table.column_names();
        let mut session = self
            .target
            .begin_session(&table.name, &columns)
            .await
            .map_err(|e| failure(table, 0, 0, e))?;

        let batch_size = self.config.batch_size.max(1);
        let checkpoint_every = self.config.checkpoint_every_pages.max(1) as u64;
        let mut offset: u64 = 0;
        let mut migrated: i64 = 0;
        let mut committed: i64 = 0;
        let mut batch_number: u64 = 0;

        while (offset as i64) < total {
            batch_number += 1;

            let page = match self
                .source
                .fetch_page(table, primary_key, offset, batch_size)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    return Err(self
                        .abort(session.as_mut(), table, batch_number, committed, e, None)
                        .await)
                }
            };

            if page.is_empty() {
                debug!(table = %table.name, batch = batch_number, "Empty page, source exhausted");
                break;
            }

            if let Err(e) = insert_page(session.as_mut(), &page.rows).await {
                return Err(self
                    .abort(session.as_mut(), table, batch_number, committed, e, Some(&page))
                    .await);
            }

            migrated += page.len() as i64;
            offset += batch_size as u64;
            stats.pages = batch_number;
            let at_end = offset as i64 >= total;

            if batch_number % PROGRESS_EVERY_PAGES == 0 || at_end {
                let elapsed = start.elapsed().as_secs_f64();
                let percent = (migrated as f64 / total as f64 * 100.0).min(100.0);
                let rate = if elapsed > 0.0 { migrated as f64 / elapsed } else { 0.0 };
                info!(
                    table = %table.name,
                    batch = batch_number,
                    "Processed {}/{} rows ({:.1}%) - {:.0} rows/sec",
                    migrated,
                    total,
                    percent,
                    rate
                );
            }

            if self.config.commit_mode == CommitMode::Checkpointed
                && batch_number % checkpoint_every == 0
                && !at_end
            {
                if let Err(e) = session.commit().await {
                    return Err(self
                        .abort(session.as_mut(), table, batch_number, committed, e, None)
                        .await);
                }
                committed = migrated;
                stats.commits += 1;
                debug!(
                    table = %table.name,
                    batch = batch_number,
                    "Checkpoint commit at {} rows",
                    committed
                );
            }
        }

        info!(
            table = %table.name,
            phase = "transfer",
            "All pages staged, committing {} rows",
            migrated
        );
        if let Err(e) = session.commit().await {
            return Err(self
                .abort(session.as_mut(), table, batch_number, committed, e, None)
                .await);
        }
        stats.commits += 1;
        stats.rows = migrated;
        stats.duration_secs = start.elapsed().as_secs_f64();

        info!(
            table = %table.name,
            phase = "transfer",
            "Transferred {} rows in {:.1}s ({:.0} rows/sec)",
            stats.rows,
            stats.duration_secs,
            stats.rows_per_second()
        );
        Ok(stats)
    }

    /// Roll back the session and build the failure, diagnosing the failed
    /// page first when one is given.
    async fn abort(
        &self,
        session: &mut dyn TargetSession,
        table: &Table,
        batch_number: u64,
        committed_rows: i64,
        cause: MigrateError,
        failed_page: Option<&Page>,
    ) -> TransferFailure {
        match cause.insert_kind() {
            Some(kind) => error!(
                table = %table.name,
                batch = batch_number,
                "Batch {} failed ({}): {}",
                batch_number,
                kind.cause(),
                cause
            ),
            None => error!(
                table = %table.name,
                batch = batch_number,
                "Batch {} failed: {}",
                batch_number,
                cause
            ),
        }

        if let Err(e) = session.rollback().await {
            error!(table = %table.name, batch = batch_number, "Rollback failed: {}", e);
        } else {
            warn!(
                table = %table.name,
                batch = batch_number,
                "Rolled back; {} rows remain from earlier commits",
                committed_rows
            );
        }

        // The main session is rolled back before diagnosing so the row-level
        // inserts do not wait on its locks.
        let diagnosis = match failed_page {
            Some(page) if self.config.diagnose_failed_batches => {
                self.diagnose(table, &page.rows).await
            }
            _ => None,
        };

        failure(table, batch_number, committed_rows, cause).with_diagnosis(diagnosis)
    }

    /// Replay rows one at a time in a throwaway transaction.
    ///
    /// The transaction is always rolled back: this only identifies the
    /// offending rows, it never persists anything.
    pub async fn diagnose(&self, table: &Table, rows: &[Row]) -> Option<FallbackReport> {
        let columns = table.column_names();
        let mut session = match self.target.begin_session(&table.name, &columns).await {
            Ok(s) => s,
            Err(e) => {
                warn!(table = %table.name, "Could not open diagnosis session: {}", e);
                return None;
            }
        };

        let report = fallback_insert(
            session.as_mut(),
            &table.name,
            &columns,
            rows,
            self.config.max_fallback_errors,
        )
        .await;

        if let Err(e) = session.rollback().await {
            warn!(table = %table.name, "Diagnosis rollback failed: {}", e);
        }
        Some(report)
    }
}

fn failure(table: &Table, batch_number: u64, committed_rows: i64, cause: MigrateError) -> TransferFailure {
    TransferFailure {
        table: table.name.clone(),
        batch_number,
        committed_rows,
        cause,
        diagnosis: None,
    }
}

impl TransferFailure {
    fn with_diagnosis(mut self, diagnosis: Option<FallbackReport>) -> Self {
        self.diagnosis = diagnosis;
        self
    }
}
