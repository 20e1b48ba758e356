//! Row-by-row insertion used to diagnose a failed batch.

use serde::Serialize;
use tracing::{error, info};

use crate::core::traits::TargetSession;
use crate::core::value::Row;
use crate::error::{InsertErrorKind, MigrateError};

/// Row errors logged in full; later ones are only counted.
pub const MAX_LOGGED_ROW_ERRORS: usize = 5;

/// One row the target rejected.
#[derive(Debug, Clone, Serialize)]
pub struct RowError {
    /// Position of the row within the failed page (1-based).
    pub row_number: usize,

    /// Target server error code, when the server reported one.
    pub code: Option<u16>,

    /// Human-readable root cause.
    pub cause: String,

    /// Server message.
    pub message: String,

    /// Column name and value preview, long strings truncated.
    pub values: Vec<(String, String)>,
}

/// Outcome of a row-by-row diagnosis.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FallbackReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub error_count: usize,
    /// Stopped early because `error_count` exceeded the cap.
    pub halted: bool,
    /// The first few rejected rows.
    pub errors: Vec<RowError>,
}

impl FallbackReport {
    pub fn is_clean(&self) -> bool {
        self.error_count == 0
    }
}

/// Insert `rows` one at a time, recording the rows the target rejects.
///
/// Stops as soon as more than `max_errors` rows have failed; remaining rows
/// are not attempted. Commit or rollback is left to the caller.
pub async fn fallback_insert(
    session: &mut dyn TargetSession,
    table: &str,
    columns: &[String],
    rows: &[Row],
    max_errors: usize,
) -> FallbackReport {
    info!(table = %table, "Batch insert failed, retrying {} rows one by one", rows.len());

    let mut report = FallbackReport::default();

    for (idx, row) in rows.iter().enumerate() {
        report.attempted += 1;

        match session.insert_row(row).await {
            Ok(()) => {
                report.succeeded += 1;
                if report.succeeded % 100 == 0 {
                    info!(table = %table, "{} rows inserted individually", report.succeeded);
                }
            }
            Err(e) => {
                report.error_count += 1;

                if report.error_count <= MAX_LOGGED_ROW_ERRORS {
                    let (code, cause) = match &e {
                        MigrateError::Insert { code, .. } => (
                            Some(*code),
                            InsertErrorKind::from_code(*code).to_string(),
                        ),
                        other => (None, other.to_string()),
                    };
                    let values: Vec<(String, String)> = columns
                        .iter()
                        .zip(row.iter())
                        .map(|(c, v)| (c.clone(), v.preview()))
                        .collect();

                    error!(
                        table = %table,
                        row = idx + 1,
                        "Row {} rejected: {} ({})",
                        idx + 1,
                        cause,
                        e
                    );
                    error!(table = %table, row = idx + 1, "Row data: {:?}", values);

                    report.errors.push(RowError {
                        row_number: idx + 1,
                        code,
                        cause,
                        message: e.to_string(),
                        values,
                    });
                }

                if report.error_count > max_errors {
                    error!(
                        table = %table,
                        "Too many row errors ({}), stopping diagnosis",
                        report.error_count
                    );
                    report.halted = true;
                    break;
                }
            }
        }
    }

    info!(
        table = %table,
        "Row-by-row result: {} succeeded, {} failed",
        report.succeeded,
        report.error_count
    );
    report
}
