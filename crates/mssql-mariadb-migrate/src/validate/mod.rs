//! Post-migration consistency checks.
//!
//! For every table the validator compares row counts, the size of a random
//! source sample against an unordered target sample, and MIN/MAX of every
//! numeric column. The sample check compares cardinalities only, not row
//! contents.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::core::traits::{SourceReader, TargetWriter};
use crate::error::Result;
use crate::introspect::Introspector;

/// Outcome for one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationResult {
    pub source_count: i64,
    pub target_count: i64,
    pub count_match: bool,
    pub sample_match: bool,
    pub extreme_values_match: bool,
    /// `count_match && sample_match && extreme_values_match`.
    pub consistent: bool,
    /// Numeric columns whose MIN or MAX differ.
    pub mismatched_columns: Vec<String>,
    /// Set when a query failed; the table is then reported inconsistent.
    pub error: Option<String>,
}

/// Results for a whole validation pass.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub timestamp: DateTime<Utc>,
    pub tables: BTreeMap<String, ValidationResult>,
    /// Every table is consistent.
    pub overall_success: bool,
}

impl ValidationReport {
    pub fn inconsistent_tables(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|(_, r)| !r.consistent)
            .map(|(t, _)| t.as_str())
            .collect()
    }
}

/// Compares source and target after a migration.
pub struct Validator {
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
    introspector: Introspector,
    schema: String,
    sample_size: usize,
}

impl Validator {
    pub fn new(
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
        schema: impl Into<String>,
        sample_size: usize,
    ) -> Self {
        Self {
            introspector: Introspector::new(source.clone()),
            source,
            target,
            schema: schema.into(),
            sample_size,
        }
    }

    /// Validate every table in `tables`. Never fails as a whole: query errors
    /// mark the affected table inconsistent.
    pub async fn validate(&self, tables: &[String]) -> ValidationReport {
        let mut report = ValidationReport {
            timestamp: Utc::now(),
            tables: BTreeMap::new(),
            overall_success: true,
        };

        for table in tables {
            let result = self.validate_table(table).await;
            if result.consistent {
                info!(
                    table = %table,
                    phase = "validate",
                    "Consistent ({} rows)",
                    result.target_count
                );
            } else {
                warn!(
                    table = %table,
                    phase = "validate",
                    "Inconsistent: source {} rows, target {} rows, sample {}, extremes {}",
                    result.source_count,
                    result.target_count,
                    result.sample_match,
                    result.extreme_values_match
                );
                report.overall_success = false;
            }
            report.tables.insert(table.clone(), result);
        }

        info!(
            phase = "validate",
            "Validation finished: {}/{} tables consistent",
            report.tables.values().filter(|r| r.consistent).count(),
            report.tables.len()
        );
        report
    }

    /// Validate one table.
    pub async fn validate_table(&self, table: &str) -> ValidationResult {
        let mut result = ValidationResult::default();
        if let Err(e) = self.run_checks(table, &mut result).await {
            warn!(table = %table, phase = "validate", "Validation query failed: {}", e);
            result.error = Some(e.to_string());
            result.consistent = false;
        }
        result
    }

    async fn run_checks(&self, table: &str, result: &mut ValidationResult) -> Result<()> {
        result.source_count = self.source.row_count(&self.schema, table).await?;
        result.target_count = self.target.row_count(table).await?;
        result.count_match = result.source_count == result.target_count;

        if !result.count_match {
            return Ok(());
        }

        if result.source_count == 0 {
            // Nothing to sample or compare.
            result.sample_match = true;
            result.extreme_values_match = true;
            result.consistent = true;
            return Ok(());
        }

        let source_sample = self
            .source
            .sample_row_count(&self.schema, table, self.sample_size)
            .await?;
        let target_sample = self.target.sample_row_count(table, self.sample_size).await?;
        result.sample_match = source_sample == target_sample;

        let columns = self.introspector.columns(&self.schema, table).await;
        for column in columns.iter().filter(|c| c.is_numeric()) {
            let source = self
                .source
                .column_extremes(&self.schema, table, &column.name)
                .await?;
            let target = self.target.column_extremes(table, &column.name).await?;
            if !source.matches(&target) {
                warn!(
                    table = %table,
                    phase = "validate",
                    "Column {} extremes differ: source [{}, {}], target [{}, {}]",
                    column.name,
                    source.min,
                    source.max,
                    target.min,
                    target.max
                );
                result.mismatched_columns.push(column.name.clone());
            }
        }
        result.extreme_values_match = result.mismatched_columns.is_empty();

        result.consistent = result.count_match && result.sample_match && result.extreme_values_match;
        Ok(())
    }
}
