//! Action selection and the results of the non-migrate actions.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::MigrationResult;
use crate::core::traits::TargetWriter;
use crate::error::MigrateError;
use crate::validate::ValidationReport;

/// Entry point selected by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Migrate,
    Validate,
    Optimize,
    Clean,
    /// Migrate, then validate, then optimize.
    All,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Migrate => "migrate",
            Action::Validate => "validate",
            Action::Optimize => "optimize",
            Action::Clean => "clean",
            Action::All => "all",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "migrate" => Ok(Action::Migrate),
            "validate" => Ok(Action::Validate),
            "optimize" => Ok(Action::Optimize),
            "clean" => Ok(Action::Clean),
            "all" => Ok(Action::All),
            other => Err(MigrateError::Config(format!(
                "unknown action '{}', expected migrate, validate, optimize, clean or all",
                other
            ))),
        }
    }
}

/// Maintenance outcome for one target table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableOptimization {
    pub analyzed: bool,
    pub optimized: bool,
    pub row_count: Option<i64>,
    pub error: Option<String>,
}

/// Maintenance outcome for the whole target.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OptimizeReport {
    pub tables: BTreeMap<String, TableOptimization>,
}

impl OptimizeReport {
    pub fn all_ok(&self) -> bool {
        self.tables.values().all(|t| t.error.is_none())
    }
}

/// Everything an action produced.
#[derive(Debug, Clone, Serialize)]
pub struct ActionOutcome {
    pub action: Action,
    pub migration: Option<MigrationResult>,
    pub validation: Option<ValidationReport>,
    pub optimization: Option<OptimizeReport>,
    pub dropped_tables: Option<Vec<String>>,
}

impl ActionOutcome {
    pub(super) fn new(action: Action) -> Self {
        Self {
            action,
            migration: None,
            validation: None,
            optimization: None,
            dropped_tables: None,
        }
    }

    /// Whether the action achieved its goal: at least one table transferred,
    /// every validated table consistent, every maintenance step succeeded.
    pub fn succeeded(&self) -> bool {
        self.migration.as_ref().map_or(true, |m| m.success)
            && self.validation.as_ref().map_or(true, |v| v.overall_success)
            && self.optimization.as_ref().map_or(true, |o| o.all_ok())
    }
}

/// ANALYZE, OPTIMIZE and count one table. Errors are recorded, not raised.
pub(super) async fn optimize_table(target: &dyn TargetWriter, table: &str) -> TableOptimization {
    let mut result = TableOptimization::default();

    match target.analyze_table(table).await {
        Ok(()) => result.analyzed = true,
        Err(e) => {
            warn!(table = %table, "ANALYZE failed: {}", e);
            result.error = Some(e.to_string());
            return result;
        }
    }

    match target.optimize_table(table).await {
        Ok(()) => result.optimized = true,
        Err(e) => {
            warn!(table = %table, "OPTIMIZE failed: {}", e);
            result.error = Some(e.to_string());
            return result;
        }
    }

    match target.row_count(table).await {
        Ok(count) => {
            info!(table = %table, "Optimized, {} rows", count);
            result.row_count = Some(count);
        }
        Err(e) => result.error = Some(e.to_string()),
    }
    result
}
