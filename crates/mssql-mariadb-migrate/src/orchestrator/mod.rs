//! Migration orchestrator - sequences the phases of a run.
//!
//! A migration runs three phases strictly in order: structure (introspect,
//! map, recreate every table), transfer (copy every structured table) and
//! report. A table that fails never stops the run; the outcome of each table
//! ends up in the [`MigrationResult`].

mod actions;

pub use actions::{Action, ActionOutcome, OptimizeReport, TableOptimization};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::core::schema::Table;
use crate::core::traits::{SourceReader, TargetWriter};
use crate::error::{MigrateError, Result};
use crate::introspect::Introspector;
use crate::plan::{dependency_order, MigrationPlan};
use crate::report::{EntryLevel, MigrationLog, TableStatus};
use crate::source::MssqlReader;
use crate::structure::StructureSynchronizer;
use crate::target::MysqlWriter;
use crate::transfer::{TransferConfig, TransferEngine};
use crate::validate::{ValidationReport, Validator};

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// "completed", "partial" or "failed".
    pub status: String,

    /// At least one table was transferred.
    pub success: bool,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Tables in the plan.
    pub tables_total: usize,

    /// Tables skipped because no schema was available, plus priority tables
    /// missing from the source.
    pub skipped_tables: Vec<String>,

    /// Tables created on the target.
    pub structure_success: usize,

    /// Tables whose creation failed.
    pub structure_failed: Vec<String>,

    /// Tables transferred completely.
    pub tables_success: usize,

    /// Tables whose transfer failed.
    pub failed_tables: Vec<String>,

    /// Plan tables present on the target after the run.
    pub target_tables_present: usize,

    /// Total rows transferred.
    pub rows_transferred: i64,

    /// Average throughput (rows/second).
    pub rows_per_second: i64,

    /// Structured log of the run.
    pub log: MigrationLog,
}

impl MigrationResult {
    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Orchestrator {
    /// Connect to both databases and create an orchestrator.
    pub async fn new(config: Config) -> Result<Self> {
        let source = MssqlReader::new(config.source.clone()).await?;
        let target = MysqlWriter::new(&config.target).await?;
        Ok(Self::with_drivers(config, Arc::new(source), Arc::new(target)))
    }

    /// Create an orchestrator over existing drivers.
    pub fn with_drivers(
        config: Config,
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
    ) -> Self {
        Self {
            config,
            source,
            target,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn schema(&self) -> &str {
        &self.config.source.schema
    }

    fn introspector(&self) -> Introspector {
        Introspector::new(self.source.clone())
    }

    /// Build the table order for this run.
    ///
    /// Uses the configured priority list when present, otherwise a
    /// topological order over the discovered foreign keys.
    pub async fn plan(&self) -> Result<MigrationPlan> {
        let discovered = self.source.list_tables(self.schema()).await?;
        info!("Discovered {} tables in {}", discovered.len(), self.schema());

        if !self.config.migration.table_order.is_empty() {
            return Ok(MigrationPlan::build(
                &self.config.migration.table_order,
                &discovered,
            ));
        }

        let introspector = self.introspector();
        let mut stubs = Vec::with_capacity(discovered.len());
        for name in &discovered {
            stubs.push(Table {
                schema: self.schema().to_string(),
                name: name.clone(),
                columns: Vec::new(),
                primary_key: Vec::new(),
                foreign_keys: introspector.foreign_keys(self.schema(), name).await,
            });
        }
        Ok(MigrationPlan::build(&dependency_order(&stubs), &discovered))
    }

    /// Run a full migration: structure, transfer and report phases.
    pub async fn migrate(&self) -> Result<MigrationResult> {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("migration", run_id = %run_id);
        self.migrate_run(run_id).instrument(span).await
    }

    async fn migrate_run(&self, run_id: String) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut log = MigrationLog::new(run_id.clone());

        info!("Starting migration run: {}", run_id);
        let plan = self.plan().await?;
        let mut skipped_tables = plan.skipped.clone();
        for name in &plan.skipped {
            log.record(
                EntryLevel::Warn,
                "plan",
                Some(name),
                "priority table not found in source",
            );
        }

        // Structure phase
        let introspector = self.introspector();
        let synchronizer = StructureSynchronizer::new(self.target.clone());
        let mut structured: Vec<Table> = Vec::new();
        let mut structure_failed = Vec::new();

        async {
            for name in &plan.tables {
                let Some(table) = introspector.describe(self.schema(), name).await else {
                    log.table_mut(name).status = TableStatus::Skipped;
                    log.record(EntryLevel::Warn, "structure", Some(name), "no schema available");
                    skipped_tables.push(name.clone());
                    continue;
                };

                match synchronizer.synchronize(&table).await {
                    Ok(definition) => {
                        let counters = log.table_mut(name);
                        counters.status = TableStatus::StructureCreated;
                        counters.columns = definition.columns.len();
                        log.record(
                            EntryLevel::Info,
                            "structure",
                            Some(name),
                            format!("created with {} columns", definition.columns.len()),
                        );
                        structured.push(table);
                    }
                    Err(e) => {
                        error!(table = %name, "Structure sync failed: {}", e);
                        log.table_mut(name).status = TableStatus::StructureFailed;
                        log.record(EntryLevel::Error, "structure", Some(name), e.to_string());
                        structure_failed.push(name.clone());
                    }
                }
            }
        }
        .instrument(info_span!("phase", phase = "structure"))
        .await;

        info!(
            "Structure phase: {} created, {} failed, {} skipped",
            structured.len(),
            structure_failed.len(),
            skipped_tables.len()
        );

        // Transfer phase
        let engine = TransferEngine::new(
            self.source.clone(),
            self.target.clone(),
            TransferConfig::from(&self.config.migration),
        );
        let mut failed_tables = Vec::new();
        let mut rows_transferred = 0i64;
        let mut tables_success = 0usize;

        async {
            for table in &structured {
                let mut table = table.clone();
                table.primary_key = introspector.primary_key(&table.schema, &table.name).await;
                table.retain_known_key_columns();

                match engine.transfer(&table, &table.primary_key).await {
                    Ok(stats) => {
                        tables_success += 1;
                        rows_transferred += stats.rows;
                        log.record_transfer(&stats);
                        log.record(
                            EntryLevel::Info,
                            "transfer",
                            Some(&table.name),
                            format!("{} rows in {} pages", stats.rows, stats.pages),
                        );
                    }
                    Err(failure) => {
                        log.record_batch_error(&failure);
                        log.record(
                            EntryLevel::Error,
                            "transfer",
                            Some(&table.name),
                            failure.to_string(),
                        );
                        failed_tables.push(table.name.clone());
                    }
                }
            }
        }
        .instrument(info_span!("phase", phase = "transfer"))
        .await;

        // Report phase
        let target_tables_present = async {
            let present = match self.target.list_tables().await {
                Ok(tables) => {
                    let existing: HashSet<String> =
                        tables.iter().map(|t| t.to_lowercase()).collect();
                    plan.tables
                        .iter()
                        .filter(|t| existing.contains(&t.to_lowercase()))
                        .count()
                }
                Err(e) => {
                    warn!("Could not list target tables: {}", e);
                    0
                }
            };

            info!(
                "Migration summary: {} tables planned, {} structured, {} transferred, {} present on target",
                plan.len(),
                structured.len(),
                tables_success,
                present
            );
            if !failed_tables.is_empty() {
                warn!("Failed tables: {}", failed_tables.join(", "));
            }
            present
        }
        .instrument(info_span!("phase", phase = "report"))
        .await;

        log.finish();
        let duration = start.elapsed().as_secs_f64();
        let success = tables_success > 0;
        let status = if !success {
            "failed"
        } else if failed_tables.is_empty() && structure_failed.is_empty() {
            "completed"
        } else {
            "partial"
        };

        Ok(MigrationResult {
            run_id,
            status: status.to_string(),
            success,
            started_at,
            completed_at: Utc::now(),
            duration_seconds: duration,
            tables_total: plan.len(),
            skipped_tables,
            structure_success: structured.len(),
            structure_failed,
            tables_success,
            failed_tables,
            target_tables_present,
            rows_transferred,
            rows_per_second: if duration > 0.0 {
                (rows_transferred as f64 / duration) as i64
            } else {
                0
            },
            log,
        })
    }

    /// Validate the plan tables, migrating first if any are missing on the target.
    ///
    /// Fails when that migration transfers no table at all.
    pub async fn validate(&self) -> Result<ValidationReport> {
        let plan = self.plan().await?;
        let existing: HashSet<String> = self
            .target
            .list_tables()
            .await?
            .iter()
            .map(|t| t.to_lowercase())
            .collect();
        let missing: Vec<&String> = plan
            .tables
            .iter()
            .filter(|t| !existing.contains(&t.to_lowercase()))
            .collect();

        if !missing.is_empty() {
            info!(
                "{} tables missing on target ({:?}), migrating before validation",
                missing.len(),
                missing
            );
            let migration = self.migrate().await?;
            if !migration.success {
                return Err(MigrateError::Validation(format!(
                    "migration before validation transferred no tables (run {})",
                    migration.run_id
                )));
            }
        }

        Ok(self.validate_tables(&plan.tables).await)
    }

    /// Validate the given tables without migrating.
    pub async fn validate_tables(&self, tables: &[String]) -> ValidationReport {
        let validator = Validator::new(
            self.source.clone(),
            self.target.clone(),
            self.schema(),
            self.config.migration.sample_size,
        );
        validator
            .validate(tables)
            .instrument(info_span!("phase", phase = "validate"))
            .await
    }

    /// Analyze and optimize every target table, migrating first if the target
    /// is empty.
    pub async fn optimize(&self) -> Result<OptimizeReport> {
        let mut tables = self.target.list_tables().await?;
        if tables.is_empty() {
            info!("Target has no tables, migrating before optimization");
            self.migrate().await?;
            tables = self.target.list_tables().await?;
        }
        Ok(self.optimize_tables(&tables).await)
    }

    async fn optimize_tables(&self, tables: &[String]) -> OptimizeReport {
        let mut report = OptimizeReport::default();
        for table in tables {
            let entry = actions::optimize_table(self.target.as_ref(), table)
                .instrument(info_span!("phase", phase = "optimize"))
                .await;
            report.tables.insert(table.clone(), entry);
        }
        report
    }

    /// Drop the configured set of known tables on the target, children first,
    /// with foreign-key checks disabled around the drops. Idempotent.
    pub async fn drop_known_tables(&self) -> Result<Vec<String>> {
        let tables = self.config.migration.effective_clean_tables();
        if tables.is_empty() {
            warn!("No tables configured for cleaning (migration.clean_tables / table_order)");
            return Ok(Vec::new());
        }
        let dropped = self.target.drop_tables_unchecked(&tables).await?;
        info!("Dropped {} of {} known tables", dropped.len(), tables.len());
        Ok(dropped)
    }

    /// Run one action as an independent entry point.
    pub async fn run_action(&self, action: Action) -> Result<ActionOutcome> {
        let mut outcome = ActionOutcome::new(action);
        match action {
            Action::Migrate => outcome.migration = Some(self.migrate().await?),
            Action::Validate => outcome.validation = Some(self.validate().await?),
            Action::Optimize => outcome.optimization = Some(self.optimize().await?),
            Action::Clean => outcome.dropped_tables = Some(self.drop_known_tables().await?),
            Action::All => {
                let migration = self.migrate().await?;
                if !migration.success {
                    warn!("Migration transferred no tables, continuing with validation");
                }
                let plan = self.plan().await?;
                outcome.validation = Some(self.validate_tables(&plan.tables).await);
                let tables = self.target.list_tables().await?;
                outcome.optimization = Some(self.optimize_tables(&tables).await);
                outcome.migration = Some(migration);
            }
        }
        Ok(outcome)
    }

    /// Close both connection pools.
    pub async fn close(&self) {
        self.source.close().await;
        self.target.close().await;
    }
}
