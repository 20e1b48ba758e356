//! mssql-mariadb-migrate CLI - MSSQL to MariaDB migration.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use mssql_mariadb_migrate::{Action, ActionOutcome, Config, MigrateError, Orchestrator};
use tracing::{error, info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "mssql-mariadb-migrate")]
#[command(about = "Migrate schema and data from MSSQL to MariaDB")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Directory for migration and validation report files
    #[arg(long, default_value = ".")]
    report_dir: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Override rows fetched per page
    #[arg(long)]
    batch_size: Option<usize>,

    /// Override source schema
    #[arg(long)]
    schema: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recreate target tables and transfer all rows
    Migrate,

    /// Compare row counts, samples and numeric extremes (migrates first if tables are missing)
    Validate,

    /// Analyze and optimize target tables (migrates first if the target is empty)
    Optimize,

    /// Drop the known tables from the target
    Clean,

    /// Migrate, validate, then optimize
    All,

    /// Test database connections
    HealthCheck,
}

impl Commands {
    fn action(&self) -> Option<Action> {
        match self {
            Commands::Migrate => Some(Action::Migrate),
            Commands::Validate => Some(Action::Validate),
            Commands::Optimize => Some(Action::Optimize),
            Commands::Clean => Some(Action::Clean),
            Commands::All => Some(Action::All),
            Commands::HealthCheck => None,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(MigrateError::Config)?;

    let mut config = Config::load(&cli.config)?;
    if let Some(batch_size) = cli.batch_size {
        config.migration.batch_size = batch_size;
    }
    if let Some(schema) = cli.schema.clone() {
        config.source.schema = schema;
    }
    config.validate()?;
    info!("Loaded configuration from {:?}", cli.config);

    let orchestrator = Orchestrator::new(config).await?;

    let Some(action) = cli.command.action() else {
        info!("Health check passed: source and target reachable");
        println!("OK");
        orchestrator.close().await;
        return Ok(ExitCode::SUCCESS);
    };

    let outcome = orchestrator.run_action(action).await;
    orchestrator.close().await;
    let outcome = outcome?;

    if let Err(e) = write_reports(&cli.report_dir, &outcome) {
        error!("Could not write report files: {:#}", e);
    }

    if cli.output_json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_summary(&outcome);
    }

    if outcome.succeeded() {
        Ok(ExitCode::SUCCESS)
    } else {
        warn!("Action '{}' finished with failures", outcome.action);
        Ok(ExitCode::FAILURE)
    }
}

fn print_summary(outcome: &ActionOutcome) {
    if let Some(result) = &outcome.migration {
        println!("\nMigration {}!", result.status);
        println!("  Run ID: {}", result.run_id);
        println!("  Duration: {:.2}s", result.duration_seconds);
        println!(
            "  Tables: {}/{} transferred, {} skipped",
            result.tables_success,
            result.tables_total,
            result.skipped_tables.len()
        );
        println!("  Rows: {}", result.rows_transferred);
        println!("  Throughput: {} rows/sec", result.rows_per_second);
        if !result.structure_failed.is_empty() {
            println!("  Structure failed: {}", result.structure_failed.join(", "));
        }
        if !result.failed_tables.is_empty() {
            println!("  Transfer failed: {}", result.failed_tables.join(", "));
        }
    }

    if let Some(report) = &outcome.validation {
        println!("\nValidation:");
        for (table, result) in &report.tables {
            let status = if result.consistent { "OK" } else { "MISMATCH" };
            println!(
                "  {}: {} (source={}, target={})",
                table, status, result.source_count, result.target_count
            );
        }
        println!(
            "  Overall: {}",
            if report.overall_success { "consistent" } else { "inconsistent" }
        );
    }

    if let Some(report) = &outcome.optimization {
        println!("\nOptimization:");
        for (table, result) in &report.tables {
            match &result.error {
                None => println!("  {}: OK ({} rows)", table, result.row_count.unwrap_or(0)),
                Some(e) => println!("  {}: FAILED ({})", table, e),
            }
        }
    }

    if let Some(dropped) = &outcome.dropped_tables {
        println!("\nDropped {} tables", dropped.len());
        for table in dropped {
            println!("  {}", table);
        }
    }
}

/// Write `migration_<ts>.json` and `validation_<ts>.json` for whatever the
/// action produced.
fn write_reports(dir: &Path, outcome: &ActionOutcome) -> anyhow::Result<()> {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();

    if let Some(result) = &outcome.migration {
        let path = write_report(dir, &format!("migration_{}.json", stamp), &result.to_json()?)?;
        info!("Migration log written to {}", path.display());
    }
    if let Some(report) = &outcome.validation {
        let json = serde_json::to_string_pretty(report)?;
        let path = write_report(dir, &format!("validation_{}.json", stamp), &json)?;
        info!("Validation report written to {}", path.display());
    }
    Ok(())
}

fn write_report(dir: &Path, name: &str, json: &str) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating report directory {}", dir.display()))?;
    let path = dir.join(name);
    std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("unknown log format '{}', expected text or json", other)),
    }

    Ok(())
}
