//! # mssql-mariadb-migrate
//!
//! Migrates schema and data from Microsoft SQL Server to MariaDB/MySQL.
//!
//! - **Introspection** with ordered fallback strategies (information schema,
//!   system catalog, probe query)
//! - **Type mapping** from MSSQL to MariaDB column types
//! - **Structure sync** that drops and recreates each target table
//! - **Batched transfer** inside one table-scoped transaction, with strict or
//!   checkpointed commits and row-level diagnosis of failed batches
//! - **Validation** of row counts, samples and numeric extremes
//!
//! Tables are processed strictly one after another. A table that fails is
//! reported and the run moves on.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mssql_mariadb_migrate::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(config).await?;
//!     let result = orchestrator.migrate().await?;
//!     println!("Migrated {} rows", result.rows_transferred);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod introspect;
pub mod orchestrator;
pub mod plan;
pub mod report;
pub mod source;
pub mod structure;
pub mod target;
pub mod transfer;
pub mod typemap;
pub mod validate;

// Re-exports for convenient access
pub use config::{CommitMode, Config, MigrationConfig, SourceConfig, TargetConfig};
pub use crate::core::{Column, ForeignKey, Page, Row, SourceReader, SqlValue, Table, TargetSession, TargetWriter};
pub use error::{InsertErrorKind, MigrateError, Result};
pub use introspect::{ColumnStrategy, Introspector, KeyStrategy};
pub use orchestrator::{Action, ActionOutcome, MigrationResult, OptimizeReport, Orchestrator};
pub use plan::MigrationPlan;
pub use report::MigrationLog;
pub use source::MssqlReader;
pub use structure::{StructureSynchronizer, TableDefinition};
pub use target::MysqlWriter;
pub use transfer::{FallbackReport, TransferConfig, TransferEngine, TransferFailure, TransferStats};
pub use typemap::map_type;
pub use validate::{ValidationReport, ValidationResult, Validator};
