//! Configuration type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (MSSQL).
    pub source: SourceConfig,

    /// Target database configuration (MariaDB/MySQL).
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Source database (MSSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 1433).
    #[serde(default = "default_mssql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username. May be empty when integrated auth is used.
    #[serde(default)]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Source schema (default: "dbo").
    #[serde(default = "default_dbo_schema")]
    pub schema: String,

    /// Try Windows/Kerberos integrated auth before the SQL login.
    #[serde(default)]
    pub integrated_auth: bool,

    /// Encrypt connection (default: true).
    #[serde(default = "default_true")]
    pub encrypt: bool,

    /// Trust server certificate (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,

    /// Bounded wait for opening a session (default: 15 seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

/// One way of authenticating against the source server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceAuth {
    /// Windows/Kerberos single sign-on.
    Integrated,
    /// SQL Server login with user and password.
    SqlLogin,
}

impl SourceConfig {
    /// Authentication variants to try, in order.
    pub fn auth_attempts(&self) -> Vec<SourceAuth> {
        let mut attempts = Vec::with_capacity(2);
        if self.integrated_auth {
            attempts.push(SourceAuth::Integrated);
        }
        if !self.user.is_empty() {
            attempts.push(SourceAuth::SqlLogin);
        }
        attempts
    }

    /// `host:port/database` for log and error messages.
    pub fn endpoint(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("integrated_auth", &self.integrated_auth)
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Target database (MariaDB/MySQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// SSL mode: disable, prefer, require, verify-ca, verify-full (default: "prefer").
    #[serde(default = "default_prefer")]
    pub ssl_mode: String,

    /// Bounded wait for opening a session (default: 15 seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl TargetConfig {
    /// `host:port/database` for log and error messages.
    pub fn endpoint(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// When the table-scoped transaction is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CommitMode {
    /// One commit after the last page. Any failure leaves the table empty.
    Strict,
    /// Intermediate commits every `checkpoint_every_pages` pages plus a final commit.
    /// A failure only rolls back the uncommitted tail.
    #[default]
    Checkpointed,
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows fetched from the source per page (default: 1000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Commit policy for the per-table transaction (default: checkpointed).
    #[serde(default)]
    pub commit_mode: CommitMode,

    /// Pages between intermediate commits in checkpointed mode (default: 50).
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every_pages: usize,

    /// Dependency-ordered table names migrated first. Empty means the order is
    /// derived from discovered foreign keys.
    #[serde(default)]
    pub table_order: Vec<String>,

    /// Tables dropped by the clean action, in drop order. Empty means
    /// `table_order` reversed.
    #[serde(default)]
    pub clean_tables: Vec<String>,

    /// Rows sampled on each side by the validator (default: 100).
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,

    /// Row errors tolerated by the fallback diagnosis before it stops (default: 10).
    #[serde(default = "default_max_fallback_errors")]
    pub max_fallback_errors: usize,

    /// Re-run a failed page row by row to find the offending rows (default: true).
    #[serde(default = "default_true")]
    pub diagnose_failed_batches: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            commit_mode: CommitMode::default(),
            checkpoint_every_pages: default_checkpoint_every(),
            table_order: Vec::new(),
            clean_tables: Vec::new(),
            sample_size: default_sample_size(),
            max_fallback_errors: default_max_fallback_errors(),
            diagnose_failed_batches: true,
        }
    }
}

impl MigrationConfig {
    /// Tables dropped by the clean action, children first.
    pub fn effective_clean_tables(&self) -> Vec<String> {
        if self.clean_tables.is_empty() {
            self.table_order.iter().rev().cloned().collect()
        } else {
            self.clean_tables.clone()
        }
    }
}

// Default value functions
fn default_mssql_port() -> u16 {
    1433
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_dbo_schema() -> String {
    "dbo".to_string()
}

fn default_prefer() -> String {
    "prefer".to_string()
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    15
}

fn default_batch_size() -> usize {
    1000
}

fn default_checkpoint_every() -> usize {
    50
}

fn default_sample_size() -> usize {
    100
}

fn default_max_fallback_errors() -> usize {
    10
}
