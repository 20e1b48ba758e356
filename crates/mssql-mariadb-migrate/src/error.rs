//! Error types for the migration library.

use std::fmt;

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source database connection or query error
    #[error("Source database error: {0}")]
    Source(#[from] tiberius::error::Error),

    /// Target database connection or query error
    #[error("Target database error: {0}")]
    Target(#[from] mysql_async::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Every authentication variant was rejected or timed out
    #[error("Could not connect to {endpoint}: {message}")]
    Connectivity { endpoint: String, message: String },

    /// Schema extraction failed
    #[error("Schema extraction failed: {0}")]
    SchemaExtraction(String),

    /// Target table could not be created or verified
    #[error("Structure sync failed for table {table}: {message}")]
    Structure { table: String, message: String },

    /// Data transfer failed for a specific table
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// Insert rejected by the target server
    #[error("Insert into {table} failed ({}): {message}", describe_code(.code))]
    Insert {
        table: String,
        code: u16,
        message: String,
    },

    /// Validation queries failed
    #[error("Validation failed: {0}")]
    Validation(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl fmt::Display, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Structure error
    pub fn structure(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Structure {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Attach the table name to a target server error, keeping its error code.
    pub fn from_insert(table: &str, err: mysql_async::Error) -> Self {
        match err {
            mysql_async::Error::Server(server) => MigrateError::Insert {
                table: table.to_string(),
                code: server.code,
                message: server.message,
            },
            other => MigrateError::Target(other),
        }
    }

    /// Classification of an insert failure, if this is one.
    pub fn insert_kind(&self) -> Option<InsertErrorKind> {
        match self {
            MigrateError::Insert { code, .. } => Some(InsertErrorKind::from_code(*code)),
            _ => None,
        }
    }

    /// Whether the error means one of the engines is unreachable.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            MigrateError::Connectivity { .. } | MigrateError::Pool { .. }
        )
    }

    /// Process exit code used by the command-line front end.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 2,
            e if e.is_connectivity() => 3,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        // Add error chain for wrapped errors
        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Driver-level insert failures, classified by MariaDB error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertErrorKind {
    /// ER_DUP_ENTRY (1062)
    DuplicateKey,
    /// ER_DATA_TOO_LONG (1406)
    DataTooLong,
    /// ER_WARN_DATA_OUT_OF_RANGE (1264)
    OutOfRange,
    /// ER_TRUNCATED_WRONG_VALUE (1292) or
    /// ER_TRUNCATED_WRONG_VALUE_FOR_FIELD (1366)
    IncorrectValue,
    Other(u16),
}

impl InsertErrorKind {
    pub fn from_code(code: u16) -> Self {
        match code {
            1062 => InsertErrorKind::DuplicateKey,
            1406 => InsertErrorKind::DataTooLong,
            1264 => InsertErrorKind::OutOfRange,
            1292 | 1366 => InsertErrorKind::IncorrectValue,
            other => InsertErrorKind::Other(other),
        }
    }

    /// Human-readable root cause for logs.
    pub fn cause(&self) -> &'static str {
        match self {
            InsertErrorKind::DuplicateKey => "duplicate primary or unique key",
            InsertErrorKind::DataTooLong => "value too long for target column",
            InsertErrorKind::OutOfRange => "numeric value out of range",
            InsertErrorKind::IncorrectValue => "incorrect date/time or value format",
            InsertErrorKind::Other(_) => "unclassified server error",
        }
    }
}

impl fmt::Display for InsertErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertErrorKind::Other(code) => write!(f, "error {}: {}", code, self.cause()),
            _ => f.write_str(self.cause()),
        }
    }
}

fn describe_code(code: &u16) -> InsertErrorKind {
    InsertErrorKind::from_code(*code)
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
