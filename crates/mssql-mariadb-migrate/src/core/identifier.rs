//! Identifier validation and quoting for dynamically built SQL.
//!
//! Table and column names cannot be bound as statement parameters, so every
//! identifier that ends up in generated SQL goes through this module first.

use crate::error::{MigrateError, Result};

/// SQL Server allows 128 characters, MariaDB 64. Use the larger bound and let
/// the target reject anything it cannot hold.
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier for security issues.
///
/// Rejects empty identifiers, identifiers containing null bytes and
/// identifiers exceeding the maximum length.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.chars().count() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "Identifier exceeds maximum length of {} characters: {:?}",
            MAX_IDENTIFIER_LENGTH, name
        )));
    }

    Ok(())
}

/// Quote a SQL Server identifier: `[name]` with `]` doubled.
pub fn quote_mssql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("[{}]", name.replace(']', "]]")))
}

/// Quote a MariaDB/MySQL identifier: backticks with embedded backticks doubled.
pub fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}

/// `[schema].[table]` for SQL Server.
pub fn qualify_mssql(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_mssql(schema)?, quote_mssql(table)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_mssql() {
        assert_eq!(quote_mssql("Factory").unwrap(), "[Factory]");
        assert_eq!(quote_mssql("odd]name").unwrap(), "[odd]]name]");
        assert_eq!(qualify_mssql("dbo", "Factory").unwrap(), "[dbo].[Factory]");
    }

    #[test]
    fn test_quote_mysql() {
        assert_eq!(quote_mysql("Factory").unwrap(), "`Factory`");
        assert_eq!(quote_mysql("odd`name").unwrap(), "`odd``name`");
    }

    #[test]
    fn test_rejects_bad_identifiers() {
        assert!(quote_mysql("").is_err());
        assert!(quote_mssql("a\0b").is_err());
        assert!(quote_mysql(&"x".repeat(129)).is_err());
        assert!(quote_mysql(&"x".repeat(128)).is_ok());
    }
}
