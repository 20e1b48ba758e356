//! Target table (re)creation.
//!
//! Synchronizing a table is destructive: the target table is dropped
//! unconditionally and recreated from the source description. Migration is
//! always a full replace, never incremental.

use std::sync::Arc;

use tracing::{info, warn};

use crate::core::identifier::quote_mysql;
use crate::core::schema::Table;
use crate::core::traits::TargetWriter;
use crate::error::{MigrateError, Result};
use crate::typemap::{is_large_text, map_column_type};

/// Key prefix used when a primary key column maps to a large-text type.
pub const TEXT_KEY_PREFIX: u32 = 255;

/// Table options appended to every creation statement.
pub const TABLE_OPTIONS: &str = "ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_bin";

/// One column clause of the creation statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: String,
    pub sql_type: String,
    pub nullable: bool,
}

/// One entry of the primary key clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPart {
    pub column: String,
    /// Index prefix length, required for TEXT columns.
    pub prefix: Option<u32>,
}

/// Everything needed to create a target table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
    pub primary_key: Vec<KeyPart>,
}

impl TableDefinition {
    /// Map a source table description to a target definition.
    pub fn from_table(table: &Table) -> Self {
        let columns: Vec<ColumnDefinition> = table
            .columns
            .iter()
            .map(|c| {
                let mapping = map_column_type(&c.data_type, c.max_length, c.precision, c.scale);
                if let Some(warning) = &mapping.warning {
                    warn!(table = %table.name, "Column {}: {}", c.name, warning);
                }
                ColumnDefinition {
                    name: c.name.clone(),
                    sql_type: mapping.target_type,
                    nullable: c.is_nullable,
                }
            })
            .collect();

        let primary_key = table
            .primary_key
            .iter()
            .map(|k| {
                let large = columns
                    .iter()
                    .find(|c| &c.name == k)
                    .map(|c| is_large_text(&c.sql_type))
                    .unwrap_or(false);
                KeyPart {
                    column: k.clone(),
                    prefix: large.then_some(TEXT_KEY_PREFIX),
                }
            })
            .collect();

        Self {
            name: table.name.clone(),
            columns,
            primary_key,
        }
    }

    /// Render the MariaDB `CREATE TABLE` statement.
    pub fn create_statement(&self) -> Result<String> {
        let mut clauses = Vec::with_capacity(self.columns.len() + 1);
        for c in &self.columns {
            clauses.push(format!(
                "{} {} {}",
                quote_mysql(&c.name)?,
                c.sql_type,
                if c.nullable { "NULL" } else { "NOT NULL" }
            ));
        }

        if !self.primary_key.is_empty() {
            let mut parts = Vec::with_capacity(self.primary_key.len());
            for k in &self.primary_key {
                let quoted = quote_mysql(&k.column)?;
                parts.push(match k.prefix {
                    Some(len) => format!("{}({})", quoted, len),
                    None => quoted,
                });
            }
            clauses.push(format!("PRIMARY KEY ({})", parts.join(", ")));
        }

        Ok(format!(
            "CREATE TABLE {} (\n    {}\n) {}",
            quote_mysql(&self.name)?,
            clauses.join(",\n    "),
            TABLE_OPTIONS
        ))
    }
}

/// Drops and recreates target tables from source descriptions.
pub struct StructureSynchronizer {
    target: Arc<dyn TargetWriter>,
}

impl StructureSynchronizer {
    pub fn new(target: Arc<dyn TargetWriter>) -> Self {
        Self { target }
    }

    /// Drop `table` on the target, recreate it, and verify the column count.
    ///
    /// Any prior contents of the same-named target table are lost.
    pub async fn synchronize(&self, table: &Table) -> Result<TableDefinition> {
        let definition = TableDefinition::from_table(table);

        self.target.drop_table(&table.name).await?;
        info!(table = %table.name, phase = "structure", "Dropped existing target table");

        self.target.create_table(&definition).await?;

        let created = self.target.column_count(&table.name).await?;
        if created != definition.columns.len() {
            return Err(MigrateError::structure(
                &table.name,
                format!(
                    "expected {} columns after creation, target reports {}",
                    definition.columns.len(),
                    created
                ),
            ));
        }

        info!(
            table = %table.name,
            phase = "structure",
            "Created target table with {} columns",
            created
        );
        Ok(definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::Column;

    fn column(name: &str, data_type: &str, len: Option<i32>, nullable: bool) -> Column {
        Column {
            name: name.into(),
            data_type: data_type.into(),
            max_length: len,
            precision: None,
            scale: None,
            is_nullable: nullable,
            default_expr: None,
        }
    }

    fn factory() -> Table {
        Table {
            schema: "dbo".into(),
            name: "Factory".into(),
            columns: vec![
                column("FactoryID", "int", None, false),
                column("Name", "nvarchar", Some(100), true),
            ],
            primary_key: vec!["FactoryID".into()],
            foreign_keys: vec![],
        }
    }

    #[test]
    fn test_create_statement() {
        let ddl = TableDefinition::from_table(&factory())
            .create_statement()
            .unwrap();
        assert_eq!(
            ddl,
            "CREATE TABLE `Factory` (\n    `FactoryID` INT NOT NULL,\n    `Name` VARCHAR(100) NULL,\n    PRIMARY KEY (`FactoryID`)\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_bin"
        );
    }

    #[test]
    fn test_no_primary_key_clause_without_key() {
        let mut table = factory();
        table.primary_key.clear();
        let ddl = TableDefinition::from_table(&table).create_statement().unwrap();
        assert!(!ddl.contains("PRIMARY KEY"));
    }

    #[test]
    fn test_text_key_gets_prefix() {
        let table = Table {
            schema: "dbo".into(),
            name: "Notes".into(),
            columns: vec![column("Code", "nvarchar", Some(-1), false)],
            primary_key: vec!["Code".into()],
            foreign_keys: vec![],
        };
        let def = TableDefinition::from_table(&table);
        assert_eq!(def.primary_key[0].prefix, Some(TEXT_KEY_PREFIX));
        assert!(def
            .create_statement()
            .unwrap()
            .contains("PRIMARY KEY (`Code`(255))"));
    }
}
