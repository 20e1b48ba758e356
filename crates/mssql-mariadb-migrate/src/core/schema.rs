//! Schema metadata for source tables.
//!
//! A [`Table`] is built fresh by the introspector for every run and is never
//! persisted. Columns keep the source engine's declared type name; mapping to
//! target types happens in [`crate::typemap`].

use serde::{Deserialize, Serialize};

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Declared source type name (e.g. "nvarchar", "decimal").
    pub data_type: String,

    /// Maximum length in characters. `None` for types without a length,
    /// `Some(-1)` for `(max)` columns.
    pub max_length: Option<i32>,

    /// Numeric precision.
    pub precision: Option<i32>,

    /// Numeric scale.
    pub scale: Option<i32>,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Default expression as declared on the source, if any.
    pub default_expr: Option<String>,
}

impl Column {
    /// Whether MIN/MAX comparisons make sense for this column.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self.data_type.to_lowercase().as_str(),
            "tinyint"
                | "smallint"
                | "int"
                | "integer"
                | "bigint"
                | "decimal"
                | "numeric"
                | "money"
                | "smallmoney"
                | "float"
                | "real"
        )
    }
}

/// Foreign key metadata. Informational only; not recreated on the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
}

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Schema name.
    pub schema: String,

    /// Table name.
    pub name: String,

    /// Columns in ordinal order.
    pub columns: Vec<Column>,

    /// Primary key column names in key order. Always a subset of `columns`.
    pub primary_key: Vec<String>,

    /// Foreign keys declared on this table.
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    /// Get the fully qualified table name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Column names in ordinal order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Drop key columns that are not part of the column list.
    ///
    /// Returns the names that were removed.
    pub fn retain_known_key_columns(&mut self) -> Vec<String> {
        let known: Vec<String> = self.column_names();
        let (kept, dropped): (Vec<String>, Vec<String>) = std::mem::take(&mut self.primary_key)
            .into_iter()
            .partition(|k| known.contains(k));
        self.primary_key = kept;
        dropped
    }
}
