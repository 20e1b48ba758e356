//! Schema introspection with ordered metadata strategies.
//!
//! Column discovery tries each [`ColumnStrategy`] in turn and keeps the first
//! non-empty answer; primary keys work the same way with [`KeyStrategy`].
//! A strategy that errors is logged and skipped. Foreign keys come from a
//! single query and degrade to an empty list on failure.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::schema::{Column, ForeignKey, Table};
use crate::core::traits::SourceReader;

/// One way of discovering a table's columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnStrategy {
    /// `INFORMATION_SCHEMA.COLUMNS`.
    InformationSchema,
    /// Engine-native catalog views (`sys.columns` and friends). Works when the
    /// standard views are restricted or misreport lengths.
    SystemCatalog,
    /// A one-row `SELECT` whose result-set metadata is read back.
    ProbeQuery,
}

impl ColumnStrategy {
    /// Default order of attempts.
    pub const CHAIN: [ColumnStrategy; 3] = [
        ColumnStrategy::InformationSchema,
        ColumnStrategy::SystemCatalog,
        ColumnStrategy::ProbeQuery,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ColumnStrategy::InformationSchema => "information_schema",
            ColumnStrategy::SystemCatalog => "system_catalog",
            ColumnStrategy::ProbeQuery => "probe_query",
        }
    }
}

/// One way of discovering a table's primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStrategy {
    /// `INFORMATION_SCHEMA.KEY_COLUMN_USAGE` filtered to PRIMARY KEY constraints.
    KeyColumnUsage,
    /// `sys.key_constraints` joined with `sys.index_columns`.
    SystemCatalog,
}

impl KeyStrategy {
    /// Default order of attempts.
    pub const CHAIN: [KeyStrategy; 2] = [KeyStrategy::KeyColumnUsage, KeyStrategy::SystemCatalog];

    pub fn name(&self) -> &'static str {
        match self {
            KeyStrategy::KeyColumnUsage => "key_column_usage",
            KeyStrategy::SystemCatalog => "system_catalog",
        }
    }
}

/// Resolves table metadata from the source.
pub struct Introspector {
    source: Arc<dyn SourceReader>,
    column_chain: Vec<ColumnStrategy>,
    key_chain: Vec<KeyStrategy>,
}

impl Introspector {
    pub fn new(source: Arc<dyn SourceReader>) -> Self {
        Self {
            source,
            column_chain: ColumnStrategy::CHAIN.to_vec(),
            key_chain: KeyStrategy::CHAIN.to_vec(),
        }
    }

    /// Replace the column strategy order.
    pub fn with_column_chain(mut self, chain: Vec<ColumnStrategy>) -> Self {
        self.column_chain = chain;
        self
    }

    /// Describe a table.
    ///
    /// Returns `None` when the table does not exist or no strategy produced a
    /// column list ("no schema available"). The caller skips such tables.
    pub async fn describe(&self, schema: &str, table: &str) -> Option<Table> {
        match self.source.table_exists(schema, table).await {
            Ok(true) => {}
            Ok(false) => {
                match self.source.list_tables(schema).await {
                    Ok(existing) => warn!(
                        table = %table,
                        "Table {}.{} does not exist (available: {})",
                        schema,
                        table,
                        existing.join(", ")
                    ),
                    Err(_) => warn!(table = %table, "Table {}.{} does not exist", schema, table),
                }
                return None;
            }
            // The existence query failing does not mean the table is gone;
            // let the strategies decide.
            Err(e) => warn!(table = %table, "Existence check failed: {}", e),
        }

        let columns = self.columns(schema, table).await;
        if columns.is_empty() {
            warn!(table = %table, "No schema available for {}.{}", schema, table);
            return None;
        }

        let primary_key = self.primary_key(schema, table).await;
        let foreign_keys = self.foreign_keys(schema, table).await;

        let mut described = Table {
            schema: schema.to_string(),
            name: table.to_string(),
            columns,
            primary_key,
            foreign_keys,
        };

        let unknown = described.retain_known_key_columns();
        if !unknown.is_empty() {
            warn!(
                table = %table,
                "Ignoring primary key columns missing from the column list: {:?}",
                unknown
            );
        }

        let preview: Vec<&str> = described
            .columns
            .iter()
            .take(5)
            .map(|c| c.name.as_str())
            .collect();
        info!(
            table = %table,
            "Described {}: {} columns, PK {:?}, {} foreign keys (first columns: {})",
            described.full_name(),
            described.columns.len(),
            described.primary_key,
            described.foreign_keys.len(),
            preview.join(", ")
        );

        Some(described)
    }

    /// Run the column strategies in order until one returns columns.
    pub async fn columns(&self, schema: &str, table: &str) -> Vec<Column> {
        for strategy in &self.column_chain {
            match self.source.load_columns(*strategy, schema, table).await {
                Ok(columns) if !columns.is_empty() => {
                    debug!(
                        table = %table,
                        "Loaded {} columns via {}",
                        columns.len(),
                        strategy.name()
                    );
                    return columns;
                }
                Ok(_) => debug!(table = %table, "{} returned no columns", strategy.name()),
                Err(e) => warn!(table = %table, "{} failed: {}", strategy.name(), e),
            }
        }
        Vec::new()
    }

    /// Run the key strategies in order until one returns key columns.
    ///
    /// An empty result means the table has no declared primary key.
    pub async fn primary_key(&self, schema: &str, table: &str) -> Vec<String> {
        for strategy in &self.key_chain {
            match self.source.load_primary_key(*strategy, schema, table).await {
                Ok(key) if !key.is_empty() => {
                    debug!(table = %table, "Primary key {:?} via {}", key, strategy.name());
                    return key;
                }
                Ok(_) => debug!(table = %table, "{} returned no key", strategy.name()),
                Err(e) => warn!(table = %table, "{} failed: {}", strategy.name(), e),
            }
        }
        Vec::new()
    }

    /// Foreign keys, or an empty list if the query fails.
    pub async fn foreign_keys(&self, schema: &str, table: &str) -> Vec<ForeignKey> {
        match self.source.load_foreign_keys(schema, table).await {
            Ok(fks) => fks,
            Err(e) => {
                warn!(table = %table, "Foreign key lookup failed: {}", e);
                Vec::new()
            }
        }
    }
}
