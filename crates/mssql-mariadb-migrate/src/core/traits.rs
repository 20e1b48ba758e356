//! Traits at the seams between the migration engine and the database drivers.
//!
//! The engine (introspector, synchronizer, transfer loop, validator) only talks
//! to these traits. [`crate::source::MssqlReader`] and
//! [`crate::target::MysqlWriter`] are the production implementations; tests
//! drive the engine through in-memory ones.

use async_trait::async_trait;

use crate::core::schema::{Column, ForeignKey, Table};
use crate::core::value::{Extremes, Page, Row};
use crate::error::Result;
use crate::introspect::{ColumnStrategy, KeyStrategy};
use crate::structure::TableDefinition;

/// Read-only access to the source database.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Base tables of a schema, ordered by name.
    async fn list_tables(&self, schema: &str) -> Result<Vec<String>>;

    /// Whether the table exists in the schema.
    async fn table_exists(&self, schema: &str, table: &str) -> Result<bool>;

    /// Load the column list using one metadata strategy.
    async fn load_columns(
        &self,
        strategy: ColumnStrategy,
        schema: &str,
        table: &str,
    ) -> Result<Vec<Column>>;

    /// Load primary key column names, in key order, using one metadata strategy.
    async fn load_primary_key(
        &self,
        strategy: KeyStrategy,
        schema: &str,
        table: &str,
    ) -> Result<Vec<String>>;

    /// Load foreign keys declared on the table.
    async fn load_foreign_keys(&self, schema: &str, table: &str) -> Result<Vec<ForeignKey>>;

    /// Exact row count.
    async fn row_count(&self, schema: &str, table: &str) -> Result<i64>;

    /// Fetch one page of rows: skip `offset`, take `limit`, ordered by
    /// `order_by` when non-empty. Values come back in `table.columns` order.
    async fn fetch_page(
        &self,
        table: &Table,
        order_by: &[String],
        offset: u64,
        limit: usize,
    ) -> Result<Page>;

    /// Number of rows in a random sample of at most `size` rows.
    async fn sample_row_count(&self, schema: &str, table: &str, size: usize) -> Result<usize>;

    /// MIN/MAX over the non-null values of a column.
    async fn column_extremes(&self, schema: &str, table: &str, column: &str)
        -> Result<Extremes>;

    /// Get the database type.
    fn db_type(&self) -> &str;

    /// Close all connections.
    async fn close(&self);
}

/// Write access to the target database.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    /// Drop the table if it exists.
    async fn drop_table(&self, table: &str) -> Result<()>;

    /// Issue the creation statement for a table.
    async fn create_table(&self, definition: &TableDefinition) -> Result<()>;

    /// Number of columns the target reports for a table.
    async fn column_count(&self, table: &str) -> Result<usize>;

    /// All tables in the target database.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Exact row count.
    async fn row_count(&self, table: &str) -> Result<i64>;

    /// Number of rows in an unordered sample of at most `size` rows.
    async fn sample_row_count(&self, table: &str, size: usize) -> Result<usize>;

    /// MIN/MAX over the non-null values of a column.
    async fn column_extremes(&self, table: &str, column: &str) -> Result<Extremes>;

    /// Refresh index statistics.
    async fn analyze_table(&self, table: &str) -> Result<()>;

    /// Rebuild the table and reclaim space.
    async fn optimize_table(&self, table: &str) -> Result<()>;

    /// Drop tables in the given order with foreign-key checks disabled for
    /// the duration, re-enabling them afterwards. Returns the tables that
    /// existed and were dropped.
    async fn drop_tables_unchecked(&self, tables: &[String]) -> Result<Vec<String>>;

    /// Open a write transaction for inserting into `table` with the given
    /// column order.
    async fn begin_session(&self, table: &str, columns: &[String])
        -> Result<Box<dyn TargetSession>>;

    /// Get the database type.
    fn db_type(&self) -> &str;

    /// Close all connections.
    async fn close(&self);
}

/// One open write transaction on one target connection, autocommit off.
///
/// Dropping a session without committing discards its uncommitted rows.
#[async_trait]
pub trait TargetSession: Send {
    /// Insert exactly one row.
    async fn insert_row(&mut self, row: &Row) -> Result<()>;

    /// Insert several rows in a single multi-row statement.
    async fn insert_rows(&mut self, rows: &[Row]) -> Result<()>;

    /// Commit everything staged so far. The session stays usable.
    async fn commit(&mut self) -> Result<()>;

    /// Discard everything staged since the last commit.
    async fn rollback(&mut self) -> Result<()>;
}
