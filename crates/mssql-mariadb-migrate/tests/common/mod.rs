//! In-memory source and target used by the integration tests.
//!
//! The fake target keeps committed rows per table and stages session rows
//! until commit, so rollback and checkpoint behavior can be observed.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mssql_mariadb_migrate::config::{MigrationConfig, SourceConfig, TargetConfig};
use mssql_mariadb_migrate::core::{Extremes, Page};
use mssql_mariadb_migrate::{
    Column, ColumnStrategy, Config, ForeignKey, KeyStrategy, MigrateError, Result, Row,
    SourceReader, SqlValue, Table, TableDefinition, TargetSession, TargetWriter,
};

/// Cell value that the fake target rejects with "data too long".
pub const REJECTED: &str = "REJECT-ME";

pub fn int_column(name: &str) -> Column {
    Column {
        name: name.to_string(),
        data_type: "int".to_string(),
        max_length: None,
        precision: Some(10),
        scale: Some(0),
        is_nullable: false,
        default_expr: None,
    }
}

pub fn text_column(name: &str, length: i32) -> Column {
    Column {
        name: name.to_string(),
        data_type: "nvarchar".to_string(),
        max_length: Some(length),
        precision: None,
        scale: None,
        is_nullable: true,
        default_expr: None,
    }
}

/// `n` rows of `(id, "name-<id>")`, ids starting at 1.
pub fn id_name_rows(n: usize) -> Vec<Row> {
    (1..=n as i64)
        .map(|i| vec![SqlValue::Integer(i), SqlValue::Text(format!("name-{}", i))])
        .collect()
}

pub fn config() -> Config {
    Config {
        source: SourceConfig {
            host: "mssql.local".to_string(),
            port: 1433,
            database: "dbmidterm".to_string(),
            user: "sa".to_string(),
            password: "secret".to_string(),
            schema: "dbo".to_string(),
            integrated_auth: false,
            encrypt: false,
            trust_server_cert: false,
            connect_timeout_secs: 5,
        },
        target: TargetConfig {
            host: "mariadb.local".to_string(),
            port: 3306,
            database: "test".to_string(),
            user: "root".to_string(),
            password: "secret".to_string(),
            ssl_mode: "disable".to_string(),
            connect_timeout_secs: 5,
        },
        migration: MigrationConfig::default(),
    }
}

fn extremes_of(rows: &[Row], idx: usize) -> Extremes {
    let mut min: Option<&SqlValue> = None;
    let mut max: Option<&SqlValue> = None;
    for value in rows.iter().filter_map(|r| r.get(idx)) {
        let Some(d) = value.as_decimal() else { continue };
        if min.and_then(|m| m.as_decimal()).map_or(true, |m| d < m) {
            min = Some(value);
        }
        if max.and_then(|m| m.as_decimal()).map_or(true, |m| d > m) {
            max = Some(value);
        }
    }
    Extremes {
        min: min.cloned().unwrap_or(SqlValue::Null),
        max: max.cloned().unwrap_or(SqlValue::Null),
    }
}

fn server_error(table: &str, code: u16, message: &str) -> MigrateError {
    MigrateError::Insert {
        table: table.to_string(),
        code,
        message: message.to_string(),
    }
}

// =============================================================================
// Source
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct SourceTable {
    pub columns: Vec<Column>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
    pub rows: Vec<Row>,
}

#[derive(Default)]
pub struct FakeSource {
    pub tables: Mutex<BTreeMap<String, SourceTable>>,
    /// Column strategies that return an error.
    pub failing_columns: Mutex<Vec<ColumnStrategy>>,
    /// Key strategies that return an error.
    pub failing_keys: Mutex<Vec<KeyStrategy>>,
    /// Column strategies that answer with an empty list.
    pub empty_columns: Mutex<Vec<ColumnStrategy>>,
    /// Fail `fetch_page` at this offset.
    pub fail_fetch_at: Mutex<Option<u64>>,
    pub fetch_calls: AtomicUsize,
    /// Strategy used for each successful column lookup, in order.
    pub column_lookups: Mutex<Vec<ColumnStrategy>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, name: &str, table: SourceTable) -> Self {
        self.tables.lock().unwrap().insert(name.to_string(), table);
        self
    }

    /// `(id int PK, name nvarchar(50))` with `rows` generated rows.
    pub fn with_id_name_table(self, name: &str, rows: usize) -> Self {
        self.with_table(
            name,
            SourceTable {
                columns: vec![int_column("id"), text_column("name", 50)],
                primary_key: vec!["id".to_string()],
                foreign_keys: Vec::new(),
                rows: id_name_rows(rows),
            },
        )
    }

    pub fn describe(&self, name: &str) -> Table {
        let tables = self.tables.lock().unwrap();
        let t = &tables[name];
        Table {
            schema: "dbo".to_string(),
            name: name.to_string(),
            columns: t.columns.clone(),
            primary_key: t.primary_key.clone(),
            foreign_keys: t.foreign_keys.clone(),
        }
    }

    fn table(&self, table: &str) -> Result<SourceTable> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .ok_or_else(|| MigrateError::SchemaExtraction(format!("Invalid object name '{}'", table)))
    }
}

#[async_trait]
impl SourceReader for FakeSource {
    async fn list_tables(&self, _schema: &str) -> Result<Vec<String>> {
        Ok(self.tables.lock().unwrap().keys().cloned().collect())
    }

    async fn table_exists(&self, _schema: &str, table: &str) -> Result<bool> {
        Ok(self.tables.lock().unwrap().contains_key(table))
    }

    async fn load_columns(
        &self,
        strategy: ColumnStrategy,
        _schema: &str,
        table: &str,
    ) -> Result<Vec<Column>> {
        if self.failing_columns.lock().unwrap().contains(&strategy) {
            return Err(MigrateError::SchemaExtraction(format!(
                "{} unavailable",
                strategy.name()
            )));
        }
        if self.empty_columns.lock().unwrap().contains(&strategy) {
            return Ok(Vec::new());
        }
        let columns = self.table(table)?.columns;
        self.column_lookups.lock().unwrap().push(strategy);
        Ok(columns)
    }

    async fn load_primary_key(
        &self,
        strategy: KeyStrategy,
        _schema: &str,
        table: &str,
    ) -> Result<Vec<String>> {
        if self.failing_keys.lock().unwrap().contains(&strategy) {
            return Err(MigrateError::SchemaExtraction(format!(
                "{} unavailable",
                strategy.name()
            )));
        }
        Ok(self.table(table)?.primary_key)
    }

    async fn load_foreign_keys(&self, _schema: &str, table: &str) -> Result<Vec<ForeignKey>> {
        Ok(self.table(table)?.foreign_keys)
    }

    async fn row_count(&self, _schema: &str, table: &str) -> Result<i64> {
        Ok(self.table(table)?.rows.len() as i64)
    }

    async fn fetch_page(
        &self,
        table: &Table,
        _order_by: &[String],
        offset: u64,
        limit: usize,
    ) -> Result<Page> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_fetch_at.lock().unwrap() == Some(offset) {
            return Err(MigrateError::SchemaExtraction("connection reset".to_string()));
        }
        let rows = self.table(&table.name)?.rows;
        let start = (offset as usize).min(rows.len());
        let end = (start + limit).min(rows.len());
        Ok(Page::new(rows[start..end].to_vec()))
    }

    async fn sample_row_count(&self, _schema: &str, table: &str, size: usize) -> Result<usize> {
        Ok(self.table(table)?.rows.len().min(size))
    }

    async fn column_extremes(&self, _schema: &str, table: &str, column: &str) -> Result<Extremes> {
        let t = self.table(table)?;
        let idx = t
            .columns
            .iter()
            .position(|c| c.name == column)
            .ok_or_else(|| MigrateError::SchemaExtraction(format!("no column {}", column)))?;
        Ok(extremes_of(&t.rows, idx))
    }

    fn db_type(&self) -> &str {
        "fake-mssql"
    }

    async fn close(&self) {}
}

// =============================================================================
// Target
// =============================================================================

#[derive(Debug, Clone)]
pub struct TargetTable {
    pub definition: TableDefinition,
    pub rows: Vec<Row>,
}

#[derive(Default)]
pub struct TargetState {
    pub tables: BTreeMap<String, TargetTable>,
    /// Every call in order, e.g. `insert_rows:100`, `commit`, `rollback`.
    pub calls: Vec<String>,
    pub commits: usize,
    /// Fail the n-th commit (1-based).
    pub fail_commit: Option<usize>,
    /// Tables whose CREATE fails.
    pub fail_create: Vec<String>,
    /// Report this many extra columns after creation.
    pub column_count_skew: usize,
    pub foreign_key_checks: bool,
}

#[derive(Clone)]
pub struct FakeTarget {
    pub state: Arc<Mutex<TargetState>>,
}

impl FakeTarget {
    pub fn new() -> Self {
        let state = TargetState {
            foreign_key_checks: true,
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_matching(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.state.lock().unwrap().tables.contains_key(table)
    }

    /// Create a table directly, bypassing the synchronizer.
    pub fn seed(&self, definition: TableDefinition, rows: Vec<Row>) {
        self.state.lock().unwrap().tables.insert(
            definition.name.clone(),
            TargetTable { definition, rows },
        );
    }

    fn with_table<T>(&self, table: &str, f: impl FnOnce(&TargetTable) -> T) -> Result<T> {
        let state = self.state.lock().unwrap();
        state
            .tables
            .get(table)
            .map(f)
            .ok_or_else(|| MigrateError::structure(table, "Table doesn't exist"))
    }
}

#[async_trait]
impl TargetWriter for FakeTarget {
    async fn drop_table(&self, table: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("drop:{}", table));
        state.tables.remove(table);
        Ok(())
    }

    async fn create_table(&self, definition: &TableDefinition) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("create:{}", definition.name));
        if state.fail_create.contains(&definition.name) {
            return Err(MigrateError::structure(&definition.name, "Row size too large"));
        }
        if state.tables.contains_key(&definition.name) {
            return Err(MigrateError::structure(&definition.name, "Table already exists"));
        }
        state.tables.insert(
            definition.name.clone(),
            TargetTable {
                definition: definition.clone(),
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    async fn column_count(&self, table: &str) -> Result<usize> {
        let skew = self.state.lock().unwrap().column_count_skew;
        self.with_table(table, |t| t.definition.columns.len() + skew)
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().unwrap().tables.keys().cloned().collect())
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        self.with_table(table, |t| t.rows.len() as i64)
    }

    async fn sample_row_count(&self, table: &str, size: usize) -> Result<usize> {
        self.with_table(table, |t| t.rows.len().min(size))
    }

    async fn column_extremes(&self, table: &str, column: &str) -> Result<Extremes> {
        self.with_table(table, |t| {
            t.definition
                .columns
                .iter()
                .position(|c| c.name == column)
                .map(|idx| extremes_of(&t.rows, idx))
        })?
        .ok_or_else(|| MigrateError::structure(table, format!("Unknown column '{}'", column)))
    }

    async fn analyze_table(&self, table: &str) -> Result<()> {
        self.state.lock().unwrap().calls.push(format!("analyze:{}", table));
        self.with_table(table, |_| ())
    }

    async fn optimize_table(&self, table: &str) -> Result<()> {
        self.state.lock().unwrap().calls.push(format!("optimize:{}", table));
        self.with_table(table, |_| ())
    }

    async fn drop_tables_unchecked(&self, tables: &[String]) -> Result<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.foreign_key_checks = false;
        state.calls.push("foreign_key_checks:0".to_string());

        let mut dropped = Vec::new();
        for wanted in tables {
            let actual = state
                .tables
                .keys()
                .find(|t| t.eq_ignore_ascii_case(wanted))
                .cloned();
            if let Some(actual) = actual {
                state.tables.remove(&actual);
                state.calls.push(format!("drop:{}", actual));
                dropped.push(actual);
            }
        }

        state.foreign_key_checks = true;
        state.calls.push("foreign_key_checks:1".to_string());
        Ok(dropped)
    }

    async fn begin_session(
        &self,
        table: &str,
        _columns: &[String],
    ) -> Result<Box<dyn TargetSession>> {
        self.state.lock().unwrap().calls.push(format!("begin:{}", table));
        Ok(Box::new(FakeSession {
            state: self.state.clone(),
            table: table.to_string(),
            staged: Vec::new(),
        }))
    }

    fn db_type(&self) -> &str {
        "fake-mariadb"
    }

    async fn close(&self) {}
}

/// Session staging rows until commit. Dropping it discards staged rows.
pub struct FakeSession {
    state: Arc<Mutex<TargetState>>,
    table: String,
    staged: Vec<Row>,
}

impl FakeSession {
    fn check(&self, row: &Row) -> Result<()> {
        if row.iter().any(|v| matches!(v, SqlValue::Text(s) if s == REJECTED)) {
            return Err(server_error(
                &self.table,
                1406,
                "Data too long for column 'name' at row 1",
            ));
        }
        if let Some(SqlValue::Integer(id)) = row.first() {
            let state = self.state.lock().unwrap();
            let committed = state
                .tables
                .get(&self.table)
                .map(|t| t.rows.iter().any(|r| r.first() == Some(&SqlValue::Integer(*id))))
                .unwrap_or(false);
            let staged = self
                .staged
                .iter()
                .any(|r| r.first() == Some(&SqlValue::Integer(*id)));
            if committed || staged {
                return Err(server_error(
                    &self.table,
                    1062,
                    &format!("Duplicate entry '{}' for key 'PRIMARY'", id),
                ));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TargetSession for FakeSession {
    async fn insert_row(&mut self, row: &Row) -> Result<()> {
        self.state.lock().unwrap().calls.push("insert_row".to_string());
        self.check(row)?;
        self.staged.push(row.clone());
        Ok(())
    }

    async fn insert_rows(&mut self, rows: &[Row]) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(format!("insert_rows:{}", rows.len()));
        // A multi-row statement is atomic: one bad row rejects all of them.
        let before = self.staged.len();
        for row in rows {
            if let Err(e) = self.check(row) {
                self.staged.truncate(before);
                return Err(e);
            }
            self.staged.push(row.clone());
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.commits += 1;
        state.calls.push("commit".to_string());
        if state.fail_commit == Some(state.commits) {
            return Err(MigrateError::transfer(
                &self.table,
                "Lost connection to server during query",
            ));
        }
        let staged = std::mem::take(&mut self.staged);
        if let Some(t) = state.tables.get_mut(&self.table) {
            t.rows.extend(staged);
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.state.lock().unwrap().calls.push("rollback".to_string());
        self.staged.clear();
        Ok(())
    }
}
