//! MariaDB/MySQL target writer.
//!
//! [`MysqlWriter`] owns a mysql_async pool for DDL, counts and maintenance.
//! Row loading goes through a [`MysqlSession`], which pins one connection
//! with autocommit off for the lifetime of a table transfer.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, SslOpts, Value};
use tracing::{debug, info, warn};

use crate::config::TargetConfig;
use crate::core::identifier::quote_mysql;
use crate::core::traits::{TargetSession, TargetWriter};
use crate::core::value::{Extremes, Row, SqlValue};
use crate::error::{MigrateError, Result};
use crate::structure::TableDefinition;

/// One connection serves DDL and counts, one the open transfer session;
/// the rest absorb validation and maintenance.
const POOL_MAX_CONNS: usize = 4;

/// MySQL placeholder limit per statement.
const MYSQL_MAX_PLACEHOLDERS: usize = 65535;

/// MariaDB/MySQL target writer using mysql_async.
pub struct MysqlWriter {
    pool: Pool,
}

impl MysqlWriter {
    /// Create a new writer and verify the target is reachable within
    /// `connect_timeout_secs`.
    pub async fn new(config: &TargetConfig) -> Result<Self> {
        let ssl_opts = match config.ssl_mode.to_lowercase().as_str() {
            "disable" => {
                warn!("MySQL TLS is disabled. Credentials will be transmitted in plaintext.");
                None
            }
            "prefer" | "require" => {
                Some(SslOpts::default().with_danger_accept_invalid_certs(true))
            }
            "verify-ca" | "verify_ca" | "verify-full" | "verify_identity" => {
                Some(SslOpts::default())
            }
            _ => {
                warn!(
                    "Unknown ssl_mode '{}', defaulting to prefer",
                    config.ssl_mode
                );
                Some(SslOpts::default().with_danger_accept_invalid_certs(true))
            }
        };

        let mut builder = OptsBuilder::default()
            .ip_or_hostname(&config.host)
            .tcp_port(config.port)
            .db_name(Some(&config.database))
            .user(Some(&config.user))
            .pass(Some(&config.password))
            // Use utf8mb4 for full Unicode support
            .init(vec!["SET NAMES utf8mb4"]);

        if let Some(ssl) = ssl_opts {
            builder = builder.ssl_opts(ssl);
        }

        let constraints = PoolConstraints::new(1, POOL_MAX_CONNS).ok_or_else(|| {
            MigrateError::Config("invalid MySQL pool constraints".to_string())
        })?;
        let opts: Opts = builder
            .pool_opts(PoolOpts::new().with_constraints(constraints))
            .into();
        let pool = Pool::new(opts);

        let wait = Duration::from_secs(config.connect_timeout_secs);
        let probe = async {
            let mut conn = pool.get_conn().await?;
            conn.query_drop("SELECT 1").await
        };
        match tokio::time::timeout(wait, probe).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(MigrateError::Connectivity {
                    endpoint: config.endpoint(),
                    message: e.to_string(),
                })
            }
            Err(_) => {
                return Err(MigrateError::Connectivity {
                    endpoint: config.endpoint(),
                    message: format!("timed out after {}s", config.connect_timeout_secs),
                })
            }
        }

        info!("Connected to MySQL target: {}", config.endpoint());
        Ok(Self { pool })
    }

    async fn conn(&self) -> Result<Conn> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| MigrateError::pool(e, "getting MySQL connection"))
    }

    /// Run a maintenance statement (`ANALYZE`/`OPTIMIZE TABLE`) and fail if
    /// any returned status row reports an error.
    async fn maintenance(&self, statement: &str, table: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let sql = format!("{} {}", statement, quote_mysql(table)?);
        let rows: Vec<mysql_async::Row> = conn.query(&sql).await?;

        for row in rows {
            let kind = text_cell(&row, 2).unwrap_or_default();
            let message = text_cell(&row, 3).unwrap_or_default();
            if kind.eq_ignore_ascii_case("error") {
                return Err(MigrateError::structure(
                    table,
                    format!("{}: {}", statement, message),
                ));
            }
            debug!(table = %table, "{}: {} {}", statement, kind, message);
        }
        Ok(())
    }
}

#[async_trait]
impl TargetWriter for MysqlWriter {
    async fn drop_table(&self, table: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let sql = format!("DROP TABLE IF EXISTS {}", quote_mysql(table)?);
        conn.query_drop(&sql)
            .await
            .map_err(|e| MigrateError::structure(table, format!("DROP TABLE: {}", e)))?;

        debug!("Dropped table {}", table);
        Ok(())
    }

    async fn create_table(&self, definition: &TableDefinition) -> Result<()> {
        let ddl = definition.create_statement()?;
        let mut conn = self.conn().await?;
        conn.query_drop(&ddl).await.map_err(|e| {
            MigrateError::structure(&definition.name, format!("CREATE TABLE: {}", e))
        })?;

        debug!("Created table {}", definition.name);
        Ok(())
    }

    async fn column_count(&self, table: &str) -> Result<usize> {
        let mut conn = self.conn().await?;
        let sql = format!("DESCRIBE {}", quote_mysql(table)?);
        let rows: Vec<mysql_async::Row> = conn.query(&sql).await?;

        for row in &rows {
            debug!(
                table = %table,
                "  {} {}",
                text_cell(row, 0).unwrap_or_default(),
                text_cell(row, 1).unwrap_or_default()
            );
        }
        Ok(rows.len())
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        let tables: Vec<String> = conn.query("SHOW TABLES").await?;
        Ok(tables)
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let mut conn = self.conn().await?;
        let sql = format!("SELECT COUNT(*) FROM {}", quote_mysql(table)?);
        let count: Option<i64> = conn.query_first(&sql).await?;
        Ok(count.unwrap_or(0))
    }

    async fn sample_row_count(&self, table: &str, size: usize) -> Result<usize> {
        let mut conn = self.conn().await?;
        let sql = format!(
            "SELECT COUNT(*) FROM (SELECT 1 FROM {} LIMIT {}) AS sample",
            quote_mysql(table)?,
            size
        );
        let count: Option<i64> = conn.query_first(&sql).await?;
        Ok(count.unwrap_or(0).max(0) as usize)
    }

    async fn column_extremes(&self, table: &str, column: &str) -> Result<Extremes> {
        let mut conn = self.conn().await?;
        let col = quote_mysql(column)?;
        let sql = format!(
            "SELECT MIN({col}), MAX({col}) FROM {} WHERE {col} IS NOT NULL",
            quote_mysql(table)?,
            col = col
        );

        let Some(mut row) = conn.query_first::<mysql_async::Row, _>(&sql).await? else {
            return Ok(Extremes {
                min: SqlValue::Null,
                max: SqlValue::Null,
            });
        };

        let min = row.take::<Value, _>(0).map(mysql_to_sql_value).unwrap_or(SqlValue::Null);
        let max = row.take::<Value, _>(1).map(mysql_to_sql_value).unwrap_or(SqlValue::Null);
        Ok(Extremes { min, max })
    }

    async fn analyze_table(&self, table: &str) -> Result<()> {
        self.maintenance("ANALYZE TABLE", table).await
    }

    async fn optimize_table(&self, table: &str) -> Result<()> {
        self.maintenance("OPTIMIZE TABLE", table).await
    }

    async fn drop_tables_unchecked(&self, tables: &[String]) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        let existing: Vec<String> = conn.query("SHOW TABLES").await?;

        conn.query_drop("SET FOREIGN_KEY_CHECKS = 0").await?;

        let mut dropped = Vec::new();
        let mut outcome = Ok(());
        for wanted in tables {
            let Some(actual) = existing.iter().find(|t| t.eq_ignore_ascii_case(wanted)) else {
                debug!("Table {} not present on target, nothing to drop", wanted);
                continue;
            };
            let sql = match quote_mysql(actual) {
                Ok(quoted) => format!("DROP TABLE IF EXISTS {}", quoted),
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            };
            if let Err(e) = conn.query_drop(&sql).await {
                outcome = Err(MigrateError::structure(actual, format!("DROP TABLE: {}", e)));
                break;
            }
            info!("Dropped table {}", actual);
            dropped.push(actual.clone());
        }

        // Re-enable even when a drop failed; the setting is per connection and
        // the connection goes back to the pool.
        conn.query_drop("SET FOREIGN_KEY_CHECKS = 1").await?;
        outcome.map(|()| dropped)
    }

    async fn begin_session(
        &self,
        table: &str,
        columns: &[String],
    ) -> Result<Box<dyn TargetSession>> {
        let mut conn = self.conn().await?;
        conn.query_drop("SET autocommit = 0").await?;

        let column_list = columns
            .iter()
            .map(|c| quote_mysql(c))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let insert_prefix = format!(
            "INSERT INTO {} ({}) VALUES ",
            quote_mysql(table)?,
            column_list
        );

        Ok(Box::new(MysqlSession {
            conn,
            table: table.to_string(),
            insert_prefix,
            column_count: columns.len(),
        }))
    }

    fn db_type(&self) -> &str {
        "mysql"
    }

    async fn close(&self) {
        if let Err(e) = self.pool.clone().disconnect().await {
            warn!("Error closing MySQL pool: {}", e);
        }
    }
}

/// One target connection in manual-commit mode.
///
/// Returning the connection to the pool resets it, which discards anything
/// left uncommitted.
pub struct MysqlSession {
    conn: Conn,
    table: String,
    insert_prefix: String,
    column_count: usize,
}

impl MysqlSession {
    fn placeholders(&self, rows: usize) -> String {
        let row = format!("({})", vec!["?"; self.column_count].join(", "));
        vec![row; rows].join(", ")
    }
}

#[async_trait]
impl TargetSession for MysqlSession {
    async fn insert_row(&mut self, row: &Row) -> Result<()> {
        self.insert_rows(std::slice::from_ref(row)).await
    }

    async fn insert_rows(&mut self, rows: &[Row]) -> Result<()> {
        if rows.is_empty() || self.column_count == 0 {
            return Ok(());
        }

        let max_rows = (MYSQL_MAX_PLACEHOLDERS / self.column_count).max(1);
        for chunk in rows.chunks(max_rows) {
            let sql = format!("{}{}", self.insert_prefix, self.placeholders(chunk.len()));
            let params: Vec<Value> = chunk
                .iter()
                .flat_map(|row| row.iter().map(sql_value_to_mysql))
                .collect();

            self.conn
                .exec_drop(&sql, params)
                .await
                .map_err(|e| MigrateError::from_insert(&self.table, e))?;
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.conn.query_drop("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.conn.query_drop("ROLLBACK").await?;
        Ok(())
    }
}

/// Bind value for a normalized cell. Timestamps go over as text so the
/// server parses them in the column's own precision.
fn sql_value_to_mysql(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::NULL,
        SqlValue::Integer(i) => Value::from(*i),
        SqlValue::Float(f) => Value::from(*f),
        SqlValue::Boolean(b) => Value::from(*b),
        SqlValue::Text(s) => Value::from(s.as_str()),
        SqlValue::Timestamp(ts) => Value::from(SqlValue::timestamp_string(ts)),
    }
}

/// Read back a server value for comparison with the source.
fn mysql_to_sql_value(value: Value) -> SqlValue {
    match value {
        Value::NULL => SqlValue::Null,
        Value::Int(i) => SqlValue::Integer(i),
        Value::UInt(u) => match i64::try_from(u) {
            Ok(i) => SqlValue::Integer(i),
            Err(_) => SqlValue::Text(u.to_string()),
        },
        Value::Float(f) => SqlValue::Float(f as f64),
        Value::Double(d) => SqlValue::Float(d),
        Value::Bytes(b) => SqlValue::Text(String::from_utf8_lossy(&b).into_owned()),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
                .and_then(|d| {
                    d.and_hms_micro_opt(hour as u32, minute as u32, second as u32, micros)
                })
                .map(SqlValue::Timestamp)
                .unwrap_or(SqlValue::Null)
        }
        Value::Time(negative, days, hours, minutes, seconds, _) => SqlValue::Text(format!(
            "{}{:02}:{:02}:{:02}",
            if negative { "-" } else { "" },
            days * 24 + hours as u32,
            minutes,
            seconds
        )),
    }
}

/// A status or describe cell as text.
fn text_cell(row: &mysql_async::Row, index: usize) -> Option<String> {
    match row.as_ref(index)? {
        Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
        Value::NULL => None,
        other => Some(format!("{:?}", other)),
    }
}
