//! MSSQL source reader.
//!
//! Implements [`SourceReader`] with Tiberius over a bb8 pool. Every query
//! that embeds an identifier quotes it through [`crate::core::identifier`];
//! values are always bound as parameters.

mod convert;

pub use convert::{normalize, normalize_row, probe_type_name};

use std::time::Duration;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use tiberius::{AuthMethod as TiberiusAuthMethod, Client, Config, EncryptionLevel, Query, Row};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};

use crate::config::{SourceAuth, SourceConfig};
use crate::core::identifier::{qualify_mssql, quote_mssql};
use crate::core::schema::{Column, ForeignKey, Table};
use crate::core::traits::SourceReader;
use crate::core::value::{Extremes, Page, SqlValue};
use crate::error::{MigrateError, Result};
use crate::introspect::{ColumnStrategy, KeyStrategy};

/// Tables are processed one at a time, so a handful of connections covers the
/// page reader plus validation queries.
const POOL_MAX_SIZE: u32 = 4;

/// Idle connection timeout (5 minutes).
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Maximum connection lifetime (30 minutes).
const POOL_MAX_LIFETIME: Duration = Duration::from_secs(1800);

/// TCP keepalive interval (30 seconds).
const TCP_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

const COLUMNS_INFORMATION_SCHEMA: &str = r#"
    SELECT
        COLUMN_NAME,
        DATA_TYPE,
        CAST(CHARACTER_MAXIMUM_LENGTH AS INT),
        CAST(NUMERIC_PRECISION AS INT),
        CAST(NUMERIC_SCALE AS INT),
        CASE WHEN IS_NULLABLE = 'YES' THEN 1 ELSE 0 END,
        COLUMN_DEFAULT
    FROM INFORMATION_SCHEMA.COLUMNS
    WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2
    ORDER BY ORDINAL_POSITION
"#;

// sys.columns reports byte lengths; the n-types store two bytes per character.
const COLUMNS_SYSTEM_CATALOG: &str = r#"
    SELECT
        c.name,
        t.name,
        CAST(CASE
            WHEN t.name IN ('nvarchar', 'nchar') AND c.max_length > 0 THEN c.max_length / 2
            WHEN t.name IN ('varchar', 'char', 'nvarchar', 'nchar') THEN c.max_length
        END AS INT),
        CAST(CASE WHEN t.name IN ('decimal', 'numeric', 'float', 'real') THEN c.precision END AS INT),
        CAST(CASE WHEN t.name IN ('decimal', 'numeric') THEN c.scale END AS INT),
        CAST(c.is_nullable AS INT),
        d.definition
    FROM sys.columns c
    JOIN sys.types t ON c.user_type_id = t.user_type_id
    JOIN sys.tables tb ON c.object_id = tb.object_id
    JOIN sys.schemas s ON tb.schema_id = s.schema_id
    LEFT JOIN sys.default_constraints d ON c.default_object_id = d.object_id
    WHERE s.name = @P1 AND tb.name = @P2
    ORDER BY c.column_id
"#;

const PK_KEY_COLUMN_USAGE: &str = r#"
    SELECT c.COLUMN_NAME
    FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
    JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE c
        ON c.CONSTRAINT_NAME = tc.CONSTRAINT_NAME
        AND c.TABLE_SCHEMA = tc.TABLE_SCHEMA
        AND c.TABLE_NAME = tc.TABLE_NAME
    WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
      AND tc.TABLE_SCHEMA = @P1
      AND tc.TABLE_NAME = @P2
    ORDER BY c.ORDINAL_POSITION
"#;

const PK_SYSTEM_CATALOG: &str = r#"
    SELECT c.name
    FROM sys.key_constraints k
    JOIN sys.index_columns ic
        ON k.parent_object_id = ic.object_id AND k.unique_index_id = ic.index_id
    JOIN sys.columns c
        ON ic.object_id = c.object_id AND ic.column_id = c.column_id
    JOIN sys.tables t ON k.parent_object_id = t.object_id
    JOIN sys.schemas s ON t.schema_id = s.schema_id
    WHERE k.type = 'PK' AND s.name = @P1 AND t.name = @P2
    ORDER BY ic.key_ordinal
"#;

const FOREIGN_KEYS: &str = r#"
    SELECT
        KCU1.COLUMN_NAME,
        KCU2.TABLE_NAME,
        KCU2.COLUMN_NAME
    FROM INFORMATION_SCHEMA.REFERENTIAL_CONSTRAINTS RC
    JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE KCU1
        ON RC.CONSTRAINT_SCHEMA = KCU1.CONSTRAINT_SCHEMA
        AND RC.CONSTRAINT_NAME = KCU1.CONSTRAINT_NAME
    JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE KCU2
        ON RC.UNIQUE_CONSTRAINT_SCHEMA = KCU2.CONSTRAINT_SCHEMA
        AND RC.UNIQUE_CONSTRAINT_NAME = KCU2.CONSTRAINT_NAME
        AND KCU1.ORDINAL_POSITION = KCU2.ORDINAL_POSITION
    WHERE KCU1.TABLE_SCHEMA = @P1 AND KCU1.TABLE_NAME = @P2
    ORDER BY RC.CONSTRAINT_NAME, KCU1.ORDINAL_POSITION
"#;

/// Connection manager for bb8 pool with Tiberius.
#[derive(Clone)]
struct TiberiusConnectionManager {
    config: SourceConfig,
    auth: SourceAuth,
}

impl TiberiusConnectionManager {
    fn new(config: SourceConfig, auth: SourceAuth) -> Self {
        Self { config, auth }
    }

    fn build_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.port);
        config.database(&self.config.database);

        match self.auth {
            #[cfg(feature = "integrated-auth")]
            SourceAuth::Integrated => {
                config.authentication(TiberiusAuthMethod::Integrated);
            }
            _ => {
                config.authentication(TiberiusAuthMethod::sql_server(
                    &self.config.user,
                    &self.config.password,
                ));
            }
        }

        if self.config.encrypt {
            if self.config.trust_server_cert {
                config.trust_cert();
            }
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }

        config
    }
}

#[async_trait]
impl bb8::ManageConnection for TiberiusConnectionManager {
    type Connection = Client<Compat<TcpStream>>;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let config = self.build_config();
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| tiberius::error::Error::Io {
                kind: e.kind(),
                message: e.to_string(),
            })?;
        tcp.set_nodelay(true).ok();

        let socket = socket2::SockRef::from(&tcp);
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(TCP_KEEPALIVE_INTERVAL)
            .with_interval(TCP_KEEPALIVE_INTERVAL);
        if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
            warn!("Failed to set TCP keepalive on MSSQL connection: {}", e);
        }

        Client::connect(config, tcp.compat_write()).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// MSSQL source reader.
pub struct MssqlReader {
    pool: Pool<TiberiusConnectionManager>,
}

impl MssqlReader {
    /// Connect to the source, trying each configured authentication method in
    /// order. Each attempt is bounded by `connect_timeout_secs`.
    pub async fn new(config: SourceConfig) -> Result<Self> {
        let attempts = config.auth_attempts();
        if attempts.is_empty() {
            return Err(MigrateError::Config(
                "source: no authentication method configured (set user/password or integrated_auth)"
                    .to_string(),
            ));
        }

        let wait = Duration::from_secs(config.connect_timeout_secs);
        let mut failures = Vec::with_capacity(attempts.len());

        for auth in attempts {
            match tokio::time::timeout(wait, Self::open_pool(&config, auth)).await {
                Ok(Ok(pool)) => {
                    info!(
                        "Connected to MSSQL: {} ({:?} auth, pool_size={})",
                        config.endpoint(),
                        auth,
                        POOL_MAX_SIZE
                    );
                    return Ok(Self { pool });
                }
                Ok(Err(e)) => {
                    warn!("MSSQL {:?} auth failed: {}", auth, e);
                    failures.push(format!("{:?}: {}", auth, e));
                }
                Err(_) => {
                    warn!(
                        "MSSQL {:?} auth timed out after {}s",
                        auth, config.connect_timeout_secs
                    );
                    failures.push(format!(
                        "{:?}: timed out after {}s",
                        auth, config.connect_timeout_secs
                    ));
                }
            }
        }

        Err(MigrateError::Connectivity {
            endpoint: config.endpoint(),
            message: failures.join("; "),
        })
    }

    async fn open_pool(
        config: &SourceConfig,
        auth: SourceAuth,
    ) -> Result<Pool<TiberiusConnectionManager>> {
        let manager = TiberiusConnectionManager::new(config.clone(), auth);
        let pool = Pool::builder()
            .max_size(POOL_MAX_SIZE)
            .min_idle(Some(1))
            .connection_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Some(POOL_IDLE_TIMEOUT))
            .max_lifetime(Some(POOL_MAX_LIFETIME))
            .test_on_check_out(true)
            .build(manager)
            .await
            .map_err(|e| MigrateError::pool(e, "creating MSSQL connection pool"))?;

        {
            let mut conn = pool
                .get()
                .await
                .map_err(|e| MigrateError::pool(e, "testing MSSQL connection"))?;
            conn.simple_query("SELECT 1").await?.into_row().await?;
        }

        Ok(pool)
    }

    async fn get_client(&self) -> Result<PooledConnection<'_, TiberiusConnectionManager>> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "getting MSSQL connection from pool"))
    }

    /// Run a parameterized query bound to `(schema, table)` and return all rows.
    async fn query_for_table(&self, sql: &str, schema: &str, table: &str) -> Result<Vec<Row>> {
        let mut client = self.get_client().await?;
        let mut query = Query::new(sql);
        query.bind(schema);
        query.bind(table);
        let stream = query.query(&mut *client).await?;
        Ok(stream.into_first_result().await?)
    }

    async fn columns_from_catalog(&self, sql: &str, schema: &str, table: &str) -> Result<Vec<Column>> {
        let rows = self.query_for_table(sql, schema, table).await?;
        rows.iter().map(column_from_row).collect()
    }

    /// Derive columns from the result-set metadata of a one-row query.
    async fn columns_from_probe(&self, schema: &str, table: &str) -> Result<Vec<Column>> {
        let sql = format!("SELECT TOP 1 * FROM {}", qualify_mssql(schema, table)?);
        let mut client = self.get_client().await?;
        let mut stream = client.simple_query(sql).await?;

        let columns: Option<Vec<Column>> = stream.columns().await?.map(|cols| {
            cols.iter()
                .map(|c| Column {
                    name: c.name().to_string(),
                    data_type: probe_type_name(c.column_type()).to_string(),
                    max_length: None,
                    precision: None,
                    scale: None,
                    // Result metadata carries no nullability.
                    is_nullable: true,
                    default_expr: None,
                })
                .collect()
        });

        // Drain so the connection goes back to the pool clean.
        stream.into_results().await?;
        columns.ok_or_else(|| {
            MigrateError::SchemaExtraction(format!(
                "probe query on {}.{} returned no result metadata",
                schema, table
            ))
        })
    }

    /// Run a query with no parameters and return its first row.
    async fn query_one(&self, sql: String) -> Result<Option<Row>> {
        let mut client = self.get_client().await?;
        let stream = client.simple_query(sql).await?;
        Ok(stream.into_row().await?)
    }
}

fn column_from_row(row: &Row) -> Result<Column> {
    Ok(Column {
        name: row.try_get::<&str, _>(0)?.unwrap_or_default().to_string(),
        data_type: row.try_get::<&str, _>(1)?.unwrap_or_default().to_string(),
        max_length: row.try_get::<i32, _>(2)?,
        precision: row.try_get::<i32, _>(3)?,
        scale: row.try_get::<i32, _>(4)?,
        is_nullable: row.try_get::<i32, _>(5)?.unwrap_or(1) == 1,
        default_expr: row.try_get::<&str, _>(6)?.map(str::to_string),
    })
}

#[async_trait]
impl SourceReader for MssqlReader {
    async fn list_tables(&self, schema: &str) -> Result<Vec<String>> {
        let mut client = self.get_client().await?;
        let mut query = Query::new(
            r#"
            SELECT TABLE_NAME
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_TYPE = 'BASE TABLE' AND TABLE_SCHEMA = @P1
            ORDER BY TABLE_NAME
        "#,
        );
        query.bind(schema);
        let rows = query.query(&mut *client).await?.into_first_result().await?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(name) = row.try_get::<&str, _>(0)? {
                tables.push(name.to_string());
            }
        }
        debug!("Found {} tables in schema {}", tables.len(), schema);
        Ok(tables)
    }

    async fn table_exists(&self, schema: &str, table: &str) -> Result<bool> {
        let rows = self
            .query_for_table(
                r#"
                SELECT COUNT(*)
                FROM INFORMATION_SCHEMA.TABLES
                WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2
            "#,
                schema,
                table,
            )
            .await?;
        let count = match rows.first() {
            Some(row) => row.try_get::<i32, _>(0)?.unwrap_or(0),
            None => 0,
        };
        Ok(count > 0)
    }

    async fn load_columns(
        &self,
        strategy: ColumnStrategy,
        schema: &str,
        table: &str,
    ) -> Result<Vec<Column>> {
        match strategy {
            ColumnStrategy::InformationSchema => {
                self.columns_from_catalog(COLUMNS_INFORMATION_SCHEMA, schema, table)
                    .await
            }
            ColumnStrategy::SystemCatalog => {
                self.columns_from_catalog(COLUMNS_SYSTEM_CATALOG, schema, table)
                    .await
            }
            ColumnStrategy::ProbeQuery => self.columns_from_probe(schema, table).await,
        }
    }

    async fn load_primary_key(
        &self,
        strategy: KeyStrategy,
        schema: &str,
        table: &str,
    ) -> Result<Vec<String>> {
        let sql = match strategy {
            KeyStrategy::KeyColumnUsage => PK_KEY_COLUMN_USAGE,
            KeyStrategy::SystemCatalog => PK_SYSTEM_CATALOG,
        };
        let rows = self.query_for_table(sql, schema, table).await?;

        let mut key = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(name) = row.try_get::<&str, _>(0)? {
                key.push(name.to_string());
            }
        }
        Ok(key)
    }

    async fn load_foreign_keys(&self, schema: &str, table: &str) -> Result<Vec<ForeignKey>> {
        let rows = self.query_for_table(FOREIGN_KEYS, schema, table).await?;

        let mut fks = Vec::with_capacity(rows.len());
        for row in &rows {
            fks.push(ForeignKey {
                column: row.try_get::<&str, _>(0)?.unwrap_or_default().to_string(),
                ref_table: row.try_get::<&str, _>(1)?.unwrap_or_default().to_string(),
                ref_column: row.try_get::<&str, _>(2)?.unwrap_or_default().to_string(),
            });
        }
        Ok(fks)
    }

    async fn row_count(&self, schema: &str, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT_BIG(*) FROM {}", qualify_mssql(schema, table)?);
        let count = match self.query_one(sql).await? {
            Some(row) => row.try_get::<i64, _>(0)?.unwrap_or(0),
            None => 0,
        };
        Ok(count)
    }

    async fn fetch_page(
        &self,
        table: &Table,
        order_by: &[String],
        offset: u64,
        limit: usize,
    ) -> Result<Page> {
        let columns = table
            .columns
            .iter()
            .map(|c| quote_mssql(&c.name))
            .collect::<Result<Vec<_>>>()?
            .join(", ");

        let order = if order_by.is_empty() {
            "(SELECT NULL)".to_string()
        } else {
            order_by
                .iter()
                .map(|c| quote_mssql(c))
                .collect::<Result<Vec<_>>>()?
                .join(", ")
        };

        let sql = format!(
            "SELECT {} FROM {} ORDER BY {} OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
            columns,
            qualify_mssql(&table.schema, &table.name)?,
            order,
            offset,
            limit
        );

        let mut client = self.get_client().await?;
        let rows = client.simple_query(sql).await?.into_first_result().await?;

        let rows = rows
            .into_iter()
            .map(normalize_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::new(rows))
    }

    async fn sample_row_count(&self, schema: &str, table: &str, size: usize) -> Result<usize> {
        let sql = format!(
            "SELECT COUNT(*) FROM (SELECT TOP ({}) 1 AS x FROM {} ORDER BY NEWID()) AS sample",
            size,
            qualify_mssql(schema, table)?
        );
        let count = match self.query_one(sql).await? {
            Some(row) => row.try_get::<i32, _>(0)?.unwrap_or(0),
            None => 0,
        };
        Ok(count.max(0) as usize)
    }

    async fn column_extremes(
        &self,
        schema: &str,
        table: &str,
        column: &str,
    ) -> Result<Extremes> {
        let col = quote_mssql(column)?;
        let sql = format!(
            "SELECT MIN({col}), MAX({col}) FROM {} WHERE {col} IS NOT NULL",
            qualify_mssql(schema, table)?,
            col = col
        );

        let Some(row) = self.query_one(sql).await? else {
            return Ok(Extremes {
                min: SqlValue::Null,
                max: SqlValue::Null,
            });
        };

        let mut cells = row.into_iter();
        let min = cells.next().map(normalize).transpose()?.unwrap_or(SqlValue::Null);
        let max = cells.next().map(normalize).transpose()?.unwrap_or(SqlValue::Null);
        Ok(Extremes { min, max })
    }

    fn db_type(&self) -> &str {
        "mssql"
    }

    async fn close(&self) {
        // bb8 pools close when dropped
    }
}
