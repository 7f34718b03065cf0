use super::non_empty;
use crate::config::ConnectorTimeouts;
use crate::connector::RelationalConnector;
use crate::descriptor::RelationalSettings;
use crate::error::{with_timeout, ConnectorError, Result};
use crate::kind::ResourceKind;
use crate::types::{FieldSummary, SchemaSummary, TableSummary};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::Row;
use tracing::{debug, info};

// information_schema columns are cast so they decode as plain strings and
// signed integers regardless of server collation and version.
const LIST_SCHEMAS_SQL: &str = r#"
    SELECT
        CAST(s.SCHEMA_NAME AS CHAR) AS name,
        CAST(COUNT(t.TABLE_NAME) AS SIGNED) AS table_count,
        CAST(COALESCE(SUM(t.DATA_LENGTH + t.INDEX_LENGTH), 0) AS SIGNED) AS size_bytes,
        CAST(s.DEFAULT_CHARACTER_SET_NAME AS CHAR) AS charset,
        CAST(s.DEFAULT_COLLATION_NAME AS CHAR) AS collation_name
    FROM information_schema.SCHEMATA s
    LEFT JOIN information_schema.TABLES t ON t.TABLE_SCHEMA = s.SCHEMA_NAME
    WHERE s.SCHEMA_NAME NOT IN ('information_schema', 'mysql', 'performance_schema', 'sys')
    GROUP BY s.SCHEMA_NAME, s.DEFAULT_CHARACTER_SET_NAME, s.DEFAULT_COLLATION_NAME
    ORDER BY s.SCHEMA_NAME
"#;

const SCAN_TABLES_SQL: &str = r#"
    SELECT
        CAST(TABLE_NAME AS CHAR) AS name,
        CAST(TABLE_TYPE AS CHAR) AS table_type,
        CAST(TABLE_COMMENT AS CHAR) AS comment,
        CAST(COALESCE(TABLE_ROWS, 0) AS SIGNED) AS row_estimate,
        CAST(COALESCE(DATA_LENGTH, 0) + COALESCE(INDEX_LENGTH, 0) AS SIGNED) AS size_bytes
    FROM information_schema.TABLES
    WHERE TABLE_SCHEMA = ?
    ORDER BY TABLE_NAME
"#;

const SCAN_FIELDS_SQL: &str = r#"
    SELECT
        CAST(COLUMN_NAME AS CHAR) AS name,
        CAST(ORDINAL_POSITION AS SIGNED) AS ordinal,
        CAST(COLUMN_TYPE AS CHAR) AS data_type,
        CAST(IF(IS_NULLABLE = 'YES', 1, 0) AS SIGNED) AS nullable,
        CAST(COLUMN_DEFAULT AS CHAR) AS default_value,
        CAST(COLUMN_COMMENT AS CHAR) AS comment,
        CAST(IF(COLUMN_KEY = 'PRI', 1, 0) AS SIGNED) AS is_primary_key,
        CAST(IF(COLUMN_KEY = 'UNI', 1, 0) AS SIGNED) AS is_unique_key,
        CAST(CHARACTER_SET_NAME AS CHAR) AS charset,
        CAST(COLLATION_NAME AS CHAR) AS collation_name,
        CAST(NUMERIC_PRECISION AS SIGNED) AS num_precision,
        CAST(NUMERIC_SCALE AS SIGNED) AS num_scale
    FROM information_schema.COLUMNS
    WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
    ORDER BY ORDINAL_POSITION
"#;

pub struct MySqlConnector {
    pool: MySqlPool,
    timeouts: ConnectorTimeouts,
}

impl MySqlConnector {
    pub async fn connect(settings: &RelationalSettings, timeouts: ConnectorTimeouts) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .username(&settings.username)
            .password(&settings.password)
            .database(&settings.database);

        let pool = with_timeout("mysql connect", timeouts.connect, async {
            MySqlPoolOptions::new()
                .max_connections(2)
                .acquire_timeout(timeouts.connect)
                .connect_with(options)
                .await
                .map_err(|e| ConnectorError::connection(format!("mysql {}:{}: {}", settings.host, settings.port, e)))
        })
        .await?;

        info!(host = %settings.host, database = %settings.database, "Connected to mysql");
        Ok(Self::from_pool(pool, timeouts))
    }

    pub fn from_pool(pool: MySqlPool, timeouts: ConnectorTimeouts) -> Self {
        Self { pool, timeouts }
    }
}

#[async_trait]
impl RelationalConnector for MySqlConnector {
    fn kind(&self) -> ResourceKind {
        ResourceKind::MySql
    }

    async fn list_schemas(&self) -> Result<Vec<SchemaSummary>> {
        let rows = with_timeout("list schemas", self.timeouts.metadata_query, async {
            sqlx::query(LIST_SCHEMAS_SQL)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| ConnectorError::from_sqlx("schemas", e))
        })
        .await?;

        rows.iter()
            .map(|row| {
                Ok(SchemaSummary {
                    name: row.try_get("name").map_err(|e| ConnectorError::from_sqlx("schemas", e))?,
                    table_count: row.try_get("table_count").ok(),
                    size_bytes: row.try_get("size_bytes").ok(),
                    charset: row.try_get::<Option<_>, _>("charset").ok().flatten(),
                    collation: row.try_get::<Option<_>, _>("collation_name").ok().flatten(),
                })
            })
            .collect()
    }

    async fn scan_tables(&self, schema: &str) -> Result<Vec<TableSummary>> {
        let rows = with_timeout("scan tables", self.timeouts.metadata_query, async {
            sqlx::query(SCAN_TABLES_SQL)
                .bind(schema)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| ConnectorError::from_sqlx(schema, e))
        })
        .await?;

        debug!(schema, tables = rows.len(), "Scanned mysql tables");

        rows.iter()
            .map(|row| {
                Ok(TableSummary {
                    name: row.try_get("name").map_err(|e| ConnectorError::from_sqlx(schema, e))?,
                    kind: row.try_get("table_type").unwrap_or_else(|_| "BASE TABLE".to_string()),
                    comment: non_empty(row.try_get::<Option<_>, _>("comment").ok().flatten()),
                    row_count_estimate: row.try_get("row_estimate").ok(),
                    size_bytes: row.try_get("size_bytes").ok(),
                })
            })
            .collect()
    }

    async fn scan_fields(&self, schema: &str, table: &str) -> Result<Vec<FieldSummary>> {
        let target = format!("{}.{}", schema, table);
        let rows = with_timeout("scan fields", self.timeouts.metadata_query, async {
            sqlx::query(SCAN_FIELDS_SQL)
                .bind(schema)
                .bind(table)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| ConnectorError::from_sqlx(&target, e))
        })
        .await?;

        rows.iter()
            .map(|row| {
                let flag = |col: &str| row.try_get::<i64, _>(col).map(|v| v != 0).unwrap_or(false);
                Ok(FieldSummary {
                    name: row.try_get("name").map_err(|e| ConnectorError::from_sqlx(&target, e))?,
                    ordinal: row.try_get::<i64, _>("ordinal").unwrap_or_default() as i32,
                    data_type: row.try_get("data_type").unwrap_or_default(),
                    nullable: flag("nullable"),
                    default: row.try_get::<Option<_>, _>("default_value").ok().flatten(),
                    comment: non_empty(row.try_get::<Option<_>, _>("comment").ok().flatten()),
                    is_primary_key: flag("is_primary_key"),
                    is_unique_key: flag("is_unique_key"),
                    charset: row.try_get::<Option<_>, _>("charset").ok().flatten(),
                    collation: row.try_get::<Option<_>, _>("collation_name").ok().flatten(),
                    precision: row.try_get::<Option<_>, _>("num_precision").ok().flatten(),
                    scale: row.try_get::<Option<_>, _>("num_scale").ok().flatten(),
                })
            })
            .collect()
    }

    async fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close().await;
        }
    }
}
