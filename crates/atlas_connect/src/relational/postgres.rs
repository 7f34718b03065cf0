use super::non_empty;
use crate::config::ConnectorTimeouts;
use crate::connector::RelationalConnector;
use crate::descriptor::RelationalSettings;
use crate::error::{with_timeout, ConnectorError, Result};
use crate::kind::ResourceKind;
use crate::types::{FieldSummary, SchemaSummary, TableSummary};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

const LIST_SCHEMAS_SQL: &str = r#"
    SELECT
        s.schema_name::text AS name,
        (SELECT COUNT(*) FROM information_schema.tables t
          WHERE t.table_schema = s.schema_name)::bigint AS table_count,
        COALESCE((SELECT SUM(pg_total_relation_size(c.oid)) FROM pg_class c
                   JOIN pg_namespace n ON n.oid = c.relnamespace
                  WHERE n.nspname = s.schema_name AND c.relkind IN ('r', 'p', 'm')), 0)::bigint AS size_bytes
    FROM information_schema.schemata s
    WHERE s.schema_name NOT IN ('pg_catalog', 'information_schema', 'pg_toast')
      AND s.schema_name NOT LIKE 'pg_temp_%'
      AND s.schema_name NOT LIKE 'pg_toast_temp_%'
    ORDER BY s.schema_name
"#;

const SCAN_TABLES_SQL: &str = r#"
    SELECT
        t.table_name::text AS name,
        t.table_type::text AS table_type,
        obj_description(c.oid, 'pg_class') AS comment,
        GREATEST(COALESCE(c.reltuples, 0), 0)::bigint AS row_estimate,
        COALESCE(pg_total_relation_size(c.oid), 0)::bigint AS size_bytes
    FROM information_schema.tables t
    LEFT JOIN pg_namespace n ON n.nspname = t.table_schema
    LEFT JOIN pg_class c ON c.relname = t.table_name AND c.relnamespace = n.oid
    WHERE t.table_schema = $1
    ORDER BY t.table_name
"#;

const SCAN_FIELDS_SQL: &str = r#"
    SELECT
        c.column_name::text AS name,
        c.ordinal_position::int4 AS ordinal,
        c.udt_name::text AS data_type,
        (c.is_nullable = 'YES') AS nullable,
        c.column_default::text AS default_value,
        col_description(pc.oid, c.ordinal_position::int4) AS comment,
        EXISTS (
            SELECT 1 FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON tc.constraint_name = kcu.constraint_name
             AND tc.table_schema = kcu.table_schema
             AND tc.table_name = kcu.table_name
            WHERE tc.constraint_type = 'PRIMARY KEY'
              AND tc.table_schema = c.table_schema
              AND tc.table_name = c.table_name
              AND kcu.column_name = c.column_name
        ) AS is_primary_key,
        EXISTS (
            SELECT 1 FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON tc.constraint_name = kcu.constraint_name
             AND tc.table_schema = kcu.table_schema
             AND tc.table_name = kcu.table_name
            WHERE tc.constraint_type = 'UNIQUE'
              AND tc.table_schema = c.table_schema
              AND tc.table_name = c.table_name
              AND kcu.column_name = c.column_name
        ) AS is_unique_key,
        c.character_set_name::text AS charset,
        c.collation_name::text AS collation_name,
        c.numeric_precision::int8 AS num_precision,
        c.numeric_scale::int8 AS num_scale
    FROM information_schema.columns c
    LEFT JOIN pg_namespace pn ON pn.nspname = c.table_schema
    LEFT JOIN pg_class pc ON pc.relname = c.table_name AND pc.relnamespace = pn.oid
    WHERE c.table_schema = $1 AND c.table_name = $2
    ORDER BY c.ordinal_position
"#;

pub struct PostgresConnector {
    pool: PgPool,
    timeouts: ConnectorTimeouts,
}

impl PostgresConnector {
    /// Open a small pool and verify the server answers.
    pub async fn connect(settings: &RelationalSettings, timeouts: ConnectorTimeouts) -> Result<Self> {
        let ssl_mode = match settings.ssl_mode.as_deref() {
            Some(mode) => PgSslMode::from_str(mode)
                .map_err(|e| ConnectorError::configuration(format!("invalid sslmode: {}", e)))?,
            None => PgSslMode::Prefer,
        };

        let options = PgConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .username(&settings.username)
            .password(&settings.password)
            .database(&settings.database)
            .ssl_mode(ssl_mode);

        let pool = with_timeout("postgres connect", timeouts.connect, async {
            PgPoolOptions::new()
                .max_connections(2)
                .acquire_timeout(timeouts.connect)
                .connect_with(options)
                .await
                .map_err(|e| ConnectorError::connection(format!("postgres {}:{}: {}", settings.host, settings.port, e)))
        })
        .await?;

        info!(host = %settings.host, database = %settings.database, "Connected to postgres");
        Ok(Self::from_pool(pool, timeouts))
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool, timeouts: ConnectorTimeouts) -> Self {
        Self { pool, timeouts }
    }
}

#[async_trait]
impl RelationalConnector for PostgresConnector {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Postgres
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
                    charset: None,
                    collation: None,
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

        debug!(schema, tables = rows.len(), "Scanned postgres tables");

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
                Ok(FieldSummary {
                    name: row.try_get("name").map_err(|e| ConnectorError::from_sqlx(&target, e))?,
                    ordinal: row.try_get("ordinal").unwrap_or_default(),
                    data_type: row.try_get("data_type").unwrap_or_default(),
                    nullable: row.try_get("nullable").unwrap_or(true),
                    default: row.try_get::<Option<_>, _>("default_value").ok().flatten(),
                    comment: non_empty(row.try_get::<Option<_>, _>("comment").ok().flatten()),
                    is_primary_key: row.try_get("is_primary_key").unwrap_or(false),
                    is_unique_key: row.try_get("is_unique_key").unwrap_or(false),
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
