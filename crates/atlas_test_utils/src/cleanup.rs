//! Throwaway namespaces for connector tests.
//!
//! A guard owns one randomly named PostgreSQL schema or MySQL database.
//! Dropping the guard removes it in the background; call `cleanup` to
//! remove it synchronously instead.

use anyhow::Result;
use sqlx::{MySqlPool, PgPool};
use std::future::Future;
use tracing::{debug, warn};
use uuid::Uuid;

fn scratch_name() -> String {
    format!("atlas_test_{}", Uuid::new_v4().simple())
}

/// Fire a drop statement on the current runtime, if there is one.
fn drop_later<F>(what: String, work: F)
where
    F: Future<Output = std::result::Result<(), sqlx::Error>> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                if let Err(e) = work.await {
                    warn!("Leaked {}: {}", what, e);
                }
            });
        }
        Err(_) => warn!("No runtime to remove {}", what),
    }
}

/// ```rust,ignore
/// let pool = TestPgPool::new(DbVersion::Postgres16).await.unwrap();
/// let guard = PostgresTestGuard::new(pool.pool.clone()).await.unwrap();
/// guard.execute("CREATE TABLE orders (id INT PRIMARY KEY)").await.unwrap();
/// // scan `guard.schema_name()` with the connector under test
/// ```
pub struct PostgresTestGuard {
    pool: PgPool,
    schema: String,
}

impl PostgresTestGuard {
    pub async fn new(pool: PgPool) -> Result<Self> {
        let schema = scratch_name();
        debug!("CREATE SCHEMA {}", schema);
        sqlx::query(&format!("CREATE SCHEMA {schema}")).execute(&pool).await?;
        Ok(Self { pool, schema })
    }

    /// Run `sql` with only this schema on the search path.
    pub async fn execute(&self, sql: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("SET LOCAL search_path TO {}", self.schema))
            .execute(&mut *tx)
            .await?;
        sqlx::query(sql).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    pub fn schema_name(&self) -> &str {
        &self.schema
    }

    fn drop_sql(&self) -> String {
        format!("DROP SCHEMA IF EXISTS {} CASCADE", self.schema)
    }

    pub async fn cleanup(&self) -> Result<()> {
        sqlx::query(&self.drop_sql()).execute(&self.pool).await?;
        Ok(())
    }
}

impl Drop for PostgresTestGuard {
    fn drop(&mut self) {
        let pool = self.pool.clone();
        let sql = self.drop_sql();
        drop_later(format!("schema {}", self.schema), async move {
            sqlx::query(&sql).execute(&pool).await.map(drop)
        });
    }
}

pub struct MySqlTestGuard {
    pool: MySqlPool,
    database: String,
}

impl MySqlTestGuard {
    pub async fn new(pool: MySqlPool) -> Result<Self> {
        let database = scratch_name();
        debug!("CREATE DATABASE {}", database);
        sqlx::query(&format!("CREATE DATABASE {database}")).execute(&pool).await?;
        Ok(Self { pool, database })
    }

    /// Run `sql` on a connection switched to this database.
    pub async fn execute(&self, sql: &str) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query(&format!("USE {}", self.database))
            .execute(&mut *conn)
            .await?;
        sqlx::query(sql).execute(&mut *conn).await?;
        Ok(())
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    fn drop_sql(&self) -> String {
        format!("DROP DATABASE IF EXISTS {}", self.database)
    }

    pub async fn cleanup(&self) -> Result<()> {
        sqlx::query(&self.drop_sql()).execute(&self.pool).await?;
        Ok(())
    }
}

impl Drop for MySqlTestGuard {
    fn drop(&mut self) {
        let pool = self.pool.clone();
        let sql = self.drop_sql();
        drop_later(format!("database {}", self.database), async move {
            sqlx::query(&sql).execute(&pool).await.map(drop)
        });
    }
}
