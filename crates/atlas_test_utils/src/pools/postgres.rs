use super::{prepare, ACQUIRE_TIMEOUT, POOL_SIZE};
use crate::config::{DbVersion, TestDbConfig};
use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Pool against the PostgreSQL test container.
#[derive(Debug, Clone)]
pub struct TestPgPool {
    pub pool: PgPool,
    pub config: TestDbConfig,
}

impl TestPgPool {
    pub async fn new(version: DbVersion) -> Result<Self> {
        let config = prepare(version, true).await?;
        let pool = PgPoolOptions::new()
            .max_connections(POOL_SIZE)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(&config.postgres_connection_string())
            .await?;
        Ok(Self { pool, config })
    }

    /// Run DDL or DML, discarding the row count.
    pub async fn execute(&self, sql: &str) -> Result<()> {
        sqlx::query(sql).execute(&self.pool).await.map(drop)?;
        Ok(())
    }

    pub fn inner(&self) -> &PgPool {
        &self.pool
    }
}
