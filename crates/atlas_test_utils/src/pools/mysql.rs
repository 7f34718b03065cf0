use super::{prepare, ACQUIRE_TIMEOUT, POOL_SIZE};
use crate::config::{DbVersion, TestDbConfig};
use anyhow::Result;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;

/// Pool against the MySQL test container.
#[derive(Debug, Clone)]
pub struct TestMySqlPool {
    pub pool: MySqlPool,
    pub config: TestDbConfig,
}

impl TestMySqlPool {
    pub async fn new(version: DbVersion) -> Result<Self> {
        let config = prepare(version, false).await?;
        let pool = MySqlPoolOptions::new()
            .max_connections(POOL_SIZE)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(&config.mysql_connection_string())
            .await?;
        Ok(Self { pool, config })
    }

    pub async fn execute(&self, sql: &str) -> Result<()> {
        sqlx::query(sql).execute(&self.pool).await.map(drop)?;
        Ok(())
    }

    pub fn inner(&self) -> &MySqlPool {
        &self.pool
    }
}
