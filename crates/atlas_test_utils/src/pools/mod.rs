//! Connection pools against the compose-managed databases.

pub mod mysql;
pub mod postgres;

use crate::config::{DbVersion, TestDbConfig};
use crate::containers::lifecycle::ensure_container_running;
use anyhow::{ensure, Result};
use std::time::Duration;
use tracing::info;

const POOL_SIZE: u32 = 5;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Check the engine matches, start its container and hand back the
/// connection settings.
async fn prepare(version: DbVersion, postgres: bool) -> Result<TestDbConfig> {
    ensure!(
        version.is_postgres() == postgres,
        "{} is not a {} database",
        version,
        if postgres { "PostgreSQL" } else { "MySQL" }
    );

    ensure_container_running(version).await?;
    info!("Connecting to {} on port {}", version, version.port());
    Ok(TestDbConfig::new(version))
}
