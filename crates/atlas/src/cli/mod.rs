//! CLI commands for Atlas
//!
//! Every command loads the config file, opens the catalog and builds a
//! [`ScanOrchestrator`] over the configured resources.

pub mod browse;
pub mod catalog;
pub mod config;
pub mod output;
pub mod scan;
pub mod search;

use crate::config::AtlasConfig;
use anyhow::{Context, Result};
use atlas_connect::DefaultConnectorFactory;
use atlas_db::CatalogDb;
use atlas_scan::ScanOrchestrator;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Run one async command to completion on a fresh runtime.
pub fn block_on<F, T>(future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    rt.block_on(future)
}

pub async fn open_orchestrator(config_path: &Path) -> Result<ScanOrchestrator> {
    let config = AtlasConfig::load(config_path)?;
    let db_path = config.database_path();
    debug!(
        "Opening catalog at {} with {} configured resources",
        db_path.display(),
        config.resources.len()
    );

    let store = CatalogDb::open(&db_path)
        .await
        .with_context(|| format!("Failed to open catalog: {}", db_path.display()))?;

    Ok(ScanOrchestrator::new(
        Arc::new(store),
        Arc::new(config.directory()),
        Arc::new(DefaultConnectorFactory::new(config.connector_timeouts())),
        config.scan_config(),
    ))
}
