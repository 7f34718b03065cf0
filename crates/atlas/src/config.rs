//! Atlas configuration file
//!
//! Lives at `$ATLAS_HOME/config.toml` unless `--config` points elsewhere.
//! A missing file means defaults: a catalog under `$ATLAS_HOME` and no
//! registered resources.

use anyhow::{Context, Result};
use atlas_connect::{Attributes, ConnectorTimeouts};
use atlas_ids::{ExternalResourceId, TenantId};
use atlas_scan::{RegisteredResource, ScanConfig, StaticResourceDirectory};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "config.toml";
const CATALOG_FILE_NAME: &str = "catalog.db";

pub fn default_config_path() -> PathBuf {
    atlas_logging::atlas_home().join(CONFIG_FILE_NAME)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtlasConfig {
    /// Catalog database file; `$ATLAS_HOME/catalog.db` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,

    #[serde(default = "default_max_concurrent_scans")]
    pub max_concurrent_scans: usize,

    #[serde(default)]
    pub timeouts: TimeoutSettings,

    #[serde(default)]
    pub resources: Vec<ResourceEntry>,
}

fn default_max_concurrent_scans() -> usize {
    ScanConfig::default().max_concurrent_scans
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            max_concurrent_scans: default_max_concurrent_scans(),
            timeouts: TimeoutSettings::default(),
            resources: Vec::new(),
        }
    }
}

impl AtlasConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Invalid config: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let raw = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, raw)
            .with_context(|| format!("Failed to write config: {}", path.display()))
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| atlas_logging::atlas_home().join(CATALOG_FILE_NAME))
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            max_concurrent_scans: self.max_concurrent_scans.max(1),
        }
    }

    pub fn connector_timeouts(&self) -> ConnectorTimeouts {
        self.timeouts.to_timeouts()
    }

    pub fn directory(&self) -> StaticResourceDirectory {
        StaticResourceDirectory::new(
            self.resources
                .iter()
                .cloned()
                .map(RegisteredResource::from)
                .collect(),
        )
    }

    /// Starter file written by `atlas config init`.
    pub fn sample() -> Self {
        let attributes = serde_json::json!({
            "host": "localhost",
            "port": 5432,
            "username": "reader",
            "password": "change-me",
            "database": "warehouse",
        });
        Self {
            resources: vec![ResourceEntry {
                tenant_id: 1,
                external_id: 1,
                name: "warehouse".to_string(),
                kind: "postgres".to_string(),
                active: true,
                attributes: attributes.as_object().cloned().unwrap_or_default(),
            }],
            ..Self::default()
        }
    }
}

/// External call deadlines, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutSettings {
    #[serde(default = "default_connect_secs")]
    pub connect_secs: u64,
    #[serde(default = "default_metadata_query_secs")]
    pub metadata_query_secs: u64,
    #[serde(default = "default_object_walk_secs")]
    pub object_walk_secs: u64,
}

fn default_connect_secs() -> u64 {
    ConnectorTimeouts::default().connect.as_secs()
}

fn default_metadata_query_secs() -> u64 {
    ConnectorTimeouts::default().metadata_query.as_secs()
}

fn default_object_walk_secs() -> u64 {
    ConnectorTimeouts::default().object_walk.as_secs()
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_secs(),
            metadata_query_secs: default_metadata_query_secs(),
            object_walk_secs: default_object_walk_secs(),
        }
    }
}

impl TimeoutSettings {
    pub fn to_timeouts(self) -> ConnectorTimeouts {
        ConnectorTimeouts {
            connect: Duration::from_secs(self.connect_secs),
            metadata_query: Duration::from_secs(self.metadata_query_secs),
            object_walk: Duration::from_secs(self.object_walk_secs),
        }
    }
}

/// One `[[resources]]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub tenant_id: i64,
    pub external_id: i64,
    pub name: String,
    pub kind: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub attributes: Attributes,
}

fn default_active() -> bool {
    true
}

impl From<ResourceEntry> for RegisteredResource {
    fn from(entry: ResourceEntry) -> Self {
        RegisteredResource {
            tenant_id: TenantId::new(entry.tenant_id),
            external_id: ExternalResourceId::new(entry.external_id),
            name: entry.name,
            kind: entry.kind,
            is_active: entry.active,
            attributes: entry.attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_scan::ResourceDirectory;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
database_path = "/var/lib/atlas/catalog.db"
max_concurrent_scans = 8

[timeouts]
connect_secs = 5

[[resources]]
tenant_id = 1
external_id = 10
name = "warehouse"
kind = "postgresql"

[resources.attributes]
host = "db.internal"
port = 5432
username = "reader"
password = "hunter2"
database = "warehouse"

[[resources]]
tenant_id = 2
external_id = 20
name = "lake"
kind = "minio"
active = false

[resources.attributes]
endpoint = "minio.internal:9000"
access_key = "AK"
secret_key = "SK"
buckets = ["archive"]
"#;

    #[test]
    fn test_missing_file_is_default() {
        let tmp = TempDir::new().unwrap();
        let config = AtlasConfig::load(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config, AtlasConfig::default());
        assert_eq!(config.max_concurrent_scans, 4);
        assert!(config.resources.is_empty());
    }

    #[test]
    fn test_parse_resources_and_partial_timeouts() {
        let config: AtlasConfig = toml::from_str(SAMPLE).unwrap();

        assert_eq!(config.database_path(), PathBuf::from("/var/lib/atlas/catalog.db"));
        assert_eq!(config.scan_config().max_concurrent_scans, 8);

        let timeouts = config.connector_timeouts();
        assert_eq!(timeouts.connect, Duration::from_secs(5));
        assert_eq!(timeouts.metadata_query, Duration::from_secs(30));
        assert_eq!(timeouts.object_walk, Duration::from_secs(120));

        assert_eq!(config.resources.len(), 2);
        assert!(config.resources[0].active);
        assert!(!config.resources[1].active);
        assert_eq!(config.resources[0].attributes["port"], serde_json::json!(5432));
    }

    #[tokio::test]
    async fn test_directory_is_tenant_scoped() {
        let config: AtlasConfig = toml::from_str(SAMPLE).unwrap();
        let directory = config.directory();

        let tenant_one = directory.list_resources(TenantId::new(1)).await.unwrap();
        assert_eq!(tenant_one.len(), 1);
        assert_eq!(tenant_one[0].name, "warehouse");

        let lake = directory
            .get_resource(ExternalResourceId::new(20), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(lake.tenant_id, TenantId::new(2));
        assert!(!lake.is_active);
    }

    #[test]
    fn test_save_and_reload() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join(CONFIG_FILE_NAME);

        let config = AtlasConfig::sample();
        config.save(&path).unwrap();

        let loaded = AtlasConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.resources[0].kind, "postgres");
    }

    #[test]
    fn test_zero_concurrency_is_clamped() {
        let config = AtlasConfig {
            max_concurrent_scans: 0,
            ..AtlasConfig::default()
        };
        assert_eq!(config.scan_config().max_concurrent_scans, 1);
    }
}
