//! `atlas config`: write a starter file or show the effective settings.

use crate::cli::output::print_table;
use crate::config::AtlasConfig;
use anyhow::Result;
use atlas_connect::sanitize_attributes;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ConfigAction {
    Init { force: bool },
    Show { json: bool },
}

#[derive(Debug)]
pub struct ConfigArgs {
    pub config: PathBuf,
    pub action: ConfigAction,
}

pub fn run(args: ConfigArgs) -> Result<()> {
    match args.action {
        ConfigAction::Init { force } => init(&args.config, force),
        ConfigAction::Show { json } => show(&args.config, json),
    }
}

fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at {} (use --force to overwrite)",
            path.display()
        );
    }
    AtlasConfig::sample().save(path)?;
    println!("Wrote {}", path.display());
    println!("Edit the [[resources]] entries, then run `atlas scan <tenant> <resource>`.");
    Ok(())
}

#[derive(Debug, Serialize)]
struct EffectiveConfig {
    config_path: PathBuf,
    database_path: PathBuf,
    max_concurrent_scans: usize,
    connect_secs: u64,
    metadata_query_secs: u64,
    object_walk_secs: u64,
    resources: Vec<EffectiveResource>,
}

#[derive(Debug, Serialize)]
struct EffectiveResource {
    tenant_id: i64,
    external_id: i64,
    name: String,
    kind: String,
    active: bool,
    attributes: serde_json::Map<String, serde_json::Value>,
}

fn effective(path: &Path, config: &AtlasConfig) -> EffectiveConfig {
    EffectiveConfig {
        config_path: path.to_path_buf(),
        database_path: config.database_path(),
        max_concurrent_scans: config.scan_config().max_concurrent_scans,
        connect_secs: config.timeouts.connect_secs,
        metadata_query_secs: config.timeouts.metadata_query_secs,
        object_walk_secs: config.timeouts.object_walk_secs,
        resources: config
            .resources
            .iter()
            .map(|entry| EffectiveResource {
                tenant_id: entry.tenant_id,
                external_id: entry.external_id,
                name: entry.name.clone(),
                kind: entry.kind.clone(),
                active: entry.active,
                attributes: sanitize_attributes(&entry.attributes),
            })
            .collect(),
    }
}

fn show(path: &Path, json: bool) -> Result<()> {
    let config = AtlasConfig::load(path)?;
    let view = effective(path, &config);

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("Config:      {}", view.config_path.display());
    println!("Catalog:     {}", view.database_path.display());
    println!("Concurrency: {}", view.max_concurrent_scans);
    println!(
        "Timeouts:    connect {}s, metadata {}s, object walk {}s",
        view.connect_secs, view.metadata_query_secs, view.object_walk_secs
    );
    println!();

    if view.resources.is_empty() {
        println!("No resources configured");
        return Ok(());
    }
    print_table(
        &["Tenant", "ID", "Name", "Kind", "Active"],
        view.resources
            .iter()
            .map(|r| {
                vec![
                    r.tenant_id.to_string(),
                    r.external_id.to_string(),
                    r.name.clone(),
                    r.kind.clone(),
                    if r.active { "yes" } else { "no" }.to_string(),
                ]
            })
            .collect(),
    );
    Ok(())
}
