//! Read-only catalog commands: `tree`, `runs`, `resources`

use crate::cli::output::{
    format_duration_ms, format_size, format_time, print_json, print_table, print_table_colored,
    run_status_color,
};
use crate::cli::scan::print_summary;
use crate::cli::{block_on, open_orchestrator};
use anyhow::{Context, Result};
use atlas_db::{CatalogItem, ItemAttributes};
use atlas_ids::{ScanRunId, TenantId};
use atlas_scan::{NodeTree, ResourceTree};
use comfy_table::Color;
use std::path::PathBuf;

#[derive(Debug)]
pub struct TreeArgs {
    pub config: PathBuf,
    pub tenant: i64,
    pub json: bool,
}

#[derive(Debug)]
pub struct RunsArgs {
    pub config: PathBuf,
    pub tenant: i64,
    pub id: Option<String>,
    pub limit: u32,
    pub json: bool,
}

#[derive(Debug)]
pub struct ResourcesArgs {
    pub config: PathBuf,
    pub tenant: i64,
    pub json: bool,
}

// ============================================================================
// tree
// ============================================================================

pub fn run_tree(args: TreeArgs) -> Result<()> {
    block_on(async move {
        let orchestrator = open_orchestrator(&args.config).await?;
        let trees = orchestrator.catalog_tree(TenantId::new(args.tenant)).await?;

        if args.json {
            return print_json(&trees);
        }
        if trees.is_empty() {
            println!("No resources cataloged for tenant {}", args.tenant);
            return Ok(());
        }
        for tree in &trees {
            print!("{}", render_tree(tree));
        }
        Ok(())
    })
}

fn render_tree(tree: &ResourceTree) -> String {
    let mut out = format!(
        "{} [{} #{}] {}\n",
        tree.resource.name,
        tree.resource.engine,
        tree.resource.external_id,
        tree.resource.status.as_str()
    );
    for node in &tree.nodes {
        render_node(node, 1, &mut out);
    }
    out
}

fn render_node(tree: &NodeTree, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    let node = &tree.node;
    out.push_str(&format!(
        "{}{}/ ({}, {}) {} items, {}",
        indent,
        node.name,
        node.kind.as_str(),
        node.scan_status.as_str(),
        node.item_count,
        format_size(node.total_size_bytes)
    ));
    if let Some(error) = &node.error_message {
        out.push_str(&format!(" ! {}", error));
    }
    out.push('\n');

    for child in &tree.children {
        render_node(child, depth + 1, out);
    }
    for item in &tree.items {
        out.push_str(&format!("{}  {}\n", indent, describe_item(item)));
    }
}

fn describe_item(item: &CatalogItem) -> String {
    match &item.attributes {
        ItemAttributes::RelationalTable(table) => format!(
            "{} ({}, {} fields, {} rows)",
            item.name,
            item.kind.as_str(),
            table.fields.len(),
            item.row_count.map_or_else(|| "?".to_string(), |n| n.to_string())
        ),
        _ => format!("{} ({})", item.name, format_size(item.size_bytes)),
    }
}

// ============================================================================
// runs
// ============================================================================

pub fn run_runs(args: RunsArgs) -> Result<()> {
    block_on(async move {
        let orchestrator = open_orchestrator(&args.config).await?;
        let tenant = TenantId::new(args.tenant);

        if let Some(id) = &args.id {
            let run_id = ScanRunId::parse(id).with_context(|| format!("Invalid run id '{}'", id))?;
            let summary = orchestrator
                .get_scan_run(tenant, &run_id)
                .await?
                .with_context(|| format!("Scan run {} not found for tenant {}", id, args.tenant))?;
            return if args.json {
                print_json(&summary)
            } else {
                print_summary(&summary);
                Ok(())
            };
        }

        let runs = orchestrator.scan_history(tenant, args.limit).await?;
        if args.json {
            return print_json(&runs);
        }
        if runs.is_empty() {
            println!("No scan runs for tenant {}", args.tenant);
            return Ok(());
        }

        let rows = runs
            .iter()
            .map(|run| {
                vec![
                    (run.run_id.to_string(), None),
                    (format_time(Some(run.started_at)), None),
                    (run.status.as_str().to_string(), Some(run_status_color(run.status))),
                    (run.namespaces_scanned.to_string(), None),
                    (run.items_scanned.to_string(), None),
                    (run.skipped.to_string(), None),
                    (format_duration_ms(run.duration_ms), None),
                    (
                        run.message.clone().unwrap_or_default(),
                        run.message.as_ref().map(|_| Color::Red),
                    ),
                ]
            })
            .collect();
        print_table_colored(
            &["Run", "Started", "Status", "Namespaces", "Items", "Skipped", "Duration", "Message"],
            rows,
        );
        Ok(())
    })
}

// ============================================================================
// resources
// ============================================================================

pub fn run_resources(args: ResourcesArgs) -> Result<()> {
    block_on(async move {
        let orchestrator = open_orchestrator(&args.config).await?;
        let stats = orchestrator.resource_stats(TenantId::new(args.tenant)).await?;

        if args.json {
            return print_json(&stats);
        }
        if stats.is_empty() {
            println!("No resources cataloged for tenant {}", args.tenant);
            return Ok(());
        }

        let unscanned = stats.iter().map(|s| s.unscanned_nodes).sum::<i64>();
        print_table(
            &["ID", "Name", "Engine", "Status", "Namespaces", "Scanned", "Unscanned", "Last Scan"],
            stats
                .iter()
                .map(|s| {
                    vec![
                        s.resource.external_id.to_string(),
                        s.resource.name.clone(),
                        s.resource.engine.clone(),
                        s.resource.status.as_str().to_string(),
                        s.total_nodes.to_string(),
                        s.scanned_nodes.to_string(),
                        s.unscanned_nodes.to_string(),
                        format_time(s.last_scan_at),
                    ]
                })
                .collect(),
        );
        if unscanned > 0 {
            println!("{} namespaces waiting: run `atlas scan-unscanned {}`", unscanned, args.tenant);
        }
        Ok(())
    })
}
