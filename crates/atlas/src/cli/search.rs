//! `atlas search` and `atlas stats`

use crate::cli::output::{format_size, print_json, print_table};
use crate::cli::{block_on, open_orchestrator};
use anyhow::Result;
use atlas_db::{CatalogItem, FieldMatch, ItemAttributes, MetadataStats};
use atlas_ids::TenantId;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchTarget {
    Tables,
    Fields,
}

#[derive(Debug)]
pub struct SearchArgs {
    pub config: PathBuf,
    pub tenant: i64,
    pub target: SearchTarget,
    pub keyword: String,
    pub limit: u32,
    pub json: bool,
}

#[derive(Debug)]
pub struct StatsArgs {
    pub config: PathBuf,
    pub tenant: i64,
    pub json: bool,
}

pub fn run_search(args: SearchArgs) -> Result<()> {
    block_on(async move {
        let orchestrator = open_orchestrator(&args.config).await?;
        let tenant = TenantId::new(args.tenant);

        match args.target {
            SearchTarget::Tables => {
                let items = orchestrator
                    .search_tables(tenant, &args.keyword, args.limit)
                    .await?;
                if args.json {
                    return print_json(&items);
                }
                if items.is_empty() {
                    println!("No tables match '{}'", args.keyword);
                    return Ok(());
                }
                print_table(&["Table", "Kind", "Rows", "Size", "Comment"], table_rows(&items));
            }
            SearchTarget::Fields => {
                let fields = orchestrator
                    .search_fields(tenant, &args.keyword, args.limit)
                    .await?;
                if args.json {
                    return print_json(&fields);
                }
                if fields.is_empty() {
                    println!("No fields match '{}'", args.keyword);
                    return Ok(());
                }
                print_table(&["Table", "Field", "Type", "Comment"], field_rows(&fields));
            }
        }
        Ok(())
    })
}

pub fn run_stats(args: StatsArgs) -> Result<()> {
    block_on(async move {
        let orchestrator = open_orchestrator(&args.config).await?;
        let stats = orchestrator.metadata_stats(TenantId::new(args.tenant)).await?;
        if args.json {
            return print_json(&stats);
        }
        print_table(&["Metric", "Value"], stats_rows(&stats));
        Ok(())
    })
}

fn table_rows(items: &[CatalogItem]) -> Vec<Vec<String>> {
    items
        .iter()
        .map(|item| {
            let comment = match &item.attributes {
                ItemAttributes::RelationalTable(table) => table.comment.clone(),
                _ => None,
            };
            vec![
                item.full_name.clone(),
                item.kind.as_str().to_string(),
                item.row_count.map(|n| n.to_string()).unwrap_or_else(|| "-".into()),
                format_size(item.size_bytes),
                comment.unwrap_or_default(),
            ]
        })
        .collect()
}

fn field_rows(fields: &[FieldMatch]) -> Vec<Vec<String>> {
    fields
        .iter()
        .map(|m| {
            vec![
                m.table_full_name.clone(),
                m.field.name.clone(),
                m.field.data_type.clone(),
                m.field.comment.clone().unwrap_or_default(),
            ]
        })
        .collect()
}

fn stats_rows(stats: &MetadataStats) -> Vec<Vec<String>> {
    vec![
        vec!["Resources".into(), stats.resource_count.to_string()],
        vec![
            "Namespaces".into(),
            format!("{} ({} scanned)", stats.namespace_count, stats.scanned_namespace_count),
        ],
        vec!["Tables".into(), stats.table_count.to_string()],
        vec!["Fields".into(), stats.field_count.to_string()],
        vec!["Objects".into(), stats.object_count.to_string()],
        vec!["Size".into(), format_size(stats.total_size_bytes)],
    ]
}
