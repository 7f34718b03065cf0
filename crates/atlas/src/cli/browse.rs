//! `atlas browse`: live listing straight from the source, catalog untouched.

use crate::cli::output::{format_size, format_time, print_json, print_table};
use crate::cli::{block_on, open_orchestrator};
use anyhow::Result;
use atlas_connect::{ObjectKind, ObjectNode};
use atlas_ids::{ExternalResourceId, TenantId};
use std::path::PathBuf;

#[derive(Debug)]
pub struct BrowseArgs {
    pub config: PathBuf,
    pub tenant: i64,
    pub resource: i64,
    /// `bucket[/prefix]`; without it the top-level namespaces are listed
    pub path: Option<String>,
    pub token: Option<String>,
    pub json: bool,
}

pub fn run(args: BrowseArgs) -> Result<()> {
    block_on(async move {
        let orchestrator = open_orchestrator(&args.config).await?;
        let tenant = TenantId::new(args.tenant);
        let resource = ExternalResourceId::new(args.resource);
        let token = args.token.as_deref();

        match args.path.as_deref() {
            None => {
                let namespaces = orchestrator
                    .list_available_namespaces(tenant, resource, token)
                    .await?;
                if args.json {
                    return print_json(&namespaces);
                }
                for name in &namespaces {
                    println!("{}", name);
                }
            }
            Some(path) => {
                let nodes = orchestrator
                    .list_object_nodes(tenant, resource, path, token)
                    .await?;
                if args.json {
                    return print_json(&nodes);
                }
                print_table(
                    &["Name", "Kind", "Size", "Objects", "Modified"],
                    nodes.iter().map(node_row).collect(),
                );
            }
        }
        Ok(())
    })
}

fn node_row(node: &ObjectNode) -> Vec<String> {
    let (name, kind) = match node.kind {
        ObjectKind::Bucket => (format!("{}/", node.name), "bucket"),
        ObjectKind::Prefix => (format!("{}/", node.name), "prefix"),
        ObjectKind::Object => (node.name.clone(), node.file_type.as_deref().unwrap_or("object")),
    };
    vec![
        name,
        kind.to_string(),
        format_size(node.size_bytes),
        node.object_count.to_string(),
        format_time(node.last_modified),
    ]
}
