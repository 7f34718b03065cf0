//! Nested view of a tenant's catalog.

use atlas_db::{CatalogItem, CatalogNode, CatalogResource};
use atlas_ids::NodeId;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTree {
    pub resource: CatalogResource,
    pub nodes: Vec<NodeTree>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTree {
    pub node: CatalogNode,
    pub children: Vec<NodeTree>,
    pub items: Vec<CatalogItem>,
}

impl NodeTree {
    /// Items anywhere in this subtree.
    pub fn total_items(&self) -> usize {
        self.items.len() + self.children.iter().map(NodeTree::total_items).sum::<usize>()
    }
}

/// Assemble a resource's flat node and item lists into a tree.
/// Nodes whose parent is not in `nodes` are left out.
pub fn build_resource_tree(
    resource: CatalogResource,
    nodes: Vec<CatalogNode>,
    items: Vec<CatalogItem>,
) -> ResourceTree {
    let mut children: HashMap<Option<NodeId>, Vec<CatalogNode>> = HashMap::new();
    for node in nodes {
        children.entry(node.parent_id.clone()).or_default().push(node);
    }
    let mut items_by_node: HashMap<NodeId, Vec<CatalogItem>> = HashMap::new();
    for item in items {
        items_by_node.entry(item.node_id.clone()).or_default().push(item);
    }

    let roots = children.remove(&None).unwrap_or_default();
    let nodes = roots
        .into_iter()
        .map(|root| build_node(root, &mut children, &mut items_by_node))
        .collect();

    ResourceTree { resource, nodes }
}

fn build_node(
    node: CatalogNode,
    children: &mut HashMap<Option<NodeId>, Vec<CatalogNode>>,
    items: &mut HashMap<NodeId, Vec<CatalogItem>>,
) -> NodeTree {
    let key = Some(node.id.clone());
    let mut kids: Vec<NodeTree> = children
        .remove(&key)
        .unwrap_or_default()
        .into_iter()
        .map(|child| build_node(child, children, items))
        .collect();
    kids.sort_by(|a, b| a.node.name.cmp(&b.node.name));

    let mut own_items = items.remove(&node.id).unwrap_or_default();
    own_items.sort_by(|a, b| a.name.cmp(&b.name));

    NodeTree {
        node,
        children: kids,
        items: own_items,
    }
}
