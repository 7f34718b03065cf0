use super::Reconciler;
use crate::error::{Result, ScanError};
use atlas_connect::{has_reserved_segment, ObjectKind, ObjectMetadata, ObjectStorageConnector};
use atlas_db::{
    CatalogNode, CatalogResource, ItemAttributes, ItemKind, ItemUpsert, NodeAggregate,
    NodeAttributes, NodeKind, NodeUpsert, ObjectAttributes, ScanCounts,
};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// What a `bucket/key` path turned out to name upstream.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectTarget {
    Bucket,
    Prefix(Vec<ObjectMetadata>),
    Object(ObjectMetadata),
    /// Nothing exists at the path any more
    Missing,
}

impl ObjectTarget {
    fn classify(key: &str, records: Vec<ObjectMetadata>) -> Self {
        if key.is_empty() {
            return Self::Bucket;
        }
        match records.as_slice() {
            [only] if only.kind == ObjectKind::Object && only.relative_path == key => {
                Self::Object(only.clone())
            }
            [only] if only.kind != ObjectKind::Object && only.object_count == 0 => Self::Missing,
            _ => Self::Prefix(records),
        }
    }
}

/// Split `bucket/key`, trimming blanks and stray slashes.
pub fn split_object_path(path: &str) -> Option<(String, String)> {
    let segments: Vec<&str> = path
        .trim()
        .split('/')
        .filter(|s| !s.trim().is_empty())
        .collect();
    let (bucket, rest) = segments.split_first()?;
    Some((bucket.to_string(), rest.join("/")))
}

fn collapse_empty_segments(rel: &str) -> String {
    if !rel.starts_with('/') && !rel.ends_with('/') && !rel.contains("//") {
        return rel.to_string();
    }
    rel.split('/').filter(|s| !s.is_empty()).collect::<Vec<_>>().join("/")
}

fn parent_dir(rel: &str) -> &str {
    rel.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

fn leaf_name(rel: &str) -> &str {
    rel.rsplit_once('/').map(|(_, name)| name).unwrap_or(rel)
}

fn is_within(base: &str, rel: &str) -> bool {
    base.is_empty() || rel == base || rel.starts_with(&format!("{}/", base))
}

fn join_rel(base: &str, segment: &str) -> String {
    if base.is_empty() {
        segment.to_string()
    } else {
        format!("{}/{}", base, segment)
    }
}

fn storage_attributes(record: &ObjectMetadata) -> NodeAttributes {
    NodeAttributes::Storage {
        reported_object_count: record.object_count,
        reported_size_bytes: record.size_bytes,
        last_modified_at: record.last_modified,
    }
}

fn object_item(parent: &CatalogNode, record: &ObjectMetadata) -> ItemUpsert {
    ItemUpsert {
        tenant_id: parent.tenant_id,
        node_id: parent.id.clone(),
        kind: ItemKind::Object,
        name: leaf_name(&record.relative_path).to_string(),
        row_count: None,
        size_bytes: record.size_bytes,
        last_modified_at: record.last_modified,
        attributes: ItemAttributes::Object(ObjectAttributes {
            file_type: record.file_type.clone(),
            content_type: record.content_type.clone(),
            etag: record.etag.clone(),
        }),
    }
}

impl Reconciler {
    /// Reconcile an object-storage path: a whole bucket, a prefix subtree,
    /// or a single object.
    pub async fn reconcile_object_path(
        &self,
        resource: &CatalogResource,
        conn: &dyn ObjectStorageConnector,
        path: &str,
    ) -> Result<ScanCounts> {
        let (bucket, key) = split_object_path(path)
            .ok_or_else(|| ScanError::configuration("object path must name a bucket"))?;
        if has_reserved_segment(&bucket) || has_reserved_segment(&key) {
            warn!(bucket = %bucket, key = %key, "Ignoring reserved object path");
            return Ok(ScanCounts {
                skipped: 1,
                ..ScanCounts::default()
            });
        }

        let bucket_node = self
            .store
            .upsert_node(&NodeUpsert {
                tenant_id: resource.tenant_id,
                resource_id: resource.id.clone(),
                parent_id: None,
                kind: NodeKind::Bucket,
                name: bucket.clone(),
                attributes: None,
            })
            .await?;

        // A bucket pass follows begin/clear/enumerate. A narrower path has to
        // be enumerated first to learn whether it names an object or a prefix.
        let target = if key.is_empty() {
            ObjectTarget::Bucket
        } else {
            let records = conn.scan_path(&join_rel(&bucket, &key)).await?;
            ObjectTarget::classify(&key, records)
        };

        match target {
            ObjectTarget::Bucket => self.reconcile_subtree(conn, &bucket_node, "", None).await,
            ObjectTarget::Prefix(records) => {
                let chain = self.ensure_chain(&bucket_node, &key).await?;
                let prefix = chain
                    .last()
                    .cloned()
                    .ok_or_else(|| ScanError::internal("empty prefix chain"))?;
                let counts = self
                    .reconcile_subtree(conn, &prefix, &key, Some(records))
                    .await?;
                self.roll_up(&chain[..chain.len() - 1]).await?;
                Ok(counts)
            }
            ObjectTarget::Object(record) => self.refresh_object(&bucket_node, &record).await,
            ObjectTarget::Missing => self.forget_path(&bucket_node, &key).await,
        }
    }

    /// Begin, clear, enumerate, materialize and finish one subtree.
    async fn reconcile_subtree(
        &self,
        conn: &dyn ObjectStorageConnector,
        target: &CatalogNode,
        base: &str,
        prefetched: Option<Vec<ObjectMetadata>>,
    ) -> Result<ScanCounts> {
        self.store.begin_node_scan(target.tenant_id, &target.id).await?;

        match self.replace_objects(conn, target, base, prefetched).await {
            Ok((aggregate, mut counts)) => {
                self.store
                    .finish_node_scan(target.tenant_id, &target.id, aggregate)
                    .await?;
                counts.namespaces_scanned = 1;
                info!(
                    path = %target.full_name,
                    objects = counts.items_scanned,
                    bytes = aggregate.total_size_bytes,
                    skipped = counts.skipped,
                    "Object subtree reconciled"
                );
                Ok(counts)
            }
            Err(e) => {
                self.mark_failed(target.tenant_id, &target.id, &e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn replace_objects(
        &self,
        conn: &dyn ObjectStorageConnector,
        target: &CatalogNode,
        base: &str,
        prefetched: Option<Vec<ObjectMetadata>>,
    ) -> Result<(NodeAggregate, ScanCounts)> {
        let (items, nodes) = self.store.clear_subtree(target.tenant_id, &target.id).await?;
        debug!(path = %target.full_name, items, nodes, "Cleared object subtree");

        let bucket = match target.full_name.split_once('/') {
            Some((bucket, _)) => bucket,
            None => target.full_name.as_str(),
        };
        let records = match prefetched {
            Some(records) => records,
            None => conn.scan_path(&join_rel(bucket, base)).await?,
        };

        let mut nodes: HashMap<String, CatalogNode> = HashMap::new();
        nodes.insert(base.to_string(), target.clone());
        let mut aggregates: HashMap<String, NodeAggregate> = HashMap::new();
        let mut counts = ScanCounts::default();

        for mut record in records {
            record.relative_path = collapse_empty_segments(&record.relative_path);
            if has_reserved_segment(&record.relative_path) {
                counts.skipped += 1;
                continue;
            }
            if record.bucket != bucket || !is_within(base, &record.relative_path) {
                continue;
            }

            match record.kind {
                // Only the bucket's own record may describe the bucket root
                ObjectKind::Bucket => {
                    if base.is_empty() && record.relative_path.is_empty() {
                        let updated = self.set_attributes(target, storage_attributes(&record)).await?;
                        nodes.insert(base.to_string(), updated);
                    }
                }
                ObjectKind::Prefix if record.relative_path.is_empty() => {}
                ObjectKind::Prefix if record.relative_path == base => {
                    let updated = self.set_attributes(target, storage_attributes(&record)).await?;
                    nodes.insert(base.to_string(), updated);
                }
                ObjectKind::Prefix => {
                    self.ensure_prefix(&mut nodes, base, &record.relative_path, Some(storage_attributes(&record)))
                        .await?;
                }
                ObjectKind::Object => {
                    let dir = parent_dir(&record.relative_path);
                    if !is_within(base, dir) {
                        continue;
                    }
                    let parent = self.ensure_prefix(&mut nodes, base, dir, None).await?;
                    self.store.upsert_item(&object_item(&parent, &record)).await?;

                    let mut current = dir.to_string();
                    loop {
                        aggregates.entry(current.clone()).or_default().add_item(record.size_bytes);
                        if current == base {
                            break;
                        }
                        current = parent_dir(&current).to_string();
                    }
                    counts.items_scanned += 1;
                }
            }
        }

        for (rel, node) in &nodes {
            if rel != base {
                let aggregate = aggregates.get(rel).copied().unwrap_or_default();
                self.store
                    .finish_node_scan(node.tenant_id, &node.id, aggregate)
                    .await?;
            }
        }

        Ok((aggregates.get(base).copied().unwrap_or_default(), counts))
    }

    /// Find or create the prefix node for `rel` below `base`, creating any
    /// missing intermediate prefixes. `attributes` applies to `rel` only.
    async fn ensure_prefix(
        &self,
        nodes: &mut HashMap<String, CatalogNode>,
        base: &str,
        rel: &str,
        attributes: Option<NodeAttributes>,
    ) -> Result<CatalogNode> {
        let mut parent = nodes
            .get(base)
            .cloned()
            .ok_or_else(|| ScanError::internal(format!("subtree root '{}' not tracked", base)))?;
        if rel == base {
            return Ok(parent);
        }

        let suffix = if base.is_empty() { rel } else { &rel[base.len() + 1..] };
        let mut current = base.to_string();
        for segment in suffix.split('/') {
            current = join_rel(&current, segment);
            let is_leaf = current == rel;
            match nodes.get(&current) {
                Some(existing) if !(is_leaf && attributes.is_some()) => parent = existing.clone(),
                _ => {
                    let node = self
                        .store
                        .upsert_node(&NodeUpsert {
                            tenant_id: parent.tenant_id,
                            resource_id: parent.resource_id.clone(),
                            parent_id: Some(parent.id.clone()),
                            kind: NodeKind::Prefix,
                            name: segment.to_string(),
                            attributes: if is_leaf { attributes.clone() } else { None },
                        })
                        .await?;
                    nodes.insert(current.clone(), node.clone());
                    parent = node;
                }
            }
        }
        Ok(parent)
    }

    /// Bucket node followed by one prefix node per segment of `rel`.
    async fn ensure_chain(&self, bucket_node: &CatalogNode, rel: &str) -> Result<Vec<CatalogNode>> {
        let mut chain = vec![bucket_node.clone()];
        for segment in rel.split('/').filter(|s| !s.is_empty()) {
            let parent = &chain[chain.len() - 1];
            let node = self
                .store
                .upsert_node(&NodeUpsert {
                    tenant_id: parent.tenant_id,
                    resource_id: parent.resource_id.clone(),
                    parent_id: Some(parent.id.clone()),
                    kind: NodeKind::Prefix,
                    name: segment.to_string(),
                    attributes: None,
                })
                .await?;
            chain.push(node);
        }
        Ok(chain)
    }

    async fn set_attributes(&self, node: &CatalogNode, attributes: NodeAttributes) -> Result<CatalogNode> {
        Ok(self
            .store
            .upsert_node(&NodeUpsert {
                tenant_id: node.tenant_id,
                resource_id: node.resource_id.clone(),
                parent_id: node.parent_id.clone(),
                kind: node.kind,
                name: node.name.clone(),
                attributes: Some(attributes),
            })
            .await?)
    }

    /// Recompute recorded aggregates bottom-up along `chain` (root first).
    async fn roll_up(&self, chain: &[CatalogNode]) -> Result<()> {
        for node in chain.iter().rev() {
            let aggregate = self.store.sum_children(node.tenant_id, &node.id).await?;
            self.store
                .set_node_aggregate(node.tenant_id, &node.id, aggregate)
                .await?;
        }
        Ok(())
    }

    /// Replace exactly one object item and re-aggregate its ancestors.
    async fn refresh_object(
        &self,
        bucket_node: &CatalogNode,
        record: &ObjectMetadata,
    ) -> Result<ScanCounts> {
        let chain = self
            .ensure_chain(bucket_node, parent_dir(&record.relative_path))
            .await?;
        let parent = &chain[chain.len() - 1];
        let item = self.store.upsert_item(&object_item(parent, record)).await?;
        self.roll_up(&chain).await?;

        info!(object = %item.full_name, size = item.size_bytes, "Object refreshed");
        Ok(ScanCounts {
            namespaces_scanned: 1,
            items_scanned: 1,
            ..ScanCounts::default()
        })
    }

    /// Retire prefixes at the tail of `chain` that no longer hold anything,
    /// so the catalog matches what a full bucket pass would build. The bucket
    /// itself always stays. Retired nodes are popped off `chain`.
    async fn prune_empty_prefixes(&self, chain: &mut Vec<CatalogNode>) -> Result<usize> {
        let mut pruned = 0;
        while chain.len() > 1 {
            let Some(node) = chain.last() else { break };
            let tenant_id = node.tenant_id;
            let empty = self.store.list_child_nodes(tenant_id, &node.id).await?.is_empty()
                && self.store.list_items(tenant_id, &node.id).await?.is_empty();
            if !empty {
                break;
            }
            debug!(path = %node.full_name, "Retiring empty prefix");
            self.store.retire_node(tenant_id, &node.id).await?;
            chain.pop();
            pruned += 1;
        }
        Ok(pruned)
    }

    /// The path vanished upstream: drop the matching item or prefix subtree,
    /// then any ancestor prefix left empty by it.
    async fn forget_path(&self, bucket_node: &CatalogNode, key: &str) -> Result<ScanCounts> {
        let tenant_id = bucket_node.tenant_id;
        let mut chain = vec![bucket_node.clone()];
        for segment in parent_dir(key).split('/').filter(|s| !s.is_empty()) {
            let parent = &chain[chain.len() - 1];
            match self
                .store
                .get_node(tenant_id, &parent.resource_id, Some(&parent.id), NodeKind::Prefix, segment)
                .await?
            {
                Some(node) if node.deleted_at.is_none() => chain.push(node),
                _ => return Ok(ScanCounts::default()),
            }
        }

        let parent = chain[chain.len() - 1].clone();
        let name = leaf_name(key);
        let removed_item = self
            .store
            .delete_item(tenant_id, &parent.id, ItemKind::Object, name)
            .await?;
        let removed_prefix = match self
            .store
            .get_node(tenant_id, &parent.resource_id, Some(&parent.id), NodeKind::Prefix, name)
            .await?
        {
            Some(node) if node.deleted_at.is_none() => {
                self.store.retire_node(tenant_id, &node.id).await?;
                true
            }
            _ => false,
        };

        let pruned = self.prune_empty_prefixes(&mut chain).await?;
        if removed_item || removed_prefix || pruned > 0 {
            self.roll_up(&chain).await?;
            info!(
                path = %key,
                bucket = %bucket_node.name,
                pruned,
                "Removed vanished object path"
            );
        }
        Ok(ScanCounts {
            namespaces_scanned: 1,
            ..ScanCounts::default()
        })
    }
}
