use super::backend::{ListedObject, ObjectStorageBackend};
use super::{
    base_name, clean_path, content_type, file_type, has_reserved_segment, normalize_key,
    BUCKET_MARKER,
};
use crate::config::ConnectorTimeouts;
use crate::connector::ObjectStorageConnector;
use crate::error::{with_timeout, ConnectorError, Result};
use crate::types::{ObjectKind, ObjectMetadata, ObjectNode};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Object-storage connector over any [`ObjectStorageBackend`].
pub struct S3Connector<B> {
    backend: B,
    explicit_buckets: Vec<String>,
    discovered: OnceCell<Vec<String>>,
    timeouts: ConnectorTimeouts,
}

impl<B: ObjectStorageBackend> S3Connector<B> {
    /// `buckets` is the allow-list; empty means every bucket the
    /// credentials can see, discovered once and cached.
    pub fn new(backend: B, buckets: Vec<String>, timeouts: ConnectorTimeouts) -> Self {
        let mut explicit_buckets: Vec<String> = buckets
            .into_iter()
            .map(|b| clean_path(&b))
            .filter(|b| !b.is_empty())
            .collect();
        explicit_buckets.sort();
        explicit_buckets.dedup();

        Self {
            backend,
            explicit_buckets,
            discovered: OnceCell::new(),
            timeouts,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn buckets(&self) -> Result<&[String]> {
        if !self.explicit_buckets.is_empty() {
            return Ok(&self.explicit_buckets);
        }
        let discovered = self
            .discovered
            .get_or_try_init(|| async {
                let mut buckets = with_timeout("list buckets", self.timeouts.connect, async {
                    self.backend.list_buckets().await
                })
                .await?;
                buckets.retain(|b| !has_reserved_segment(b));
                buckets.sort();
                debug!(buckets = buckets.len(), "Discovered buckets");
                Ok::<_, ConnectorError>(buckets)
            })
            .await?;
        Ok(discovered)
    }

    /// Split `bucket/key`, rejecting buckets outside the allow-list.
    async fn split_path(&self, path: &str) -> Result<(String, String)> {
        let cleaned = clean_path(path);
        let (bucket, key) = match cleaned.split_once('/') {
            Some((bucket, key)) => (bucket.to_string(), key.to_string()),
            None => (cleaned.clone(), String::new()),
        };
        if !self.buckets().await?.contains(&bucket) {
            return Err(ConnectorError::BucketNotAllowed(bucket));
        }
        Ok((bucket, key))
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ListedObject>> {
        with_timeout("object walk", self.timeouts.object_walk, async {
            self.backend.list_objects(bucket, prefix).await
        })
        .await
    }

    /// Recursive walk of `bucket` below `prefix` (no trailing slash).
    async fn scan_bucket(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectMetadata>> {
        let list_prefix = if prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", prefix)
        };

        let mut objects: Vec<ListedObject> = self
            .list(bucket, &list_prefix)
            .await?
            .into_iter()
            .filter(|object| !object.key.ends_with('/'))
            .filter(|object| !has_reserved_segment(&object.key))
            .collect();
        objects.sort_by(|a, b| a.key.cmp(&b.key));

        let mut total_size = 0i64;
        let mut directories: BTreeMap<String, (i64, i64)> = BTreeMap::new();
        for object in &objects {
            total_size += object.size_bytes;
            let relative = &object.key[list_prefix.len()..];
            let segments: Vec<&str> = relative.split('/').filter(|s| !s.is_empty()).collect();
            for depth in 1..segments.len() {
                let dir = format!("{}{}", list_prefix, segments[..depth].join("/"));
                let entry = directories.entry(dir).or_insert((0, 0));
                entry.0 += object.size_bytes;
                entry.1 += 1;
            }
        }

        let mut records = Vec::with_capacity(objects.len() + directories.len() + 1);
        let (root_name, root_kind) = if prefix.is_empty() {
            (BUCKET_MARKER.to_string(), ObjectKind::Bucket)
        } else {
            (base_name(prefix).to_string(), ObjectKind::Prefix)
        };
        records.push(ObjectMetadata {
            bucket: bucket.to_string(),
            relative_path: prefix.to_string(),
            name: root_name,
            path: join(bucket, prefix),
            kind: root_kind,
            size_bytes: total_size,
            object_count: objects.len() as i64,
            file_type: None,
            content_type: None,
            etag: None,
            last_modified: objects.iter().filter_map(|o| o.last_modified).max(),
        });

        for (dir, (size_bytes, object_count)) in directories {
            records.push(ObjectMetadata {
                bucket: bucket.to_string(),
                name: base_name(&dir).to_string(),
                path: join(bucket, &dir),
                relative_path: dir,
                kind: ObjectKind::Prefix,
                size_bytes,
                object_count,
                file_type: None,
                content_type: None,
                etag: None,
                last_modified: None,
            });
        }

        records.extend(objects.into_iter().map(|object| object_record(bucket, object)));
        Ok(records)
    }
}

fn join(bucket: &str, key: &str) -> String {
    if key.is_empty() {
        bucket.to_string()
    } else {
        format!("{}/{}", bucket, key)
    }
}

/// `path` keeps the upstream key verbatim; `relative_path` drops empty
/// segments so `a//b.csv` and `/lead.csv` land under real prefixes.
fn object_record(bucket: &str, object: ListedObject) -> ObjectMetadata {
    let relative_path = normalize_key(&object.key);
    let name = base_name(&relative_path).to_string();
    ObjectMetadata {
        bucket: bucket.to_string(),
        path: join(bucket, &object.key),
        file_type: file_type(&name),
        content_type: content_type(&name),
        relative_path,
        name,
        kind: ObjectKind::Object,
        size_bytes: object.size_bytes,
        object_count: 1,
        etag: object.etag,
        last_modified: object.last_modified,
    }
}

#[async_trait]
impl<B: ObjectStorageBackend> ObjectStorageConnector for S3Connector<B> {
    async fn allowed_buckets(&self) -> Result<Vec<String>> {
        Ok(self.buckets().await?.to_vec())
    }

    async fn list_nodes(&self, path: &str) -> Result<Vec<ObjectNode>> {
        if clean_path(path).is_empty() {
            return Ok(self
                .buckets()
                .await?
                .iter()
                .map(|bucket| ObjectNode {
                    name: bucket.clone(),
                    path: bucket.clone(),
                    kind: ObjectKind::Bucket,
                    size_bytes: 0,
                    file_type: None,
                    last_modified: None,
                    object_count: 0,
                })
                .collect());
        }

        let (bucket, key) = self.split_path(path).await?;
        let list_prefix = if key.is_empty() {
            String::new()
        } else {
            format!("{}/", key)
        };

        let mut prefixes: BTreeMap<String, ObjectNode> = BTreeMap::new();
        let mut leaves = Vec::new();
        for object in self.list(&bucket, &list_prefix).await? {
            if has_reserved_segment(&object.key) {
                continue;
            }
            let relative = object.key[list_prefix.len()..].trim_start_matches('/');
            if relative.is_empty() {
                continue;
            }
            match relative.split_once('/') {
                Some((dir, _)) => {
                    let node = prefixes.entry(dir.to_string()).or_insert_with(|| ObjectNode {
                        name: dir.to_string(),
                        path: join(&bucket, &format!("{}{}", list_prefix, dir)),
                        kind: ObjectKind::Prefix,
                        size_bytes: 0,
                        file_type: None,
                        last_modified: None,
                        object_count: 0,
                    });
                    // Directory markers name a prefix but hold no data
                    if !object.key.ends_with('/') {
                        node.size_bytes += object.size_bytes;
                        node.object_count += 1;
                        node.last_modified = node.last_modified.max(object.last_modified);
                    }
                }
                None => leaves.push(ObjectNode {
                    path: join(&bucket, &object.key),
                    file_type: file_type(relative),
                    name: relative.to_string(),
                    kind: ObjectKind::Object,
                    size_bytes: object.size_bytes,
                    last_modified: object.last_modified,
                    object_count: 1,
                }),
            }
        }

        let mut nodes: Vec<ObjectNode> = prefixes.into_values().collect();
        nodes.extend(leaves);
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(nodes)
    }

    async fn scan_path(&self, path: &str) -> Result<Vec<ObjectMetadata>> {
        let cleaned = clean_path(path);
        if cleaned.is_empty() {
            let mut records = Vec::new();
            for bucket in self.buckets().await? {
                records.extend(self.scan_bucket(bucket, "").await?);
            }
            return Ok(records);
        }

        let (bucket, key) = self.split_path(&cleaned).await?;
        if key.is_empty() {
            return self.scan_bucket(&bucket, "").await;
        }
        if has_reserved_segment(&key) {
            warn!(bucket = %bucket, key = %key, "Refusing to scan reserved path");
            return Ok(Vec::new());
        }

        let head = with_timeout("stat object", self.timeouts.metadata_query, async {
            self.backend.head_object(&bucket, &key).await
        })
        .await?;

        match head {
            Some(object) => Ok(vec![object_record(&bucket, object)]),
            None => self.scan_bucket(&bucket, &key).await,
        }
    }

    async fn close(&self) {}
}
