use super::backend::{ListedObject, ObjectStorageBackend};
use crate::error::{ConnectorError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

type Buckets = BTreeMap<String, BTreeMap<String, ListedObject>>;

/// In-memory object store for tests.
///
/// Clones share state, so a test can keep a handle and mutate the store
/// while a connector reads from it.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    buckets: Arc<RwLock<Buckets>>,
    offline: Arc<AtomicBool>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_bucket(&self, bucket: &str) {
        let mut buckets = self.buckets.write().unwrap_or_else(|e| e.into_inner());
        buckets.entry(bucket.to_string()).or_default();
    }

    /// Insert or replace a key, creating the bucket when needed.
    pub fn put_object(&self, bucket: &str, key: &str, size_bytes: i64) {
        let mut buckets = self.buckets.write().unwrap_or_else(|e| e.into_inner());
        let etag = format!("\"{:x}\"", size_bytes.unsigned_abs() ^ key.len() as u64);
        buckets.entry(bucket.to_string()).or_default().insert(
            key.to_string(),
            ListedObject {
                key: key.to_string(),
                size_bytes,
                last_modified: Some(Utc::now()),
                etag: Some(etag),
            },
        );
    }

    pub fn remove_object(&self, bucket: &str, key: &str) -> bool {
        let mut buckets = self.buckets.write().unwrap_or_else(|e| e.into_inner());
        buckets
            .get_mut(bucket)
            .map(|objects| objects.remove(key).is_some())
            .unwrap_or(false)
    }

    /// Simulate an unreachable endpoint.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ConnectorError::connection("object store endpoint unreachable"));
        }
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Buckets>> {
        self.buckets
            .read()
            .map_err(|_| ConnectorError::enumeration("memory backend", "lock poisoned"))
    }
}

#[async_trait]
impl ObjectStorageBackend for MemoryBackend {
    async fn list_buckets(&self) -> Result<Vec<String>> {
        self.check_online()?;
        Ok(self.read()?.keys().cloned().collect())
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ListedObject>> {
        self.check_online()?;
        let buckets = self.read()?;
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| ConnectorError::enumeration(bucket, "bucket does not exist"))?;
        Ok(objects
            .values()
            .filter(|object| object.key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ListedObject>> {
        self.check_online()?;
        Ok(self
            .read()?
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .cloned())
    }
}
