use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// One key as returned by a flat listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedObject {
    /// Full key within the bucket
    pub key: String,
    pub size_bytes: i64,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
}

/// Raw bucket access. Implementations know nothing about prefixes as
/// entities; they only list and stat keys.
#[async_trait]
pub trait ObjectStorageBackend: Send + Sync + 'static {
    async fn list_buckets(&self) -> Result<Vec<String>>;

    /// Every key starting with `prefix`, recursively, in any order.
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ListedObject>>;

    /// Returns `None` when the key does not exist.
    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ListedObject>>;
}
