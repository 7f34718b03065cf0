//! What connectors report back to the reconciler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A top-level relational namespace (schema or database).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSummary {
    pub name: String,
    /// Best-effort, as reported by the source system
    pub table_count: Option<i64>,
    pub size_bytes: Option<i64>,
    pub charset: Option<String>,
    pub collation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSummary {
    pub name: String,
    /// Raw table type, e.g. `BASE TABLE`, `VIEW`
    pub kind: String,
    pub comment: Option<String>,
    pub row_count_estimate: Option<i64>,
    pub size_bytes: Option<i64>,
}

impl TableSummary {
    pub fn is_view(&self) -> bool {
        self.kind.to_uppercase().contains("VIEW")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSummary {
    pub name: String,
    pub ordinal: i32,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub comment: Option<String>,
    pub is_primary_key: bool,
    pub is_unique_key: bool,
    pub charset: Option<String>,
    pub collation: Option<String>,
    pub precision: Option<i64>,
    pub scale: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Bucket,
    Prefix,
    Object,
}

/// One child of a path, for browsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectNode {
    pub name: String,
    /// `bucket/relative/path`
    pub path: String,
    pub kind: ObjectKind,
    pub size_bytes: i64,
    pub file_type: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    /// Objects below a bucket/prefix; 1 for an object
    pub object_count: i64,
}

/// One record of a recursive scan: a bucket/prefix aggregate or an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    pub bucket: String,
    /// Key relative to the bucket; empty for the bucket record
    pub relative_path: String,
    pub name: String,
    /// `bucket/relative_path`
    pub path: String,
    pub kind: ObjectKind,
    /// Cumulative for buckets and prefixes
    pub size_bytes: i64,
    pub object_count: i64,
    pub file_type: Option<String>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}
