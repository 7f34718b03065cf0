//! S3-compatible object storage: the raw backend seam, an in-memory backend
//! for tests, the AWS SDK backend, and the connector that turns flat key
//! listings into bucket/prefix/object records.

mod backend;
mod connector;
mod memory;
mod s3;

pub use backend::{ListedObject, ObjectStorageBackend};
pub use connector::S3Connector;
pub use memory::MemoryBackend;
pub use s3::S3Backend;

use std::path::Path;

/// Name of the record describing a bucket's own aggregate.
pub const BUCKET_MARKER: &str = "__bucket__";

/// Path segments that belong to storage infrastructure, never user content.
pub const RESERVED_SEGMENTS: &[&str] = &[BUCKET_MARKER, ".minio.sys"];

/// True when any `/`-separated segment of `key` is reserved.
pub fn has_reserved_segment(key: &str) -> bool {
    key.split('/').any(|segment| RESERVED_SEGMENTS.contains(&segment))
}

/// Trim blanks and slashes, collapse empty segments.
pub(crate) fn clean_path(path: &str) -> String {
    path.trim()
        .split('/')
        .filter(|segment| !segment.trim().is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Object key with empty segments dropped. Unlike [`clean_path`] blanks
/// inside a segment are kept, since they are part of the key.
pub(crate) fn normalize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Lower-cased extension without the dot.
pub(crate) fn file_type(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .filter(|ext| !ext.is_empty())
}

pub(crate) fn content_type(name: &str) -> Option<String> {
    mime_guess::from_path(name).first_raw().map(str::to_string)
}

/// Last segment of a key.
pub(crate) fn base_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}
