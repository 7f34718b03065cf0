//! Connectors for the Atlas catalog.
//!
//! A connector enumerates the structure of one external system:
//! schemas/tables/fields for relational databases, buckets/prefixes/objects
//! for S3-compatible storage. Connectors never write to the catalog.

pub mod config;
pub mod connector;
pub mod descriptor;
pub mod error;
pub mod factory;
pub mod kind;
pub mod object_storage;
pub mod relational;
pub mod types;

pub use config::ConnectorTimeouts;
pub use connector::{Connector, ObjectStorageConnector, RelationalConnector};
pub use descriptor::{
    is_secret_key, sanitize_attributes, Attributes, ConnectionDescriptor, RelationalSettings,
    S3Settings, LOCALHOST_ALIAS_ENV,
};
pub use error::{ConnectorError, Result};
pub use factory::{ConnectorFactory, DefaultConnectorFactory};
pub use kind::{ConnectorFamily, ResourceKind};
pub use object_storage::{
    has_reserved_segment, ListedObject, MemoryBackend, ObjectStorageBackend, S3Backend,
    S3Connector, BUCKET_MARKER, RESERVED_SEGMENTS,
};
pub use relational::{MySqlConnector, PostgresConnector};
pub use types::{FieldSummary, ObjectKind, ObjectMetadata, ObjectNode, SchemaSummary, TableSummary};
