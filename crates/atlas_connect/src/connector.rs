//! Connector capability traits, one per family, and the closed set of
//! connectors the factory can hand out.

use crate::error::Result;
use crate::kind::{ConnectorFamily, ResourceKind};
use crate::types::{FieldSummary, ObjectMetadata, ObjectNode, SchemaSummary, TableSummary};
use async_trait::async_trait;

/// Enumerates one SQL dialect's structure.
#[async_trait]
pub trait RelationalConnector: Send + Sync {
    /// Which dialect this connector speaks.
    fn kind(&self) -> ResourceKind;

    /// Top-level namespaces with best-effort table count and size.
    async fn list_schemas(&self) -> Result<Vec<SchemaSummary>>;

    async fn scan_tables(&self, schema: &str) -> Result<Vec<TableSummary>>;

    async fn scan_fields(&self, schema: &str, table: &str) -> Result<Vec<FieldSummary>>;

    /// Release the connection. Safe to call more than once.
    async fn close(&self);
}

/// Enumerates buckets, prefixes and objects of an S3-compatible store.
#[async_trait]
pub trait ObjectStorageConnector: Send + Sync {
    /// Explicit allow-list, or every bucket ListBuckets returns when unscoped.
    async fn allowed_buckets(&self) -> Result<Vec<String>>;

    /// One level of children below `path`; an empty path lists buckets.
    async fn list_nodes(&self, path: &str) -> Result<Vec<ObjectNode>>;

    /// Everything below `path`: one aggregate record per bucket/prefix plus
    /// one record per object. Reserved segments never appear.
    async fn scan_path(&self, path: &str) -> Result<Vec<ObjectMetadata>>;

    /// Release the client. Safe to call more than once.
    async fn close(&self);
}

pub enum Connector {
    Relational(Box<dyn RelationalConnector>),
    ObjectStorage(Box<dyn ObjectStorageConnector>),
}

impl Connector {
    pub fn family(&self) -> ConnectorFamily {
        match self {
            Self::Relational(_) => ConnectorFamily::Relational,
            Self::ObjectStorage(_) => ConnectorFamily::ObjectStorage,
        }
    }

    /// Names of the top-level namespaces: schemas, or allowed buckets.
    pub async fn list_namespaces(&self) -> Result<Vec<String>> {
        match self {
            Self::Relational(conn) => Ok(conn
                .list_schemas()
                .await?
                .into_iter()
                .map(|schema| schema.name)
                .collect()),
            Self::ObjectStorage(conn) => conn.allowed_buckets().await,
        }
    }

    pub async fn close(&self) {
        match self {
            Self::Relational(conn) => conn.close().await,
            Self::ObjectStorage(conn) => conn.close().await,
        }
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Relational(conn) => write!(f, "Connector::Relational({})", conn.kind()),
            Self::ObjectStorage(_) => write!(f, "Connector::ObjectStorage"),
        }
    }
}
