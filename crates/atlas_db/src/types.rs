//! Catalog entity types.
//!
//! Resource, Node and Item mirror the structure of an external storage
//! system. Attribute payloads are typed per shape and stored as JSON.

use atlas_ids::{ExternalResourceId, ItemId, NodeId, ResourceId, ScanRunId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ============================================================================
// Status Enums
// ============================================================================

/// Lifecycle status shared by resources, nodes and items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
    #[default]
    Active,
    Inactive,
    Deleted,
}

impl EntityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Scan status of a node subtree.
///
/// `Unscanned → Scanning → Scanned`, or back to `Unscanned` with an error
/// message when the scan fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    #[default]
    Unscanned,
    Scanning,
    Scanned,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unscanned => "unscanned",
            Self::Scanning => "scanning",
            Self::Scanned => "scanned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "unscanned" => Some(Self::Unscanned),
            "scanning" => Some(Self::Scanning),
            "scanned" => Some(Self::Scanned),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of hierarchy level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Postgres-style schema
    Schema,
    /// MySQL-style database
    Database,
    Bucket,
    Prefix,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Schema => "schema",
            Self::Database => "database",
            Self::Bucket => "bucket",
            Self::Prefix => "prefix",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "schema" => Some(Self::Schema),
            "database" => Some(Self::Database),
            "bucket" => Some(Self::Bucket),
            "prefix" => Some(Self::Prefix),
            _ => None,
        }
    }

    /// Separator used when building materialized full names.
    pub fn name_separator(&self) -> &'static str {
        match self {
            Self::Schema | Self::Database => ".",
            Self::Bucket | Self::Prefix => "/",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of leaf entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Table,
    View,
    Object,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::View => "view",
            Self::Object => "object",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(Self::Table),
            "view" => Some(Self::View),
            "object" => Some(Self::Object),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Attributes
// ============================================================================

/// Shape-specific metadata attached to a node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum NodeAttributes {
    #[default]
    Empty,
    /// Relational schema/database as reported by the source system.
    Namespace {
        #[serde(default)]
        reported_table_count: Option<i64>,
        #[serde(default)]
        reported_size_bytes: Option<i64>,
        #[serde(default)]
        charset: Option<String>,
        #[serde(default)]
        collation: Option<String>,
    },
    /// Bucket or prefix aggregate record from a recursive listing.
    Storage {
        reported_object_count: i64,
        reported_size_bytes: i64,
        #[serde(default)]
        last_modified_at: Option<DateTime<Utc>>,
    },
    /// Connector-specific metadata with no fixed shape.
    Extra { values: BTreeMap<String, Value> },
}

/// Shape-specific metadata attached to an item.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ItemAttributes {
    #[default]
    Empty,
    RelationalTable(TableAttributes),
    Object(ObjectAttributes),
    /// Connector-specific metadata with no fixed shape.
    Extra { values: BTreeMap<String, Value> },
}

impl ItemAttributes {
    /// Number of columns recorded for a relational table.
    pub fn field_count(&self) -> usize {
        match self {
            Self::RelationalTable(table) => table.fields.len(),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableAttributes {
    /// Raw table type reported by the source (e.g. `BASE TABLE`).
    pub table_type: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub fields: Vec<ColumnAttribute>,
}

/// One column of a relational table, stored inline on the table item.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnAttribute {
    pub name: String,
    pub ordinal: i32,
    pub data_type: String,
    pub nullable: bool,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub is_unique_key: bool,
    #[serde(default)]
    pub charset: Option<String>,
    #[serde(default)]
    pub collation: Option<String>,
    #[serde(default)]
    pub precision: Option<i64>,
    #[serde(default)]
    pub scale: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectAttributes {
    /// Lower-cased file extension, if any.
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub etag: Option<String>,
}

// ============================================================================
// Resource
// ============================================================================

/// Catalog-side registration of an external storage system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogResource {
    pub id: ResourceId,
    pub tenant_id: TenantId,
    pub external_id: ExternalResourceId,
    /// Canonical resource kind (`postgres`, `mysql`, `s3`)
    pub kind: String,
    /// Kind string as declared by the owning system (`minio`, `postgresql`, ...)
    pub engine: String,
    pub name: String,
    /// Connection attributes with credentials stripped
    pub config: serde_json::Map<String, Value>,
    pub status: EntityStatus,
    pub sync_version: i64,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for `upsert_resource`.
#[derive(Debug, Clone)]
pub struct ResourceUpsert {
    pub tenant_id: TenantId,
    pub external_id: ExternalResourceId,
    pub kind: String,
    pub engine: String,
    pub name: String,
    pub config: serde_json::Map<String, Value>,
    pub status: EntityStatus,
}

/// Root-node scan counts for one resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStats {
    pub resource: CatalogResource,
    pub total_nodes: i64,
    pub scanned_nodes: i64,
    pub unscanned_nodes: i64,
    pub last_scan_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Node
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogNode {
    pub id: NodeId,
    pub tenant_id: TenantId,
    pub resource_id: ResourceId,
    pub parent_id: Option<NodeId>,
    pub kind: NodeKind,
    pub name: String,
    /// Root = 1
    pub depth: u32,
    /// Ancestor ids including this node's own id, `/a/b/c/`
    pub path: String,
    pub full_name: String,
    pub status: EntityStatus,
    pub scan_status: ScanStatus,
    pub scan_started_at: Option<DateTime<Utc>>,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub item_count: i64,
    pub total_size_bytes: i64,
    pub attributes: NodeAttributes,
    pub error_message: Option<String>,
    pub sync_version: i64,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl CatalogNode {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Input for `upsert_node`. The natural key is
/// (tenant, resource, parent, kind, name).
#[derive(Debug, Clone)]
pub struct NodeUpsert {
    pub tenant_id: TenantId,
    pub resource_id: ResourceId,
    pub parent_id: Option<NodeId>,
    pub kind: NodeKind,
    pub name: String,
    /// `None` keeps whatever attributes the node already has.
    pub attributes: Option<NodeAttributes>,
}

/// Rolled-up item statistics for a node subtree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeAggregate {
    pub item_count: i64,
    pub total_size_bytes: i64,
}

impl NodeAggregate {
    pub fn add_item(&mut self, size_bytes: i64) {
        self.item_count += 1;
        self.total_size_bytes += size_bytes;
    }
}

impl std::ops::AddAssign for NodeAggregate {
    fn add_assign(&mut self, other: Self) {
        self.item_count += other.item_count;
        self.total_size_bytes += other.total_size_bytes;
    }
}

// ============================================================================
// Item
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub id: ItemId,
    pub tenant_id: TenantId,
    pub resource_id: ResourceId,
    pub node_id: NodeId,
    pub kind: ItemKind,
    pub name: String,
    pub full_name: String,
    pub status: EntityStatus,
    /// Relational row estimate
    pub row_count: Option<i64>,
    pub size_bytes: i64,
    pub last_modified_at: Option<DateTime<Utc>>,
    pub attributes: ItemAttributes,
    pub sync_version: i64,
}

/// Input for `upsert_item`. The natural key is
/// (tenant, resource, node, kind, name); tenant and resource come from the node.
#[derive(Debug, Clone)]
pub struct ItemUpsert {
    pub tenant_id: TenantId,
    pub node_id: NodeId,
    pub kind: ItemKind,
    pub name: String,
    pub row_count: Option<i64>,
    pub size_bytes: i64,
    pub last_modified_at: Option<DateTime<Utc>>,
    pub attributes: ItemAttributes,
}

// ============================================================================
// Search and Stats
// ============================================================================

/// A column matched by keyword, with the table that holds it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMatch {
    pub item_id: ItemId,
    pub resource_id: ResourceId,
    /// `schema.table` of the owning item
    pub table_full_name: String,
    pub field: ColumnAttribute,
}

/// Catalog-wide counts for one tenant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataStats {
    pub resource_count: i64,
    /// Live top-level nodes: schemas, databases and buckets
    pub namespace_count: i64,
    pub scanned_namespace_count: i64,
    /// Tables and views
    pub table_count: i64,
    pub field_count: i64,
    pub object_count: i64,
    pub total_size_bytes: i64,
}

// ============================================================================
// Scan Runs
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Caller-driven scan of one resource
    Manual,
    /// Scan-all-unscanned discovery pass
    Auto,
}

impl ScanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Auto => "auto",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "manual" => Some(Self::Manual),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Counters accumulated over a scan run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanCounts {
    pub namespaces_scanned: u64,
    pub items_scanned: u64,
    pub fields_scanned: u64,
    /// Entities or namespaces skipped after a non-fatal error
    pub skipped: u64,
}

impl std::ops::AddAssign for ScanCounts {
    fn add_assign(&mut self, other: Self) {
        self.namespaces_scanned += other.namespaces_scanned;
        self.items_scanned += other.items_scanned;
        self.fields_scanned += other.fields_scanned;
        self.skipped += other.skipped;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRun {
    pub id: ScanRunId,
    pub tenant_id: TenantId,
    pub external_resource_id: Option<ExternalResourceId>,
    pub mode: ScanMode,
    /// Requested namespaces or paths; empty means "everything"
    pub targets: Vec<String>,
    pub status: RunStatus,
    pub error_message: Option<String>,
    pub counts: ScanCounts,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

/// Input for `create_scan_run`.
#[derive(Debug, Clone)]
pub struct NewScanRun {
    pub tenant_id: TenantId,
    pub external_resource_id: Option<ExternalResourceId>,
    pub mode: ScanMode,
    pub targets: Vec<String>,
}
