//! The catalog store interface handed to the reconciler and orchestrator.
//!
//! Every operation takes the tenant explicitly. Implementations must never
//! return or touch rows belonging to another tenant.

use crate::error::Result;
use crate::types::*;
use crate::CatalogDb;
use async_trait::async_trait;
use atlas_ids::{ExternalResourceId, NodeId, ResourceId, ScanRunId, TenantId};

#[async_trait]
pub trait CatalogStore: Send + Sync {
    // Resources
    async fn upsert_resource(&self, input: &ResourceUpsert) -> Result<CatalogResource>;
    async fn get_resource(
        &self,
        tenant_id: TenantId,
        external_id: ExternalResourceId,
    ) -> Result<Option<CatalogResource>>;
    async fn list_resources(&self, tenant_id: TenantId) -> Result<Vec<CatalogResource>>;
    async fn resource_stats(&self, tenant_id: TenantId) -> Result<Vec<ResourceStats>>;

    // Nodes
    async fn upsert_node(&self, input: &NodeUpsert) -> Result<CatalogNode>;
    async fn get_node(
        &self,
        tenant_id: TenantId,
        resource_id: &ResourceId,
        parent_id: Option<&NodeId>,
        kind: NodeKind,
        name: &str,
    ) -> Result<Option<CatalogNode>>;
    async fn get_node_by_id(&self, tenant_id: TenantId, node_id: &NodeId)
        -> Result<Option<CatalogNode>>;
    async fn list_root_nodes(
        &self,
        tenant_id: TenantId,
        resource_id: &ResourceId,
        scan_status: Option<ScanStatus>,
    ) -> Result<Vec<CatalogNode>>;
    async fn list_child_nodes(&self, tenant_id: TenantId, parent_id: &NodeId)
        -> Result<Vec<CatalogNode>>;
    async fn list_descendant_nodes(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
    ) -> Result<Vec<CatalogNode>>;
    async fn list_resource_nodes(
        &self,
        tenant_id: TenantId,
        resource_id: &ResourceId,
    ) -> Result<Vec<CatalogNode>>;

    // Subtree maintenance
    async fn delete_node_items(&self, tenant_id: TenantId, node_id: &NodeId) -> Result<u64>;
    async fn delete_subtree_items(&self, tenant_id: TenantId, node_id: &NodeId) -> Result<u64>;
    async fn delete_descendant_nodes(&self, tenant_id: TenantId, node_id: &NodeId) -> Result<u64>;
    async fn clear_subtree(&self, tenant_id: TenantId, node_id: &NodeId) -> Result<(u64, u64)>;
    async fn retire_node(&self, tenant_id: TenantId, node_id: &NodeId) -> Result<()>;

    // Scan status and aggregates
    async fn begin_node_scan(&self, tenant_id: TenantId, node_id: &NodeId) -> Result<()>;
    async fn finish_node_scan(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        aggregate: NodeAggregate,
    ) -> Result<()>;
    async fn fail_node_scan(&self, tenant_id: TenantId, node_id: &NodeId, error: &str)
        -> Result<()>;
    async fn set_node_aggregate(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        aggregate: NodeAggregate,
    ) -> Result<()>;
    async fn sum_children(&self, tenant_id: TenantId, node_id: &NodeId) -> Result<NodeAggregate>;
    async fn aggregate_subtree(&self, tenant_id: TenantId, node_id: &NodeId)
        -> Result<NodeAggregate>;

    // Items
    async fn upsert_item(&self, input: &ItemUpsert) -> Result<CatalogItem>;
    async fn get_item(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        kind: ItemKind,
        name: &str,
    ) -> Result<Option<CatalogItem>>;
    async fn list_items(&self, tenant_id: TenantId, node_id: &NodeId) -> Result<Vec<CatalogItem>>;
    async fn list_resource_items(
        &self,
        tenant_id: TenantId,
        resource_id: &ResourceId,
    ) -> Result<Vec<CatalogItem>>;
    async fn delete_item(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        kind: ItemKind,
        name: &str,
    ) -> Result<bool>;

    // Search and stats
    async fn search_items(&self, tenant_id: TenantId, keyword: &str, limit: u32)
        -> Result<Vec<CatalogItem>>;
    async fn search_fields(&self, tenant_id: TenantId, keyword: &str, limit: u32)
        -> Result<Vec<FieldMatch>>;
    async fn metadata_stats(&self, tenant_id: TenantId) -> Result<MetadataStats>;

    // Scan runs
    async fn create_scan_run(&self, input: &NewScanRun) -> Result<ScanRun>;
    async fn finish_scan_run(
        &self,
        tenant_id: TenantId,
        run_id: &ScanRunId,
        status: RunStatus,
        error_message: Option<&str>,
        counts: ScanCounts,
    ) -> Result<ScanRun>;
    async fn get_scan_run(&self, tenant_id: TenantId, run_id: &ScanRunId)
        -> Result<Option<ScanRun>>;
    async fn list_scan_runs(&self, tenant_id: TenantId, limit: u32) -> Result<Vec<ScanRun>>;
}

#[async_trait]
impl CatalogStore for CatalogDb {
    async fn upsert_resource(&self, input: &ResourceUpsert) -> Result<CatalogResource> {
        CatalogDb::upsert_resource(self, input).await
    }

    async fn get_resource(
        &self,
        tenant_id: TenantId,
        external_id: ExternalResourceId,
    ) -> Result<Option<CatalogResource>> {
        CatalogDb::get_resource(self, tenant_id, external_id).await
    }

    async fn list_resources(&self, tenant_id: TenantId) -> Result<Vec<CatalogResource>> {
        CatalogDb::list_resources(self, tenant_id).await
    }

    async fn resource_stats(&self, tenant_id: TenantId) -> Result<Vec<ResourceStats>> {
        CatalogDb::resource_stats(self, tenant_id).await
    }

    async fn upsert_node(&self, input: &NodeUpsert) -> Result<CatalogNode> {
        CatalogDb::upsert_node(self, input).await
    }

    async fn get_node(
        &self,
        tenant_id: TenantId,
        resource_id: &ResourceId,
        parent_id: Option<&NodeId>,
        kind: NodeKind,
        name: &str,
    ) -> Result<Option<CatalogNode>> {
        CatalogDb::get_node(self, tenant_id, resource_id, parent_id, kind, name).await
    }

    async fn get_node_by_id(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
    ) -> Result<Option<CatalogNode>> {
        CatalogDb::get_node_by_id(self, tenant_id, node_id).await
    }

    async fn list_root_nodes(
        &self,
        tenant_id: TenantId,
        resource_id: &ResourceId,
        scan_status: Option<ScanStatus>,
    ) -> Result<Vec<CatalogNode>> {
        CatalogDb::list_root_nodes(self, tenant_id, resource_id, scan_status).await
    }

    async fn list_child_nodes(
        &self,
        tenant_id: TenantId,
        parent_id: &NodeId,
    ) -> Result<Vec<CatalogNode>> {
        CatalogDb::list_child_nodes(self, tenant_id, parent_id).await
    }

    async fn list_descendant_nodes(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
    ) -> Result<Vec<CatalogNode>> {
        CatalogDb::list_descendant_nodes(self, tenant_id, node_id).await
    }

    async fn list_resource_nodes(
        &self,
        tenant_id: TenantId,
        resource_id: &ResourceId,
    ) -> Result<Vec<CatalogNode>> {
        CatalogDb::list_resource_nodes(self, tenant_id, resource_id).await
    }

    async fn delete_node_items(&self, tenant_id: TenantId, node_id: &NodeId) -> Result<u64> {
        CatalogDb::delete_node_items(self, tenant_id, node_id).await
    }

    async fn delete_subtree_items(&self, tenant_id: TenantId, node_id: &NodeId) -> Result<u64> {
        CatalogDb::delete_subtree_items(self, tenant_id, node_id).await
    }

    async fn delete_descendant_nodes(&self, tenant_id: TenantId, node_id: &NodeId) -> Result<u64> {
        CatalogDb::delete_descendant_nodes(self, tenant_id, node_id).await
    }

    async fn clear_subtree(&self, tenant_id: TenantId, node_id: &NodeId) -> Result<(u64, u64)> {
        CatalogDb::clear_subtree(self, tenant_id, node_id).await
    }

    async fn retire_node(&self, tenant_id: TenantId, node_id: &NodeId) -> Result<()> {
        CatalogDb::retire_node(self, tenant_id, node_id).await
    }

    async fn begin_node_scan(&self, tenant_id: TenantId, node_id: &NodeId) -> Result<()> {
        CatalogDb::begin_node_scan(self, tenant_id, node_id).await
    }

    async fn finish_node_scan(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        aggregate: NodeAggregate,
    ) -> Result<()> {
        CatalogDb::finish_node_scan(self, tenant_id, node_id, aggregate).await
    }

    async fn fail_node_scan(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        error: &str,
    ) -> Result<()> {
        CatalogDb::fail_node_scan(self, tenant_id, node_id, error).await
    }

    async fn set_node_aggregate(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        aggregate: NodeAggregate,
    ) -> Result<()> {
        CatalogDb::set_node_aggregate(self, tenant_id, node_id, aggregate).await
    }

    async fn sum_children(&self, tenant_id: TenantId, node_id: &NodeId) -> Result<NodeAggregate> {
        CatalogDb::sum_children(self, tenant_id, node_id).await
    }

    async fn aggregate_subtree(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
    ) -> Result<NodeAggregate> {
        CatalogDb::aggregate_subtree(self, tenant_id, node_id).await
    }

    async fn upsert_item(&self, input: &ItemUpsert) -> Result<CatalogItem> {
        CatalogDb::upsert_item(self, input).await
    }

    async fn get_item(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        kind: ItemKind,
        name: &str,
    ) -> Result<Option<CatalogItem>> {
        CatalogDb::get_item(self, tenant_id, node_id, kind, name).await
    }

    async fn list_items(&self, tenant_id: TenantId, node_id: &NodeId) -> Result<Vec<CatalogItem>> {
        CatalogDb::list_items(self, tenant_id, node_id).await
    }

    async fn list_resource_items(
        &self,
        tenant_id: TenantId,
        resource_id: &ResourceId,
    ) -> Result<Vec<CatalogItem>> {
        CatalogDb::list_resource_items(self, tenant_id, resource_id).await
    }

    async fn delete_item(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        kind: ItemKind,
        name: &str,
    ) -> Result<bool> {
        CatalogDb::delete_item(self, tenant_id, node_id, kind, name).await
    }

    async fn search_items(
        &self,
        tenant_id: TenantId,
        keyword: &str,
        limit: u32,
    ) -> Result<Vec<CatalogItem>> {
        CatalogDb::search_items(self, tenant_id, keyword, limit).await
    }

    async fn search_fields(
        &self,
        tenant_id: TenantId,
        keyword: &str,
        limit: u32,
    ) -> Result<Vec<FieldMatch>> {
        CatalogDb::search_fields(self, tenant_id, keyword, limit).await
    }

    async fn metadata_stats(&self, tenant_id: TenantId) -> Result<MetadataStats> {
        CatalogDb::metadata_stats(self, tenant_id).await
    }

    async fn create_scan_run(&self, input: &NewScanRun) -> Result<ScanRun> {
        CatalogDb::create_scan_run(self, input).await
    }

    async fn finish_scan_run(
        &self,
        tenant_id: TenantId,
        run_id: &ScanRunId,
        status: RunStatus,
        error_message: Option<&str>,
        counts: ScanCounts,
    ) -> Result<ScanRun> {
        CatalogDb::finish_scan_run(self, tenant_id, run_id, status, error_message, counts).await
    }

    async fn get_scan_run(
        &self,
        tenant_id: TenantId,
        run_id: &ScanRunId,
    ) -> Result<Option<ScanRun>> {
        CatalogDb::get_scan_run(self, tenant_id, run_id).await
    }

    async fn list_scan_runs(&self, tenant_id: TenantId, limit: u32) -> Result<Vec<ScanRun>> {
        CatalogDb::list_scan_runs(self, tenant_id, limit).await
    }
}
