//! Node operations
//!
//! Nodes carry a materialized `path` of ancestor ids (`/root/child/`,
//! ending with the node's own id). Subtree reads and deletes are prefix
//! matches on that column.

use crate::error::{DbError, Result};
use crate::types::*;
use crate::CatalogDb;
use atlas_ids::{NodeId, ResourceId, TenantId};
use sqlx::{Row, Sqlite, Transaction};

const NODE_COLUMNS: &str = "id, tenant_id, resource_id, parent_id, kind, name, depth, path, \
     full_name, status, scan_status, scan_started_at, last_scan_at, item_count, \
     total_size_bytes, attributes, error_message, sync_version, deleted_at";

impl CatalogDb {
    // ========================================================================
    // Upsert / Lookup
    // ========================================================================

    /// Insert or update a node by natural key.
    ///
    /// Depth, path and full name are re-derived from the parent on every
    /// call. Upserting a soft-deleted node revives it.
    pub async fn upsert_node(&self, input: &NodeUpsert) -> Result<CatalogNode> {
        let parent = match &input.parent_id {
            Some(parent_id) => {
                let parent = self
                    .get_node_by_id(input.tenant_id, parent_id)
                    .await?
                    .ok_or_else(|| DbError::not_found(format!("parent node {}", parent_id)))?;
                if parent.resource_id != input.resource_id {
                    return Err(DbError::constraint(format!(
                        "parent node {} belongs to resource {}, not {}",
                        parent_id, parent.resource_id, input.resource_id
                    )));
                }
                Some(parent)
            }
            None => None,
        };

        let (depth, path_prefix, full_name) = match &parent {
            Some(parent) => (
                parent.depth + 1,
                parent.path.clone(),
                format!("{}{}{}", parent.full_name, input.kind.name_separator(), input.name),
            ),
            None => (1, "/".to_string(), input.name.clone()),
        };

        let new_id = NodeId::new();
        let insert_path = format!("{}{}/", path_prefix, new_id);
        let parent_key = input
            .parent_id
            .as_ref()
            .map(|id| id.as_str().to_string())
            .unwrap_or_default();
        let insert_attributes =
            serde_json::to_string(&input.attributes.clone().unwrap_or_default())?;
        let update_attributes = input
            .attributes
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let now = Self::now_millis();

        sqlx::query(
            r#"
            INSERT INTO catalog_nodes
                (id, tenant_id, resource_id, parent_id, parent_key, kind, name, depth, path,
                 full_name, attributes, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
            ON CONFLICT(tenant_id, resource_id, parent_key, kind, name) DO UPDATE SET
                depth = excluded.depth,
                path = ?13 || catalog_nodes.id || '/',
                full_name = excluded.full_name,
                attributes = COALESCE(?14, catalog_nodes.attributes),
                status = 'active',
                deleted_at = NULL,
                sync_version = catalog_nodes.sync_version + 1,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(new_id.as_str())
        .bind(input.tenant_id.get())
        .bind(input.resource_id.as_str())
        .bind(input.parent_id.as_ref().map(|id| id.as_str()))
        .bind(&parent_key)
        .bind(input.kind.as_str())
        .bind(&input.name)
        .bind(depth as i64)
        .bind(&insert_path)
        .bind(&full_name)
        .bind(&insert_attributes)
        .bind(now)
        .bind(&path_prefix)
        .bind(update_attributes)
        .execute(&self.pool)
        .await?;

        self.get_node(
            input.tenant_id,
            &input.resource_id,
            input.parent_id.as_ref(),
            input.kind,
            &input.name,
        )
        .await?
        .ok_or_else(|| DbError::not_found(format!("node '{}' vanished after upsert", full_name)))
    }

    /// Fetch a live node by natural key within its parent.
    pub async fn get_node(
        &self,
        tenant_id: TenantId,
        resource_id: &ResourceId,
        parent_id: Option<&NodeId>,
        kind: NodeKind,
        name: &str,
    ) -> Result<Option<CatalogNode>> {
        let row = sqlx::query(&format!(
            r#"SELECT {NODE_COLUMNS} FROM catalog_nodes
               WHERE tenant_id = ? AND resource_id = ? AND parent_key = ? AND kind = ? AND name = ?
                 AND deleted_at IS NULL"#
        ))
        .bind(tenant_id.get())
        .bind(resource_id.as_str())
        .bind(parent_id.map(|id| id.as_str()).unwrap_or(""))
        .bind(kind.as_str())
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| self.row_to_node(&row)).transpose()
    }

    /// Fetch a live node by id.
    pub async fn get_node_by_id(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
    ) -> Result<Option<CatalogNode>> {
        let row = sqlx::query(&format!(
            "SELECT {NODE_COLUMNS} FROM catalog_nodes WHERE tenant_id = ? AND id = ? AND deleted_at IS NULL"
        ))
        .bind(tenant_id.get())
        .bind(node_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| self.row_to_node(&row)).transpose()
    }

    async fn require_node(&self, tenant_id: TenantId, node_id: &NodeId) -> Result<CatalogNode> {
        self.get_node_by_id(tenant_id, node_id)
            .await?
            .ok_or_else(|| DbError::not_found(format!("node {}", node_id)))
    }

    // ========================================================================
    // Listing
    // ========================================================================

    /// Top-level nodes of a resource, optionally filtered by scan status.
    pub async fn list_root_nodes(
        &self,
        tenant_id: TenantId,
        resource_id: &ResourceId,
        scan_status: Option<ScanStatus>,
    ) -> Result<Vec<CatalogNode>> {
        let rows = sqlx::query(&format!(
            r#"SELECT {NODE_COLUMNS} FROM catalog_nodes
               WHERE tenant_id = ? AND resource_id = ? AND parent_id IS NULL
                 AND deleted_at IS NULL
                 AND (? IS NULL OR scan_status = ?)
               ORDER BY name"#
        ))
        .bind(tenant_id.get())
        .bind(resource_id.as_str())
        .bind(scan_status.map(|s| s.as_str()))
        .bind(scan_status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| self.row_to_node(row)).collect()
    }

    /// Direct children of a node.
    pub async fn list_child_nodes(
        &self,
        tenant_id: TenantId,
        parent_id: &NodeId,
    ) -> Result<Vec<CatalogNode>> {
        let rows = sqlx::query(&format!(
            r#"SELECT {NODE_COLUMNS} FROM catalog_nodes
               WHERE tenant_id = ? AND parent_id = ? AND deleted_at IS NULL
               ORDER BY kind, name"#
        ))
        .bind(tenant_id.get())
        .bind(parent_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| self.row_to_node(row)).collect()
    }

    /// Every node below `node_id` (path-prefix match, excluding the node itself).
    pub async fn list_descendant_nodes(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
    ) -> Result<Vec<CatalogNode>> {
        let node = self.require_node(tenant_id, node_id).await?;

        let rows = sqlx::query(&format!(
            r#"SELECT {NODE_COLUMNS} FROM catalog_nodes
               WHERE tenant_id = ? AND path LIKE ? || '%' AND id != ? AND deleted_at IS NULL
               ORDER BY depth, name"#
        ))
        .bind(tenant_id.get())
        .bind(&node.path)
        .bind(node.id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| self.row_to_node(row)).collect()
    }

    /// All live nodes of a resource, shallowest first.
    pub async fn list_resource_nodes(
        &self,
        tenant_id: TenantId,
        resource_id: &ResourceId,
    ) -> Result<Vec<CatalogNode>> {
        let rows = sqlx::query(&format!(
            r#"SELECT {NODE_COLUMNS} FROM catalog_nodes
               WHERE tenant_id = ? AND resource_id = ? AND deleted_at IS NULL
               ORDER BY depth, name"#
        ))
        .bind(tenant_id.get())
        .bind(resource_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| self.row_to_node(row)).collect()
    }

    // ========================================================================
    // Deletion
    // ========================================================================

    /// Hard-delete the items attached directly to a node.
    pub async fn delete_node_items(&self, tenant_id: TenantId, node_id: &NodeId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM catalog_items WHERE tenant_id = ? AND node_id = ?")
            .bind(tenant_id.get())
            .bind(node_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Hard-delete every item anywhere in the node's subtree, including its own.
    pub async fn delete_subtree_items(&self, tenant_id: TenantId, node_id: &NodeId) -> Result<u64> {
        let node = self.require_node(tenant_id, node_id).await?;

        let result = sqlx::query(
            r#"DELETE FROM catalog_items
               WHERE tenant_id = ?
                 AND node_id IN (SELECT id FROM catalog_nodes WHERE tenant_id = ? AND path LIKE ? || '%')"#,
        )
        .bind(tenant_id.get())
        .bind(tenant_id.get())
        .bind(&node.path)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Hard-delete all descendant nodes (the node itself is kept).
    ///
    /// Items hanging off those nodes are removed in the same transaction.
    pub async fn delete_descendant_nodes(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
    ) -> Result<u64> {
        let node = self.require_node(tenant_id, node_id).await?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"DELETE FROM catalog_items
               WHERE tenant_id = ?
                 AND node_id IN (SELECT id FROM catalog_nodes
                                 WHERE tenant_id = ? AND path LIKE ? || '%' AND id != ?)"#,
        )
        .bind(tenant_id.get())
        .bind(tenant_id.get())
        .bind(&node.path)
        .bind(node.id.as_str())
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            "DELETE FROM catalog_nodes WHERE tenant_id = ? AND path LIKE ? || '%' AND id != ?",
        )
        .bind(tenant_id.get())
        .bind(&node.path)
        .bind(node.id.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    /// Clear a subtree: all items in it and all descendant nodes, in one
    /// transaction. Returns (items deleted, nodes deleted).
    pub async fn clear_subtree(&self, tenant_id: TenantId, node_id: &NodeId) -> Result<(u64, u64)> {
        let node = self.require_node(tenant_id, node_id).await?;
        let mut tx = self.pool.begin().await?;
        let cleared = clear_below(&mut tx, &node).await?;
        tx.commit().await?;
        Ok(cleared)
    }

    /// Clear a node's subtree and soft-delete the node itself, atomically.
    pub async fn retire_node(&self, tenant_id: TenantId, node_id: &NodeId) -> Result<()> {
        let node = self.require_node(tenant_id, node_id).await?;
        let mut tx = self.pool.begin().await?;
        clear_below(&mut tx, &node).await?;

        let now = Self::now_millis();
        sqlx::query(
            r#"UPDATE catalog_nodes SET
                   status = 'deleted', deleted_at = ?, item_count = 0, total_size_bytes = 0,
                   scan_status = 'unscanned', updated_at = ?
               WHERE tenant_id = ? AND id = ?"#,
        )
        .bind(now)
        .bind(now)
        .bind(tenant_id.get())
        .bind(node_id.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    // ========================================================================
    // Scan Status
    // ========================================================================

    /// Mark a node `Scanning`, stamp the start time and clear any prior error.
    pub async fn begin_node_scan(&self, tenant_id: TenantId, node_id: &NodeId) -> Result<()> {
        let now = Self::now_millis();
        let result = sqlx::query(
            r#"UPDATE catalog_nodes SET
                   scan_status = 'scanning', scan_started_at = ?, error_message = NULL, updated_at = ?
               WHERE tenant_id = ? AND id = ? AND deleted_at IS NULL"#,
        )
        .bind(now)
        .bind(now)
        .bind(tenant_id.get())
        .bind(node_id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(format!("node {}", node_id)));
        }
        Ok(())
    }

    /// Write final aggregates and mark the node `Scanned`.
    pub async fn finish_node_scan(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        aggregate: NodeAggregate,
    ) -> Result<()> {
        let now = Self::now_millis();
        sqlx::query(
            r#"UPDATE catalog_nodes SET
                   scan_status = 'scanned', last_scan_at = ?, error_message = NULL,
                   item_count = ?, total_size_bytes = ?, updated_at = ?
               WHERE tenant_id = ? AND id = ?"#,
        )
        .bind(now)
        .bind(aggregate.item_count)
        .bind(aggregate.total_size_bytes)
        .bind(now)
        .bind(tenant_id.get())
        .bind(node_id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Return a node to `Unscanned` with the failure message. Aggregates are left alone.
    pub async fn fail_node_scan(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        error: &str,
    ) -> Result<()> {
        let now = Self::now_millis();
        sqlx::query(
            r#"UPDATE catalog_nodes SET
                   scan_status = 'unscanned', error_message = ?, updated_at = ?
               WHERE tenant_id = ? AND id = ?"#,
        )
        .bind(error)
        .bind(now)
        .bind(tenant_id.get())
        .bind(node_id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Overwrite a node's aggregates without touching its scan status.
    pub async fn set_node_aggregate(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        aggregate: NodeAggregate,
    ) -> Result<()> {
        sqlx::query(
            r#"UPDATE catalog_nodes SET item_count = ?, total_size_bytes = ?, updated_at = ?
               WHERE tenant_id = ? AND id = ?"#,
        )
        .bind(aggregate.item_count)
        .bind(aggregate.total_size_bytes)
        .bind(Self::now_millis())
        .bind(tenant_id.get())
        .bind(node_id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ========================================================================
    // Aggregates
    // ========================================================================

    /// Sum of the recorded aggregates of a node's children plus its direct items.
    pub async fn sum_children(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
    ) -> Result<NodeAggregate> {
        let row = sqlx::query(
            r#"SELECT
                   (SELECT COALESCE(SUM(item_count), 0) FROM catalog_nodes
                     WHERE tenant_id = ?1 AND parent_id = ?2 AND deleted_at IS NULL)
                 + (SELECT COUNT(*) FROM catalog_items WHERE tenant_id = ?1 AND node_id = ?2)
                   AS item_count,
                   (SELECT COALESCE(SUM(total_size_bytes), 0) FROM catalog_nodes
                     WHERE tenant_id = ?1 AND parent_id = ?2 AND deleted_at IS NULL)
                 + (SELECT COALESCE(SUM(size_bytes), 0) FROM catalog_items
                     WHERE tenant_id = ?1 AND node_id = ?2)
                   AS total_size_bytes"#,
        )
        .bind(tenant_id.get())
        .bind(node_id.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(NodeAggregate {
            item_count: row.get("item_count"),
            total_size_bytes: row.get("total_size_bytes"),
        })
    }

    /// Count and size of every item in a node's subtree, straight from the items table.
    pub async fn aggregate_subtree(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
    ) -> Result<NodeAggregate> {
        let node = self.require_node(tenant_id, node_id).await?;
        let row = sqlx::query(
            r#"SELECT COUNT(i.id) AS item_count, COALESCE(SUM(i.size_bytes), 0) AS total_size_bytes
               FROM catalog_items i
               JOIN catalog_nodes n ON n.id = i.node_id
               WHERE i.tenant_id = ? AND n.tenant_id = ? AND n.path LIKE ? || '%'
                 AND n.deleted_at IS NULL"#,
        )
        .bind(tenant_id.get())
        .bind(tenant_id.get())
        .bind(&node.path)
        .fetch_one(&self.pool)
        .await?;

        Ok(NodeAggregate {
            item_count: row.get("item_count"),
            total_size_bytes: row.get("total_size_bytes"),
        })
    }

    fn row_to_node(&self, row: &sqlx::sqlite::SqliteRow) -> Result<CatalogNode> {
        let invalid = |e: atlas_ids::IdParseError| DbError::invalid_state(e.to_string());

        let id: String = row.get("id");
        let resource_id: String = row.get("resource_id");
        let parent_id: Option<String> = row.get("parent_id");
        let kind: String = row.get("kind");
        let status: String = row.get("status");
        let scan_status: String = row.get("scan_status");
        let attributes: String = row.get("attributes");

        Ok(CatalogNode {
            id: NodeId::parse(&id).map_err(invalid)?,
            tenant_id: TenantId::new(row.get("tenant_id")),
            resource_id: ResourceId::parse(&resource_id).map_err(invalid)?,
            parent_id: parent_id
                .as_deref()
                .map(NodeId::parse)
                .transpose()
                .map_err(invalid)?,
            kind: NodeKind::parse(&kind)
                .ok_or_else(|| DbError::invalid_state(format!("unknown node kind '{}'", kind)))?,
            name: row.get("name"),
            depth: row.get::<i64, _>("depth") as u32,
            path: row.get("path"),
            full_name: row.get("full_name"),
            status: EntityStatus::parse(&status)
                .ok_or_else(|| DbError::invalid_state(format!("unknown node status '{}'", status)))?,
            scan_status: ScanStatus::parse(&scan_status).ok_or_else(|| {
                DbError::invalid_state(format!("unknown scan status '{}'", scan_status))
            })?,
            scan_started_at: Self::opt_datetime(row.get("scan_started_at")),
            last_scan_at: Self::opt_datetime(row.get("last_scan_at")),
            item_count: row.get("item_count"),
            total_size_bytes: row.get("total_size_bytes"),
            attributes: serde_json::from_str(&attributes)?,
            error_message: row.get("error_message"),
            sync_version: row.get("sync_version"),
            deleted_at: Self::opt_datetime(row.get("deleted_at")),
        })
    }
}

/// Items of `node`'s subtree plus every descendant node. The node row stays.
async fn clear_below(
    tx: &mut Transaction<'_, Sqlite>,
    node: &CatalogNode,
) -> Result<(u64, u64)> {
    let tenant = node.tenant_id.get();

    let items = sqlx::query(
        r#"DELETE FROM catalog_items
           WHERE tenant_id = ?
             AND node_id IN (SELECT id FROM catalog_nodes WHERE tenant_id = ? AND path LIKE ? || '%')"#,
    )
    .bind(tenant)
    .bind(tenant)
    .bind(&node.path)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    let nodes = sqlx::query(
        "DELETE FROM catalog_nodes WHERE tenant_id = ? AND path LIKE ? || '%' AND id != ?",
    )
    .bind(tenant)
    .bind(&node.path)
    .bind(node.id.as_str())
    .execute(&mut **tx)
    .await?
    .rows_affected();

    Ok((items, nodes))
}
