//! Item operations

use crate::error::{DbError, Result};
use crate::types::*;
use crate::CatalogDb;
use atlas_ids::{ItemId, NodeId, ResourceId, TenantId};
use sqlx::Row;

pub(crate) const ITEM_COLUMNS: &str = "id, tenant_id, resource_id, node_id, kind, name, full_name, status, \
     row_count, size_bytes, last_modified_at, attributes, sync_version";

impl CatalogDb {
    /// Insert or update an item by natural key under its node.
    ///
    /// Resource id and full name are taken from the owning node.
    pub async fn upsert_item(&self, input: &ItemUpsert) -> Result<CatalogItem> {
        let node = self
            .get_node_by_id(input.tenant_id, &input.node_id)
            .await?
            .ok_or_else(|| DbError::not_found(format!("node {}", input.node_id)))?;

        let full_name = format!("{}{}{}", node.full_name, node.kind.name_separator(), input.name);
        let attributes = serde_json::to_string(&input.attributes)?;
        let now = Self::now_millis();

        sqlx::query(
            r#"
            INSERT INTO catalog_items
                (id, tenant_id, resource_id, node_id, kind, name, full_name, row_count,
                 size_bytes, last_modified_at, attributes, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(tenant_id, resource_id, node_id, kind, name) DO UPDATE SET
                full_name = excluded.full_name,
                status = 'active',
                row_count = excluded.row_count,
                size_bytes = excluded.size_bytes,
                last_modified_at = excluded.last_modified_at,
                attributes = excluded.attributes,
                sync_version = catalog_items.sync_version + 1,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(ItemId::new().as_str())
        .bind(input.tenant_id.get())
        .bind(node.resource_id.as_str())
        .bind(node.id.as_str())
        .bind(input.kind.as_str())
        .bind(&input.name)
        .bind(&full_name)
        .bind(input.row_count)
        .bind(input.size_bytes)
        .bind(input.last_modified_at.map(|t| t.timestamp_millis()))
        .bind(&attributes)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_item(input.tenant_id, &node.id, input.kind, &input.name)
            .await?
            .ok_or_else(|| DbError::not_found(format!("item '{}' vanished after upsert", full_name)))
    }

    /// Fetch an item by natural key within its node.
    pub async fn get_item(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        kind: ItemKind,
        name: &str,
    ) -> Result<Option<CatalogItem>> {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM catalog_items WHERE tenant_id = ? AND node_id = ? AND kind = ? AND name = ?"
        ))
        .bind(tenant_id.get())
        .bind(node_id.as_str())
        .bind(kind.as_str())
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| self.row_to_item(&row)).transpose()
    }

    /// Items attached directly to a node.
    pub async fn list_items(&self, tenant_id: TenantId, node_id: &NodeId) -> Result<Vec<CatalogItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM catalog_items WHERE tenant_id = ? AND node_id = ? ORDER BY kind, name"
        ))
        .bind(tenant_id.get())
        .bind(node_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| self.row_to_item(row)).collect()
    }

    /// Every item of a resource.
    pub async fn list_resource_items(
        &self,
        tenant_id: TenantId,
        resource_id: &ResourceId,
    ) -> Result<Vec<CatalogItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM catalog_items WHERE tenant_id = ? AND resource_id = ? ORDER BY full_name"
        ))
        .bind(tenant_id.get())
        .bind(resource_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| self.row_to_item(row)).collect()
    }

    /// Hard-delete one item. Returns whether it existed.
    pub async fn delete_item(
        &self,
        tenant_id: TenantId,
        node_id: &NodeId,
        kind: ItemKind,
        name: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM catalog_items WHERE tenant_id = ? AND node_id = ? AND kind = ? AND name = ?",
        )
        .bind(tenant_id.get())
        .bind(node_id.as_str())
        .bind(kind.as_str())
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub(crate) fn row_to_item(&self, row: &sqlx::sqlite::SqliteRow) -> Result<CatalogItem> {
        let invalid = |e: atlas_ids::IdParseError| DbError::invalid_state(e.to_string());

        let id: String = row.get("id");
        let resource_id: String = row.get("resource_id");
        let node_id: String = row.get("node_id");
        let kind: String = row.get("kind");
        let status: String = row.get("status");
        let attributes: String = row.get("attributes");

        Ok(CatalogItem {
            id: ItemId::parse(&id).map_err(invalid)?,
            tenant_id: TenantId::new(row.get("tenant_id")),
            resource_id: ResourceId::parse(&resource_id).map_err(invalid)?,
            node_id: NodeId::parse(&node_id).map_err(invalid)?,
            kind: ItemKind::parse(&kind)
                .ok_or_else(|| DbError::invalid_state(format!("unknown item kind '{}'", kind)))?,
            name: row.get("name"),
            full_name: row.get("full_name"),
            status: EntityStatus::parse(&status)
                .ok_or_else(|| DbError::invalid_state(format!("unknown item status '{}'", status)))?,
            row_count: row.get("row_count"),
            size_bytes: row.get("size_bytes"),
            last_modified_at: Self::opt_datetime(row.get("last_modified_at")),
            attributes: serde_json::from_str(&attributes)?,
            sync_version: row.get("sync_version"),
        })
    }
}
