//! Resource operations

use crate::error::{DbError, Result};
use crate::types::*;
use crate::CatalogDb;
use atlas_ids::{ExternalResourceId, ResourceId, TenantId};
use sqlx::Row;

const RESOURCE_COLUMNS: &str = "id, tenant_id, external_id, kind, engine, name, config, status, \
     sync_version, last_synced_at, created_at, updated_at";

impl CatalogDb {
    // ========================================================================
    // Resource Operations
    // ========================================================================

    /// Insert or update the catalog's copy of a resource.
    ///
    /// `sync_version` starts at 1 and is bumped whenever kind, engine, name,
    /// config or status change. `last_synced_at` is refreshed on every call.
    pub async fn upsert_resource(&self, input: &ResourceUpsert) -> Result<CatalogResource> {
        let config_json = serde_json::to_string(&input.config)?;
        let now = Self::now_millis();

        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(
            "SELECT id, kind, engine, name, config, status FROM catalog_resources WHERE tenant_id = ? AND external_id = ?",
        )
        .bind(input.tenant_id.get())
        .bind(input.external_id.get())
        .fetch_optional(&mut *tx)
        .await?;

        match existing {
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO catalog_resources
                        (id, tenant_id, external_id, kind, engine, name, config, status,
                         sync_version, last_synced_at, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?)
                    "#,
                )
                .bind(ResourceId::new().as_str())
                .bind(input.tenant_id.get())
                .bind(input.external_id.get())
                .bind(&input.kind)
                .bind(&input.engine)
                .bind(&input.name)
                .bind(&config_json)
                .bind(input.status.as_str())
                .bind(now)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
            Some(row) => {
                let id: String = row.get("id");
                let changed = row.get::<String, _>("kind") != input.kind
                    || row.get::<String, _>("engine") != input.engine
                    || row.get::<String, _>("name") != input.name
                    || row.get::<String, _>("config") != config_json
                    || row.get::<String, _>("status") != input.status.as_str();

                sqlx::query(
                    r#"
                    UPDATE catalog_resources SET
                        kind = ?, engine = ?, name = ?, config = ?, status = ?,
                        sync_version = sync_version + ?,
                        last_synced_at = ?, updated_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(&input.kind)
                .bind(&input.engine)
                .bind(&input.name)
                .bind(&config_json)
                .bind(input.status.as_str())
                .bind(if changed { 1_i64 } else { 0 })
                .bind(now)
                .bind(now)
                .bind(&id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;

        self.get_resource(input.tenant_id, input.external_id)
            .await?
            .ok_or_else(|| {
                DbError::not_found(format!(
                    "resource {} for tenant {} vanished after upsert",
                    input.external_id, input.tenant_id
                ))
            })
    }

    /// Get a resource by its external id.
    pub async fn get_resource(
        &self,
        tenant_id: TenantId,
        external_id: ExternalResourceId,
    ) -> Result<Option<CatalogResource>> {
        let row = sqlx::query(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM catalog_resources WHERE tenant_id = ? AND external_id = ?"
        ))
        .bind(tenant_id.get())
        .bind(external_id.get())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| self.row_to_resource(&row)).transpose()
    }

    /// List a tenant's resources.
    pub async fn list_resources(&self, tenant_id: TenantId) -> Result<Vec<CatalogResource>> {
        let rows = sqlx::query(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM catalog_resources WHERE tenant_id = ? ORDER BY name, external_id"
        ))
        .bind(tenant_id.get())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| self.row_to_resource(row)).collect()
    }

    /// Root-node scan statistics for each of a tenant's resources.
    pub async fn resource_stats(&self, tenant_id: TenantId) -> Result<Vec<ResourceStats>> {
        let rows = sqlx::query(
            r#"
            SELECT
                r.id, r.tenant_id, r.external_id, r.kind, r.engine, r.name, r.config, r.status,
                r.sync_version, r.last_synced_at, r.created_at, r.updated_at,
                COUNT(n.id) AS total_nodes,
                COALESCE(SUM(CASE WHEN n.scan_status = 'scanned' THEN 1 ELSE 0 END), 0) AS scanned_nodes,
                COALESCE(SUM(CASE WHEN n.scan_status = 'unscanned' THEN 1 ELSE 0 END), 0) AS unscanned_nodes,
                MAX(n.last_scan_at) AS max_last_scan_at
            FROM catalog_resources r
            LEFT JOIN catalog_nodes n
                ON n.resource_id = r.id
               AND n.tenant_id = r.tenant_id
               AND n.parent_id IS NULL
               AND n.deleted_at IS NULL
            WHERE r.tenant_id = ?
            GROUP BY r.id
            ORDER BY r.name, r.external_id
            "#,
        )
        .bind(tenant_id.get())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ResourceStats {
                    resource: self.row_to_resource(row)?,
                    total_nodes: row.get("total_nodes"),
                    scanned_nodes: row.get("scanned_nodes"),
                    unscanned_nodes: row.get("unscanned_nodes"),
                    last_scan_at: Self::opt_datetime(row.get("max_last_scan_at")),
                })
            })
            .collect()
    }

    fn row_to_resource(&self, row: &sqlx::sqlite::SqliteRow) -> Result<CatalogResource> {
        let id: String = row.get("id");
        let config_json: String = row.get("config");
        let status: String = row.get("status");

        Ok(CatalogResource {
            id: ResourceId::parse(&id).map_err(|e| DbError::invalid_state(e.to_string()))?,
            tenant_id: TenantId::new(row.get("tenant_id")),
            external_id: ExternalResourceId::new(row.get("external_id")),
            kind: row.get("kind"),
            engine: row.get("engine"),
            name: row.get("name"),
            config: serde_json::from_str(&config_json)?,
            status: EntityStatus::parse(&status).ok_or_else(|| {
                DbError::invalid_state(format!("unknown resource status '{}'", status))
            })?,
            sync_version: row.get("sync_version"),
            last_synced_at: Self::opt_datetime(row.get("last_synced_at")),
            created_at: Self::millis_to_datetime(row.get("created_at")),
            updated_at: Self::millis_to_datetime(row.get("updated_at")),
        })
    }
}
