//! Catalog schema creation.
//!
//! All CREATE TABLE statements live here.

use crate::error::Result;
use crate::CatalogDb;
use tracing::info;

impl CatalogDb {
    /// Ensure all tables exist.
    pub(crate) async fn ensure_schema(&self) -> Result<()> {
        self.create_catalog_tables().await?;
        self.create_scan_run_tables().await?;

        info!("Catalog schema verified");
        Ok(())
    }

    /// Resource / Node / Item tree
    async fn create_catalog_tables(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS catalog_resources (
                id TEXT PRIMARY KEY,
                tenant_id INTEGER NOT NULL,
                external_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                engine TEXT NOT NULL,
                name TEXT NOT NULL,
                config TEXT NOT NULL DEFAULT '{}',
                status TEXT NOT NULL DEFAULT 'active',
                sync_version INTEGER NOT NULL DEFAULT 1,
                last_synced_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (tenant_id, external_id)
            )"#,
        )
        .execute(&self.pool)
        .await?;

        // parent_key is '' for roots so the natural-key constraint also
        // covers top-level nodes (NULLs never collide in a UNIQUE index).
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS catalog_nodes (
                id TEXT PRIMARY KEY,
                tenant_id INTEGER NOT NULL,
                resource_id TEXT NOT NULL REFERENCES catalog_resources(id),
                parent_id TEXT,
                parent_key TEXT NOT NULL DEFAULT '',
                kind TEXT NOT NULL,
                name TEXT NOT NULL,
                depth INTEGER NOT NULL,
                path TEXT NOT NULL,
                full_name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                scan_status TEXT NOT NULL DEFAULT 'unscanned',
                scan_started_at INTEGER,
                last_scan_at INTEGER,
                item_count INTEGER NOT NULL DEFAULT 0,
                total_size_bytes INTEGER NOT NULL DEFAULT 0,
                attributes TEXT NOT NULL DEFAULT '{"shape":"empty"}',
                error_message TEXT,
                sync_version INTEGER NOT NULL DEFAULT 1,
                deleted_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (tenant_id, resource_id, parent_key, kind, name)
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_catalog_nodes_path ON catalog_nodes(tenant_id, path)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_catalog_nodes_parent ON catalog_nodes(tenant_id, parent_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS catalog_items (
                id TEXT PRIMARY KEY,
                tenant_id INTEGER NOT NULL,
                resource_id TEXT NOT NULL REFERENCES catalog_resources(id),
                node_id TEXT NOT NULL REFERENCES catalog_nodes(id),
                kind TEXT NOT NULL,
                name TEXT NOT NULL,
                full_name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                row_count INTEGER,
                size_bytes INTEGER NOT NULL DEFAULT 0,
                last_modified_at INTEGER,
                attributes TEXT NOT NULL DEFAULT '{"shape":"empty"}',
                sync_version INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (tenant_id, resource_id, node_id, kind, name)
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_catalog_items_node ON catalog_items(tenant_id, node_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Scan-run bookkeeping
    async fn create_scan_run_tables(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS catalog_scan_runs (
                id TEXT PRIMARY KEY,
                tenant_id INTEGER NOT NULL,
                external_resource_id INTEGER,
                mode TEXT NOT NULL,
                targets TEXT NOT NULL DEFAULT '[]',
                status TEXT NOT NULL DEFAULT 'running',
                error_message TEXT,
                namespaces_scanned INTEGER NOT NULL DEFAULT 0,
                items_scanned INTEGER NOT NULL DEFAULT 0,
                fields_scanned INTEGER NOT NULL DEFAULT 0,
                skipped INTEGER NOT NULL DEFAULT 0,
                started_at INTEGER NOT NULL,
                completed_at INTEGER,
                duration_ms INTEGER
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_catalog_scan_runs_tenant ON catalog_scan_runs(tenant_id, started_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
