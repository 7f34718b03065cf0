//! Scan-run bookkeeping

use crate::error::{DbError, Result};
use crate::types::*;
use crate::CatalogDb;
use atlas_ids::{ExternalResourceId, ScanRunId, TenantId};
use sqlx::Row;

const RUN_COLUMNS: &str = "id, tenant_id, external_resource_id, mode, targets, status, \
     error_message, namespaces_scanned, items_scanned, fields_scanned, skipped, started_at, \
     completed_at, duration_ms";

impl CatalogDb {
    /// Record a new run in `Running` state.
    pub async fn create_scan_run(&self, input: &NewScanRun) -> Result<ScanRun> {
        let id = ScanRunId::new();
        let targets = serde_json::to_string(&input.targets)?;

        sqlx::query(
            r#"
            INSERT INTO catalog_scan_runs (id, tenant_id, external_resource_id, mode, targets, status, started_at)
            VALUES (?, ?, ?, ?, ?, 'running', ?)
            "#,
        )
        .bind(id.as_str())
        .bind(input.tenant_id.get())
        .bind(input.external_resource_id.map(|e| e.get()))
        .bind(input.mode.as_str())
        .bind(&targets)
        .bind(Self::now_millis())
        .execute(&self.pool)
        .await?;

        self.get_scan_run(input.tenant_id, &id)
            .await?
            .ok_or_else(|| DbError::not_found(format!("scan run {}", id)))
    }

    /// Move a running run to a terminal status with its final counters.
    pub async fn finish_scan_run(
        &self,
        tenant_id: TenantId,
        run_id: &ScanRunId,
        status: RunStatus,
        error_message: Option<&str>,
        counts: ScanCounts,
    ) -> Result<ScanRun> {
        if !status.is_terminal() {
            return Err(DbError::invalid_state(format!(
                "scan run {} cannot finish as '{}'",
                run_id, status
            )));
        }

        let now = Self::now_millis();
        let result = sqlx::query(
            r#"
            UPDATE catalog_scan_runs SET
                status = ?, error_message = ?,
                namespaces_scanned = ?, items_scanned = ?, fields_scanned = ?, skipped = ?,
                completed_at = ?, duration_ms = ? - started_at
            WHERE tenant_id = ? AND id = ? AND status = 'running'
            "#,
        )
        .bind(status.as_str())
        .bind(error_message)
        .bind(counts.namespaces_scanned as i64)
        .bind(counts.items_scanned as i64)
        .bind(counts.fields_scanned as i64)
        .bind(counts.skipped as i64)
        .bind(now)
        .bind(now)
        .bind(tenant_id.get())
        .bind(run_id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::invalid_state(format!(
                "scan run {} is not running",
                run_id
            )));
        }

        self.get_scan_run(tenant_id, run_id)
            .await?
            .ok_or_else(|| DbError::not_found(format!("scan run {}", run_id)))
    }

    pub async fn get_scan_run(
        &self,
        tenant_id: TenantId,
        run_id: &ScanRunId,
    ) -> Result<Option<ScanRun>> {
        let row = sqlx::query(&format!(
            "SELECT {RUN_COLUMNS} FROM catalog_scan_runs WHERE tenant_id = ? AND id = ?"
        ))
        .bind(tenant_id.get())
        .bind(run_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| self.row_to_scan_run(&row)).transpose()
    }

    /// Most recent runs first.
    pub async fn list_scan_runs(&self, tenant_id: TenantId, limit: u32) -> Result<Vec<ScanRun>> {
        let rows = sqlx::query(&format!(
            "SELECT {RUN_COLUMNS} FROM catalog_scan_runs WHERE tenant_id = ? ORDER BY started_at DESC, rowid DESC LIMIT ?"
        ))
        .bind(tenant_id.get())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| self.row_to_scan_run(row)).collect()
    }

    fn row_to_scan_run(&self, row: &sqlx::sqlite::SqliteRow) -> Result<ScanRun> {
        let id: String = row.get("id");
        let mode: String = row.get("mode");
        let status: String = row.get("status");
        let targets: String = row.get("targets");
        let external: Option<i64> = row.get("external_resource_id");

        Ok(ScanRun {
            id: ScanRunId::parse(&id).map_err(|e| DbError::invalid_state(e.to_string()))?,
            tenant_id: TenantId::new(row.get("tenant_id")),
            external_resource_id: external.map(ExternalResourceId::new),
            mode: ScanMode::parse(&mode)
                .ok_or_else(|| DbError::invalid_state(format!("unknown scan mode '{}'", mode)))?,
            targets: serde_json::from_str(&targets)?,
            status: RunStatus::parse(&status)
                .ok_or_else(|| DbError::invalid_state(format!("unknown run status '{}'", status)))?,
            error_message: row.get("error_message"),
            counts: ScanCounts {
                namespaces_scanned: row.get::<i64, _>("namespaces_scanned") as u64,
                items_scanned: row.get::<i64, _>("items_scanned") as u64,
                fields_scanned: row.get::<i64, _>("fields_scanned") as u64,
                skipped: row.get::<i64, _>("skipped") as u64,
            },
            started_at: Self::millis_to_datetime(row.get("started_at")),
            completed_at: Self::opt_datetime(row.get("completed_at")),
            duration_ms: row.get("duration_ms"),
        })
    }
}
