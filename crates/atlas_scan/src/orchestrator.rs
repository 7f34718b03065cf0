//! Scan orchestration.
//!
//! `scan_resource` refreshes the requested namespaces of one resource and
//! returns once the run is recorded. `scan_all_unscanned` discovers
//! namespaces that were never scanned across every active resource of a
//! tenant, one bounded task per resource, and hands back a [`ScanDispatch`]
//! immediately.

use crate::config::ScanConfig;
use crate::error::{Result, ScanError};
use crate::lock::{SubtreeGuard, SubtreeKey, SubtreeLocks};
use crate::reconcile::{namespace_kind, split_object_path, Reconciler};
use crate::registry::{RegisteredResource, ResourceDirectory, ResourceRegistry};
use crate::tree::{build_resource_tree, ResourceTree};
use atlas_connect::{
    Connector, ConnectorError, ConnectorFactory, ObjectNode, ObjectStorageConnector,
    RelationalConnector,
};
use atlas_db::{
    CatalogItem, CatalogResource, CatalogStore, FieldMatch, MetadataStats, NewScanRun, NodeKind,
    ResourceStats, RunStatus, ScanCounts, ScanMode, ScanRun, ScanStatus,
};
use atlas_ids::{ExternalResourceId, ScanRunId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

// ============================================================================
// Requests and Summaries
// ============================================================================

/// A caller-driven refresh of one resource.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub tenant_id: TenantId,
    pub external_id: ExternalResourceId,
    /// Schemas/databases, or `bucket[/key]` paths. Empty means everything.
    pub namespaces: Vec<String>,
    /// Caller credential forwarded to the resource directory
    pub token: Option<String>,
}

impl ScanRequest {
    pub fn new(tenant_id: TenantId, external_id: ExternalResourceId) -> Self {
        Self {
            tenant_id,
            external_id,
            namespaces: Vec::new(),
            token: None,
        }
    }

    pub fn with_namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.namespaces = namespaces.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Refresh of a single table inside an already cataloged namespace.
#[derive(Debug, Clone)]
pub struct TableScanRequest {
    pub tenant_id: TenantId,
    pub external_id: ExternalResourceId,
    pub schema: String,
    pub table: String,
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRunSummary {
    pub run_id: ScanRunId,
    pub status: RunStatus,
    pub message: Option<String>,
    pub namespaces_scanned: u64,
    pub items_scanned: u64,
    pub fields_scanned: u64,
    pub skipped: u64,
    pub duration_ms: Option<i64>,
    pub started_at: DateTime<Utc>,
}

impl From<ScanRun> for ScanRunSummary {
    fn from(run: ScanRun) -> Self {
        Self {
            run_id: run.id,
            status: run.status,
            message: run.error_message,
            namespaces_scanned: run.counts.namespaces_scanned,
            items_scanned: run.counts.items_scanned,
            fields_scanned: run.counts.fields_scanned,
            skipped: run.counts.skipped,
            duration_ms: run.duration_ms,
            started_at: run.started_at,
        }
    }
}

/// Handle to a scan-all-unscanned run in flight.
///
/// Dropping the handle leaves the work running; the outcome is still
/// recorded on the scan run.
#[derive(Debug)]
pub struct ScanDispatch {
    summary: ScanRunSummary,
    supervisor: JoinHandle<Result<ScanRunSummary>>,
}

impl ScanDispatch {
    pub fn run_id(&self) -> &ScanRunId {
        &self.summary.run_id
    }

    /// The run as it was when dispatched (`Running`).
    pub fn summary(&self) -> &ScanRunSummary {
        &self.summary
    }

    pub fn is_finished(&self) -> bool {
        self.supervisor.is_finished()
    }

    /// Wait for every resource task and return the finished run.
    pub async fn wait(self) -> Result<ScanRunSummary> {
        self.supervisor
            .await
            .map_err(|e| ScanError::internal(format!("scan supervisor failed: {}", e)))?
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Which namespaces of a resource a pass touches.
#[derive(Debug, Clone)]
enum Selection {
    /// Rescan the named namespaces/paths, or all of them when empty
    Refresh(Vec<String>),
    /// Only namespaces with no node yet or an `Unscanned` node
    Unscanned,
}

/// Counts gathered for one resource, and the error that ended it if any.
#[derive(Debug, Default)]
struct ResourceOutcome {
    counts: ScanCounts,
    error: Option<ScanError>,
}

#[derive(Clone)]
pub struct ScanOrchestrator {
    store: Arc<dyn CatalogStore>,
    registry: ResourceRegistry,
    factory: Arc<dyn ConnectorFactory>,
    reconciler: Reconciler,
    locks: SubtreeLocks,
    config: ScanConfig,
}

impl ScanOrchestrator {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        directory: Arc<dyn ResourceDirectory>,
        factory: Arc<dyn ConnectorFactory>,
        config: ScanConfig,
    ) -> Self {
        Self {
            registry: ResourceRegistry::new(directory, store.clone()),
            reconciler: Reconciler::new(store.clone()),
            store,
            factory,
            locks: SubtreeLocks::new(),
            config,
        }
    }

    pub fn locks(&self) -> &SubtreeLocks {
        &self.locks
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Refresh one resource and wait for the result.
    ///
    /// Lookup failures (unknown resource, wrong tenant) are returned as
    /// errors before any run is recorded. Anything that fails afterwards is
    /// recorded on the run and reported through its status.
    pub async fn scan_resource(&self, request: ScanRequest) -> Result<ScanRunSummary> {
        let registered = self
            .registry
            .lookup(request.tenant_id, request.external_id, request.token.as_deref())
            .await?;

        let run = self
            .store
            .create_scan_run(&NewScanRun {
                tenant_id: request.tenant_id,
                external_resource_id: Some(request.external_id),
                mode: ScanMode::Manual,
                targets: request.namespaces.clone(),
            })
            .await?;
        info!(
            run = %run.id,
            resource = %registered.name,
            targets = request.namespaces.len(),
            "Scan started"
        );

        let outcome = self
            .scan_registered(&registered, Selection::Refresh(request.namespaces))
            .await;
        self.finish_run(&run, &registered, outcome).await
    }

    /// Refresh one table and wait for the result. Recorded as a manual run
    /// targeting `schema.table`.
    pub async fn scan_table(&self, request: TableScanRequest) -> Result<ScanRunSummary> {
        let registered = self
            .registry
            .lookup(request.tenant_id, request.external_id, request.token.as_deref())
            .await?;

        let run = self
            .store
            .create_scan_run(&NewScanRun {
                tenant_id: request.tenant_id,
                external_resource_id: Some(request.external_id),
                mode: ScanMode::Manual,
                targets: vec![format!("{}.{}", request.schema, request.table)],
            })
            .await?;
        info!(run = %run.id, resource = %registered.name, schema = %request.schema, table = %request.table, "Table scan started");

        let mut counts = ScanCounts::default();
        let error = self
            .try_scan_table(&registered, &request.schema, &request.table, &mut counts)
            .await
            .err();
        self.finish_run(&run, &registered, ResourceOutcome { counts, error })
            .await
    }

    async fn try_scan_table(
        &self,
        registered: &RegisteredResource,
        schema: &str,
        table: &str,
        counts: &mut ScanCounts,
    ) -> Result<()> {
        let descriptor = self.registry.descriptor(registered)?;
        let resource = self.registry.ensure_resource(registered, &descriptor).await?;
        if !registered.is_active {
            return Err(ScanError::configuration(format!(
                "resource {} is inactive",
                registered.external_id
            )));
        }

        let connector = self.factory.connect(&descriptor).await?;
        let result = match &connector {
            Connector::Relational(conn) => {
                let kind = namespace_kind(conn.kind());
                let key = SubtreeKey::new(resource.tenant_id, &resource.id, kind, schema);
                match self.locks.try_acquire(key) {
                    Ok(_guard) => self
                        .reconciler
                        .reconcile_table(&resource, conn.as_ref(), schema, table)
                        .await
                        .map(|done| *counts += done),
                    Err(e) => Err(e),
                }
            }
            Connector::ObjectStorage(_) => Err(ScanError::configuration(format!(
                "resource {} is not relational",
                registered.external_id
            ))),
        };
        connector.close().await;
        result
    }

    /// Close a manual run with the outcome of its pass.
    async fn finish_run(
        &self,
        run: &ScanRun,
        registered: &RegisteredResource,
        outcome: ResourceOutcome,
    ) -> Result<ScanRunSummary> {
        let message = outcome.error.as_ref().map(|e| e.to_string());
        let status = match &outcome.error {
            None => RunStatus::Success,
            Some(e) => {
                error!(run = %run.id, resource = %registered.name, error = %e, "Scan failed");
                RunStatus::Failed
            }
        };

        let finished = self
            .store
            .finish_scan_run(run.tenant_id, &run.id, status, message.as_deref(), outcome.counts)
            .await?;
        info!(
            run = %finished.id,
            status = %finished.status,
            namespaces = finished.counts.namespaces_scanned,
            items = finished.counts.items_scanned,
            "Scan finished"
        );
        Ok(finished.into())
    }

    /// Discover never-scanned namespaces across a tenant's active resources.
    ///
    /// Returns once the run is recorded and one task per resource has been
    /// spawned. At most `max_concurrent_scans` resources are scanned at a
    /// time. The run fails only when every resource failed.
    pub async fn scan_all_unscanned(&self, tenant_id: TenantId) -> Result<ScanDispatch> {
        let resources = self.registry.list_active(tenant_id).await?;
        let run = self
            .store
            .create_scan_run(&NewScanRun {
                tenant_id,
                external_resource_id: None,
                mode: ScanMode::Auto,
                targets: resources.iter().map(|r| r.external_id.to_string()).collect(),
            })
            .await?;
        info!(run = %run.id, %tenant_id, resources = resources.len(), "Unscanned discovery dispatched");

        let summary = ScanRunSummary::from(run.clone());
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_scans.max(1)));

        let mut tasks = Vec::with_capacity(resources.len());
        for registered in resources {
            let this = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let external_id = registered.external_id;
            let handle = tokio::spawn(async move {
                match semaphore.acquire_owned().await {
                    Ok(_permit) => this.scan_registered(&registered, Selection::Unscanned).await,
                    Err(e) => ResourceOutcome {
                        counts: ScanCounts::default(),
                        error: Some(ScanError::internal(e.to_string())),
                    },
                }
            });
            tasks.push((external_id, handle));
        }

        let store = Arc::clone(&self.store);
        let run_id = run.id;
        let supervisor = tokio::spawn(async move {
            let total = tasks.len();
            let mut counts = ScanCounts::default();
            let mut failures = Vec::new();

            for (external_id, handle) in tasks {
                let outcome = handle.await.unwrap_or_else(|e| ResourceOutcome {
                    counts: ScanCounts::default(),
                    error: Some(ScanError::internal(format!("scan task failed: {}", e))),
                });
                counts += outcome.counts;
                if let Some(e) = outcome.error {
                    error!(%external_id, error = %e, "Resource discovery failed");
                    failures.push(format!("resource {}: {}", external_id, e));
                }
            }

            let status = if total > 0 && failures.len() == total {
                RunStatus::Failed
            } else {
                RunStatus::Success
            };
            let message = (!failures.is_empty()).then(|| failures.join("; "));
            let finished = store
                .finish_scan_run(tenant_id, &run_id, status, message.as_deref(), counts)
                .await?;
            info!(
                run = %finished.id,
                status = %finished.status,
                namespaces = counts.namespaces_scanned,
                failed = failures.len(),
                "Unscanned discovery finished"
            );
            Ok(ScanRunSummary::from(finished))
        });

        Ok(ScanDispatch {
            summary,
            supervisor,
        })
    }

    // ========================================================================
    // Per-resource passes
    // ========================================================================

    async fn scan_registered(
        &self,
        registered: &RegisteredResource,
        selection: Selection,
    ) -> ResourceOutcome {
        let mut counts = ScanCounts::default();
        let error = self
            .try_scan_registered(registered, selection, &mut counts)
            .await
            .err();
        ResourceOutcome { counts, error }
    }

    async fn try_scan_registered(
        &self,
        registered: &RegisteredResource,
        selection: Selection,
        counts: &mut ScanCounts,
    ) -> Result<()> {
        let descriptor = self.registry.descriptor(registered)?;
        let resource = self.registry.ensure_resource(registered, &descriptor).await?;
        if !registered.is_active {
            return Err(ScanError::configuration(format!(
                "resource {} is inactive",
                registered.external_id
            )));
        }

        let connector = self.factory.connect(&descriptor).await?;
        debug!(resource = %resource.id, ?connector, "Connector ready");

        let result = match &connector {
            Connector::Relational(conn) => {
                self.scan_relational(&resource, conn.as_ref(), &selection, counts)
                    .await
            }
            Connector::ObjectStorage(conn) => {
                self.scan_objects(&resource, conn.as_ref(), &selection, counts)
                    .await
            }
        };
        connector.close().await;
        result
    }

    async fn scan_relational(
        &self,
        resource: &CatalogResource,
        conn: &dyn RelationalConnector,
        selection: &Selection,
        counts: &mut ScanCounts,
    ) -> Result<()> {
        let kind = namespace_kind(conn.kind());
        let schemas = conn.list_schemas().await?;
        let upstream: Vec<String> = schemas.iter().map(|s| s.name.clone()).collect();
        let targets = self
            .select_namespaces(resource, kind, &upstream, selection, counts)
            .await?;

        for schema in schemas.iter().filter(|s| targets.contains(&s.name)) {
            let Some(_guard) = self.acquire(resource, kind, &schema.name, selection, counts)? else {
                continue;
            };
            match self.reconciler.reconcile_schema(resource, conn, schema).await {
                Ok(done) => *counts += done,
                Err(e) if e.aborts_resource() => return Err(e),
                Err(e) => {
                    warn!(schema = %schema.name, error = %e, "Skipping schema");
                    counts.skipped += 1;
                }
            }
        }
        Ok(())
    }

    async fn scan_objects(
        &self,
        resource: &CatalogResource,
        conn: &dyn ObjectStorageConnector,
        selection: &Selection,
        counts: &mut ScanCounts,
    ) -> Result<()> {
        let buckets = conn.allowed_buckets().await?;
        let targets = match selection {
            Selection::Refresh(paths) if !paths.is_empty() => {
                for path in paths {
                    if let Some((bucket, _)) = split_object_path(path) {
                        if !buckets.contains(&bucket) {
                            return Err(ConnectorError::BucketNotAllowed(bucket).into());
                        }
                    }
                }
                paths.clone()
            }
            _ => {
                self.select_namespaces(resource, NodeKind::Bucket, &buckets, selection, counts)
                    .await?
            }
        };

        for path in targets {
            let Some((bucket, _)) = split_object_path(&path) else {
                warn!(path = %path, "Skipping empty object path");
                counts.skipped += 1;
                continue;
            };
            let Some(_guard) = self.acquire(resource, NodeKind::Bucket, &bucket, selection, counts)? else {
                continue;
            };
            match self.reconciler.reconcile_object_path(resource, conn, &path).await {
                Ok(done) => *counts += done,
                Err(e) if e.aborts_resource() => return Err(e),
                Err(e) => {
                    warn!(path = %path, error = %e, "Skipping object path");
                    counts.skipped += 1;
                }
            }
        }
        Ok(())
    }

    /// Resolve the namespaces a pass should reconcile, retiring catalog
    /// nodes whose namespace vanished upstream on refresh.
    async fn select_namespaces(
        &self,
        resource: &CatalogResource,
        kind: NodeKind,
        upstream: &[String],
        selection: &Selection,
        counts: &mut ScanCounts,
    ) -> Result<Vec<String>> {
        match selection {
            Selection::Refresh(requested) if requested.is_empty() => {
                let roots = self
                    .store
                    .list_root_nodes(resource.tenant_id, &resource.id, None)
                    .await?;
                for root in roots {
                    if root.kind == kind && !upstream.contains(&root.name) {
                        self.retire_namespace(resource, kind, &root.name).await?;
                    }
                }
                Ok(upstream.to_vec())
            }
            Selection::Refresh(requested) => {
                let mut targets: Vec<String> = Vec::new();
                for name in requested.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
                    if targets.iter().any(|t| t == name) {
                        continue;
                    }
                    if upstream.iter().any(|u| u == name) {
                        targets.push(name.to_string());
                    } else {
                        warn!(resource = %resource.name, namespace = name, "Requested namespace does not exist");
                        counts.skipped += 1;
                        self.retire_namespace(resource, kind, name).await?;
                    }
                }
                Ok(targets)
            }
            Selection::Unscanned => {
                let roots = self
                    .store
                    .list_root_nodes(resource.tenant_id, &resource.id, None)
                    .await?;
                Ok(upstream
                    .iter()
                    .filter(|name| {
                        roots
                            .iter()
                            .find(|n| n.kind == kind && &n.name == *name)
                            .map(|n| n.scan_status == ScanStatus::Unscanned)
                            .unwrap_or(true)
                    })
                    .cloned()
                    .collect())
            }
        }
    }

    async fn retire_namespace(&self, resource: &CatalogResource, kind: NodeKind, name: &str) -> Result<()> {
        let Some(node) = self
            .store
            .get_node(resource.tenant_id, &resource.id, None, kind, name)
            .await?
        else {
            return Ok(());
        };
        if node.deleted_at.is_some() {
            return Ok(());
        }

        let key = SubtreeKey::new(resource.tenant_id, &resource.id, kind, name);
        match self.locks.try_acquire(key) {
            Ok(_guard) => {
                self.store.retire_node(resource.tenant_id, &node.id).await?;
                info!(resource = %resource.name, namespace = name, "Retired vanished namespace");
            }
            Err(e) => warn!(namespace = name, error = %e, "Not retiring namespace in use"),
        }
        Ok(())
    }

    /// Take the subtree guard. A busy subtree fails a refresh and is
    /// skipped by discovery.
    fn acquire(
        &self,
        resource: &CatalogResource,
        kind: NodeKind,
        name: &str,
        selection: &Selection,
        counts: &mut ScanCounts,
    ) -> Result<Option<SubtreeGuard>> {
        let key = SubtreeKey::new(resource.tenant_id, &resource.id, kind, name);
        match self.locks.try_acquire(key) {
            Ok(guard) => Ok(Some(guard)),
            Err(e @ ScanError::SubtreeBusy(_)) => match selection {
                Selection::Unscanned => {
                    warn!(namespace = name, "Subtree busy, skipping");
                    counts.skipped += 1;
                    Ok(None)
                }
                Selection::Refresh(_) => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Every resource of a tenant with its node/item hierarchy.
    pub async fn catalog_tree(&self, tenant_id: TenantId) -> Result<Vec<ResourceTree>> {
        let resources = self.store.list_resources(tenant_id).await?;
        let mut trees = Vec::with_capacity(resources.len());
        for resource in resources {
            let nodes = self.store.list_resource_nodes(tenant_id, &resource.id).await?;
            let items = self.store.list_resource_items(tenant_id, &resource.id).await?;
            trees.push(build_resource_tree(resource, nodes, items));
        }
        Ok(trees)
    }

    pub async fn scan_history(&self, tenant_id: TenantId, limit: u32) -> Result<Vec<ScanRunSummary>> {
        Ok(self
            .store
            .list_scan_runs(tenant_id, limit)
            .await?
            .into_iter()
            .map(ScanRunSummary::from)
            .collect())
    }

    pub async fn get_scan_run(
        &self,
        tenant_id: TenantId,
        run_id: &ScanRunId,
    ) -> Result<Option<ScanRunSummary>> {
        Ok(self
            .store
            .get_scan_run(tenant_id, run_id)
            .await?
            .map(ScanRunSummary::from))
    }

    pub async fn resource_stats(&self, tenant_id: TenantId) -> Result<Vec<ResourceStats>> {
        Ok(self.store.resource_stats(tenant_id).await?)
    }

    pub async fn metadata_stats(&self, tenant_id: TenantId) -> Result<MetadataStats> {
        Ok(self.store.metadata_stats(tenant_id).await?)
    }

    /// Cataloged tables and views whose name or comment contains `keyword`.
    pub async fn search_tables(
        &self,
        tenant_id: TenantId,
        keyword: &str,
        limit: u32,
    ) -> Result<Vec<CatalogItem>> {
        Ok(self.store.search_items(tenant_id, keyword, limit).await?)
    }

    /// Cataloged columns whose name or comment contains `keyword`.
    pub async fn search_fields(
        &self,
        tenant_id: TenantId,
        keyword: &str,
        limit: u32,
    ) -> Result<Vec<FieldMatch>> {
        Ok(self.store.search_fields(tenant_id, keyword, limit).await?)
    }

    /// Live namespace listing. Nothing is written to the catalog.
    pub async fn list_available_namespaces(
        &self,
        tenant_id: TenantId,
        external_id: ExternalResourceId,
        token: Option<&str>,
    ) -> Result<Vec<String>> {
        let connector = self.connect(tenant_id, external_id, token).await?;
        let result = connector.list_namespaces().await;
        connector.close().await;
        Ok(result?)
    }

    /// Live one-level object listing. Nothing is written to the catalog.
    pub async fn list_object_nodes(
        &self,
        tenant_id: TenantId,
        external_id: ExternalResourceId,
        path: &str,
        token: Option<&str>,
    ) -> Result<Vec<ObjectNode>> {
        let connector = self.connect(tenant_id, external_id, token).await?;
        let result = match &connector {
            Connector::ObjectStorage(conn) => conn.list_nodes(path).await.map_err(ScanError::from),
            Connector::Relational(_) => Err(ScanError::configuration(format!(
                "resource {} is not object storage",
                external_id
            ))),
        };
        connector.close().await;
        result
    }

    async fn connect(
        &self,
        tenant_id: TenantId,
        external_id: ExternalResourceId,
        token: Option<&str>,
    ) -> Result<Connector> {
        let registered = self.registry.lookup(tenant_id, external_id, token).await?;
        if !registered.is_active {
            return Err(ScanError::configuration(format!(
                "resource {} is inactive",
                external_id
            )));
        }
        let descriptor = self.registry.descriptor(&registered)?;
        Ok(self.factory.connect(&descriptor).await?)
    }
}
