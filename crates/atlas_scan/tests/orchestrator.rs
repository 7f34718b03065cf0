//! End-to-end orchestration over fixture upstreams.

use atlas_connect::{Attributes, ConnectorError, MemoryBackend, ResourceKind};
use atlas_db::{CatalogDb, CatalogStore, NodeKind, RunStatus, ScanMode, ScanStatus};
use atlas_ids::{ExternalResourceId, TenantId};
use atlas_scan::*;
use atlas_test_utils::{relational_attributes, s3_attributes, FakeRelational, FixtureFactory};
use std::sync::Arc;

const TENANT: TenantId = TenantId::new(1);
const WAREHOUSE: ExternalResourceId = ExternalResourceId::new(10);
const LAKE: ExternalResourceId = ExternalResourceId::new(20);

fn registered(external: ExternalResourceId, kind: &str, attributes: Attributes) -> RegisteredResource {
    RegisteredResource {
        tenant_id: TENANT,
        external_id: external,
        name: format!("{}-{}", kind, external),
        kind: kind.into(),
        is_active: true,
        attributes,
    }
}

async fn orchestrator(
    resources: Vec<RegisteredResource>,
    factory: FixtureFactory,
) -> (ScanOrchestrator, Arc<dyn CatalogStore>) {
    let store: Arc<dyn CatalogStore> = Arc::new(CatalogDb::open_in_memory().await.unwrap());
    let orchestrator = ScanOrchestrator::new(
        store.clone(),
        Arc::new(StaticResourceDirectory::new(resources)),
        Arc::new(factory),
        ScanConfig { max_concurrent_scans: 2 },
    );
    (orchestrator, store)
}

fn warehouse_upstream() -> FakeRelational {
    FakeRelational::new(ResourceKind::Postgres)
        .schema("sales")
        .table("orders", 10)
        .table("customers", 5)
        .schema("hr")
        .table("employees", 3)
}

async fn root_status(store: &Arc<dyn CatalogStore>, external: ExternalResourceId, kind: NodeKind, name: &str) -> Option<ScanStatus> {
    let resource = store.get_resource(TENANT, external).await.unwrap()?;
    store
        .get_node(TENANT, &resource.id, None, kind, name)
        .await
        .unwrap()
        .filter(|n| n.deleted_at.is_none())
        .map(|n| n.scan_status)
}

// ============================================================================
// Manual scans
// ============================================================================

#[tokio::test]
async fn test_scan_resource_records_successful_run() {
    let upstream = warehouse_upstream();
    let factory = FixtureFactory::relational(upstream.clone());
    let (orch, store) = orchestrator(
        vec![registered(WAREHOUSE, "postgres", relational_attributes())],
        factory.clone(),
    )
    .await;

    let summary = orch
        .scan_resource(ScanRequest::new(TENANT, WAREHOUSE).with_namespaces(["sales"]))
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Success);
    assert_eq!(summary.namespaces_scanned, 1);
    assert_eq!(summary.items_scanned, 2);
    assert_eq!(summary.fields_scanned, 15);
    assert!(summary.duration_ms.is_some());

    assert_eq!(root_status(&store, WAREHOUSE, NodeKind::Schema, "sales").await, Some(ScanStatus::Scanned));
    assert_eq!(root_status(&store, WAREHOUSE, NodeKind::Schema, "hr").await, None);
    assert_eq!(factory.connect_count(), 1);
    assert_eq!(upstream.calls().close, 1);

    let history = orch.scan_history(TENANT, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0], summary);

    let run = store.get_scan_run(TENANT, &summary.run_id).await.unwrap().unwrap();
    assert_eq!(run.mode, ScanMode::Manual);
    assert_eq!(run.targets, vec!["sales".to_string()]);
    assert_eq!(run.external_resource_id, Some(WAREHOUSE));
}

#[tokio::test]
async fn test_catalog_resource_never_stores_credentials() {
    let (orch, store) = orchestrator(
        vec![registered(WAREHOUSE, "postgresql", relational_attributes())],
        FixtureFactory::relational(warehouse_upstream()),
    )
    .await;
    orch.scan_resource(ScanRequest::new(TENANT, WAREHOUSE)).await.unwrap();

    let resource = store.get_resource(TENANT, WAREHOUSE).await.unwrap().unwrap();
    assert_eq!(resource.kind, "postgres");
    assert_eq!(resource.engine, "postgresql");
    assert!(resource.config.contains_key("host"));
    assert!(!resource.config.contains_key("password"));
}

#[tokio::test]
async fn test_full_refresh_retires_vanished_namespaces() {
    let upstream = warehouse_upstream();
    let (orch, store) = orchestrator(
        vec![registered(WAREHOUSE, "postgres", relational_attributes())],
        FixtureFactory::relational(upstream.clone()),
    )
    .await;

    let first = orch.scan_resource(ScanRequest::new(TENANT, WAREHOUSE)).await.unwrap();
    assert_eq!(first.namespaces_scanned, 2);

    upstream.drop_schema("hr");
    let second = orch.scan_resource(ScanRequest::new(TENANT, WAREHOUSE)).await.unwrap();
    assert_eq!(second.namespaces_scanned, 1);
    assert_eq!(root_status(&store, WAREHOUSE, NodeKind::Schema, "hr").await, None);

    let resource = store.get_resource(TENANT, WAREHOUSE).await.unwrap().unwrap();
    let items = store.list_resource_items(TENANT, &resource.id).await.unwrap();
    assert!(items.iter().all(|i| i.full_name.starts_with("sales.")));
}

#[tokio::test]
async fn test_requested_namespace_missing_upstream_is_skipped() {
    let (orch, _store) = orchestrator(
        vec![registered(WAREHOUSE, "postgres", relational_attributes())],
        FixtureFactory::relational(warehouse_upstream()),
    )
    .await;

    let summary = orch
        .scan_resource(ScanRequest::new(TENANT, WAREHOUSE).with_namespaces(["sales", "ghost"]))
        .await
        .unwrap();
    assert_eq!(summary.status, RunStatus::Success);
    assert_eq!(summary.namespaces_scanned, 1);
    assert_eq!(summary.skipped, 1);
}

#[tokio::test]
async fn test_unknown_kind_fails_run_without_connecting() {
    let factory = FixtureFactory::relational(warehouse_upstream());
    let (orch, _store) = orchestrator(
        vec![registered(WAREHOUSE, "oracle", relational_attributes())],
        factory.clone(),
    )
    .await;

    let summary = orch.scan_resource(ScanRequest::new(TENANT, WAREHOUSE)).await.unwrap();
    assert_eq!(summary.status, RunStatus::Failed);
    assert!(summary.message.unwrap().contains("oracle"));
    assert_eq!(factory.connect_count(), 0);
}

#[tokio::test]
async fn test_lookup_failures_record_no_run() {
    let (orch, _store) = orchestrator(
        vec![registered(WAREHOUSE, "postgres", relational_attributes())],
        FixtureFactory::relational(warehouse_upstream()),
    )
    .await;

    let other_tenant = TenantId::new(2);
    let denied = orch.scan_resource(ScanRequest::new(other_tenant, WAREHOUSE)).await;
    assert!(matches!(denied, Err(ScanError::AccessDenied(_))));

    let missing = orch.scan_resource(ScanRequest::new(TENANT, ExternalResourceId::new(99))).await;
    assert!(matches!(missing, Err(ScanError::ResourceNotFound(_))));

    assert!(orch.scan_history(TENANT, 10).await.unwrap().is_empty());
    assert!(orch.scan_history(other_tenant, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unreachable_source_fails_run() {
    let upstream = warehouse_upstream();
    upstream.fail_list_schemas(ConnectorError::connection("no route to host"));
    let (orch, _store) = orchestrator(
        vec![registered(WAREHOUSE, "postgres", relational_attributes())],
        FixtureFactory::relational(upstream.clone()),
    )
    .await;

    let summary = orch.scan_resource(ScanRequest::new(TENANT, WAREHOUSE)).await.unwrap();
    assert_eq!(summary.status, RunStatus::Failed);
    assert!(summary.message.unwrap().contains("no route to host"));
    assert_eq!(upstream.calls().close, 1);
}

#[tokio::test]
async fn test_busy_subtree_fails_manual_scan() {
    let (orch, store) = orchestrator(
        vec![registered(WAREHOUSE, "postgres", relational_attributes())],
        FixtureFactory::relational(warehouse_upstream()),
    )
    .await;
    orch.scan_resource(ScanRequest::new(TENANT, WAREHOUSE).with_namespaces(["hr"]))
        .await
        .unwrap();
    let resource = store.get_resource(TENANT, WAREHOUSE).await.unwrap().unwrap();

    let key = SubtreeKey::new(TENANT, &resource.id, NodeKind::Schema, "sales");
    let guard = orch.locks().try_acquire(key.clone()).unwrap();

    let summary = orch
        .scan_resource(ScanRequest::new(TENANT, WAREHOUSE).with_namespaces(["sales"]))
        .await
        .unwrap();
    assert_eq!(summary.status, RunStatus::Failed);
    assert!(summary.message.unwrap().contains("already being scanned"));

    drop(guard);
    assert!(!orch.locks().is_held(&key));
    let retry = orch
        .scan_resource(ScanRequest::new(TENANT, WAREHOUSE).with_namespaces(["sales"]))
        .await
        .unwrap();
    assert_eq!(retry.status, RunStatus::Success);
}

#[tokio::test]
async fn test_inactive_resource_is_not_scanned() {
    let mut resource = registered(WAREHOUSE, "postgres", relational_attributes());
    resource.is_active = false;
    let factory = FixtureFactory::relational(warehouse_upstream());
    let (orch, _store) = orchestrator(vec![resource], factory.clone()).await;

    let summary = orch.scan_resource(ScanRequest::new(TENANT, WAREHOUSE)).await.unwrap();
    assert_eq!(summary.status, RunStatus::Failed);
    assert!(summary.message.unwrap().contains("inactive"));
    assert_eq!(factory.connect_count(), 0);

    let dispatch = orch.scan_all_unscanned(TENANT).await.unwrap();
    let auto = dispatch.wait().await.unwrap();
    assert_eq!(auto.status, RunStatus::Success);
    assert_eq!(auto.namespaces_scanned, 0);
    assert_eq!(factory.connect_count(), 0);
}

// ============================================================================
// Discovery of unscanned namespaces
// ============================================================================

#[tokio::test]
async fn test_scan_all_unscanned_skips_scanned_namespaces() {
    let upstream = warehouse_upstream();
    let (orch, store) = orchestrator(
        vec![registered(WAREHOUSE, "postgres", relational_attributes())],
        FixtureFactory::relational(upstream.clone()),
    )
    .await;

    orch.scan_resource(ScanRequest::new(TENANT, WAREHOUSE).with_namespaces(["sales"]))
        .await
        .unwrap();
    let before = upstream.calls();
    assert_eq!(before.scan_tables, 1);

    let dispatch = orch.scan_all_unscanned(TENANT).await.unwrap();
    assert_eq!(dispatch.summary().status, RunStatus::Running);
    let run_id = dispatch.run_id().clone();
    let summary = dispatch.wait().await.unwrap();

    assert_eq!(summary.run_id, run_id);
    assert_eq!(summary.status, RunStatus::Success);
    assert_eq!(summary.namespaces_scanned, 1);

    // Only hr was reconciled
    let after = upstream.calls();
    assert_eq!(after.scan_tables - before.scan_tables, 1);
    assert_eq!(after.scan_fields - before.scan_fields, 1);
    assert_eq!(root_status(&store, WAREHOUSE, NodeKind::Schema, "hr").await, Some(ScanStatus::Scanned));

    // Nothing left to discover
    let again = orch.scan_all_unscanned(TENANT).await.unwrap().wait().await.unwrap();
    assert_eq!(again.namespaces_scanned, 0);
    assert_eq!(upstream.calls().scan_tables, after.scan_tables);

    let run = orch.get_scan_run(TENANT, &run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Success);
    let stored = store.get_scan_run(TENANT, &run_id).await.unwrap().unwrap();
    assert_eq!(stored.mode, ScanMode::Auto);
    assert_eq!(stored.external_resource_id, None);
}

#[tokio::test]
async fn test_scan_all_unscanned_retries_failed_namespaces() {
    let upstream = warehouse_upstream();
    upstream.fail_tables("hr", ConnectorError::enumeration("hr", "permission denied"));
    let (orch, store) = orchestrator(
        vec![registered(WAREHOUSE, "postgres", relational_attributes())],
        FixtureFactory::relational(upstream.clone()),
    )
    .await;

    let first = orch.scan_all_unscanned(TENANT).await.unwrap().wait().await.unwrap();
    assert_eq!(first.status, RunStatus::Success);
    assert_eq!(first.namespaces_scanned, 1);
    assert_eq!(first.skipped, 1);
    assert_eq!(root_status(&store, WAREHOUSE, NodeKind::Schema, "hr").await, Some(ScanStatus::Unscanned));

    upstream.clear_failures();
    let second = orch.scan_all_unscanned(TENANT).await.unwrap().wait().await.unwrap();
    assert_eq!(second.namespaces_scanned, 1);
    assert_eq!(root_status(&store, WAREHOUSE, NodeKind::Schema, "hr").await, Some(ScanStatus::Scanned));
}

#[tokio::test]
async fn test_scan_all_unscanned_skips_busy_subtree() {
    let (orch, store) = orchestrator(
        vec![registered(WAREHOUSE, "postgres", relational_attributes())],
        FixtureFactory::relational(warehouse_upstream()),
    )
    .await;
    // Registers the catalog resource without touching any namespace
    orch.scan_resource(ScanRequest::new(TENANT, WAREHOUSE).with_namespaces(["ghost"]))
        .await
        .unwrap();
    let resource = store.get_resource(TENANT, WAREHOUSE).await.unwrap().unwrap();
    let _guard = orch
        .locks()
        .try_acquire(SubtreeKey::new(TENANT, &resource.id, NodeKind::Schema, "sales"))
        .unwrap();

    let summary = orch.scan_all_unscanned(TENANT).await.unwrap().wait().await.unwrap();
    assert_eq!(summary.status, RunStatus::Success);
    assert_eq!(summary.namespaces_scanned, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(root_status(&store, WAREHOUSE, NodeKind::Schema, "sales").await, None);
}

#[tokio::test]
async fn test_scan_all_unscanned_fails_only_when_every_resource_fails() {
    let backend = MemoryBackend::new();
    backend.put_object("archive", "a.csv", 1);
    backend.set_offline(true);
    let factory = FixtureFactory::relational(warehouse_upstream()).with_objects(backend.clone());
    let (orch, _store) = orchestrator(
        vec![
            registered(WAREHOUSE, "postgres", relational_attributes()),
            registered(LAKE, "minio", s3_attributes(&[])),
        ],
        factory,
    )
    .await;

    let partial = orch.scan_all_unscanned(TENANT).await.unwrap().wait().await.unwrap();
    assert_eq!(partial.status, RunStatus::Success);
    assert_eq!(partial.namespaces_scanned, 2);
    assert!(partial.message.unwrap().contains("resource 20"));

    let (orch, _store) = orchestrator(
        vec![registered(LAKE, "minio", s3_attributes(&[]))],
        FixtureFactory::object_storage(backend),
    )
    .await;
    let failed = orch.scan_all_unscanned(TENANT).await.unwrap().wait().await.unwrap();
    assert_eq!(failed.status, RunStatus::Failed);
}

#[tokio::test]
async fn test_scan_all_unscanned_with_no_resources() {
    let (orch, _store) = orchestrator(vec![], FixtureFactory::default()).await;
    let summary = orch.scan_all_unscanned(TENANT).await.unwrap().wait().await.unwrap();
    assert_eq!(summary.status, RunStatus::Success);
    assert_eq!(summary.namespaces_scanned, 0);
}

// ============================================================================
// Object storage and queries
// ============================================================================

#[tokio::test]
async fn test_object_storage_scan_and_tree() {
    let backend = MemoryBackend::new();
    backend.put_object("archive", "2024/jan.csv", 100);
    backend.put_object("archive", "2024/feb.csv", 250);
    backend.put_object("private", "keys.txt", 1);
    let (orch, _store) = orchestrator(
        vec![registered(LAKE, "s3", s3_attributes(&["archive"]))],
        FixtureFactory::object_storage(backend),
    )
    .await;

    let summary = orch.scan_resource(ScanRequest::new(TENANT, LAKE)).await.unwrap();
    assert_eq!(summary.status, RunStatus::Success);
    assert_eq!(summary.items_scanned, 2);

    let tree = orch.catalog_tree(TENANT).await.unwrap();
    assert_eq!(tree.len(), 1);
    let roots = &tree[0].nodes;
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].node.name, "archive");
    assert_eq!(roots[0].total_items(), 2);

    let year = &roots[0].children[0];
    assert_eq!(year.node.name, "2024");
    assert_eq!(year.node.item_count, 2);
    assert_eq!(year.node.total_size_bytes, 350);
    let names: Vec<_> = year.items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["feb.csv", "jan.csv"]);

    let stats = orch.resource_stats(TENANT).await.unwrap();
    assert_eq!(stats[0].scanned_nodes, 1);
}

#[tokio::test]
async fn test_object_path_outside_allow_list_fails_run() {
    let backend = MemoryBackend::new();
    backend.put_object("archive", "a.csv", 1);
    backend.put_object("private", "keys.txt", 1);
    let (orch, _store) = orchestrator(
        vec![registered(LAKE, "s3", s3_attributes(&["archive"]))],
        FixtureFactory::object_storage(backend),
    )
    .await;

    let summary = orch
        .scan_resource(ScanRequest::new(TENANT, LAKE).with_namespaces(["private/keys.txt"]))
        .await
        .unwrap();
    assert_eq!(summary.status, RunStatus::Failed);
    assert!(summary.message.unwrap().contains("private"));
}

#[tokio::test]
async fn test_browse_reads_upstream_without_touching_catalog() {
    let backend = MemoryBackend::new();
    backend.put_object("archive", "2024/jan.csv", 100);
    backend.put_object("archive", "readme.md", 3);
    let (orch, store) = orchestrator(
        vec![
            registered(LAKE, "s3", s3_attributes(&["archive"])),
            registered(WAREHOUSE, "postgres", relational_attributes()),
        ],
        FixtureFactory::relational(warehouse_upstream()).with_objects(backend),
    )
    .await;

    assert_eq!(
        orch.list_available_namespaces(TENANT, LAKE, None).await.unwrap(),
        vec!["archive".to_string()]
    );
    assert_eq!(
        orch.list_available_namespaces(TENANT, WAREHOUSE, None).await.unwrap(),
        vec!["sales".to_string(), "hr".to_string()]
    );

    let nodes = orch.list_object_nodes(TENANT, LAKE, "archive", None).await.unwrap();
    let names: Vec<_> = nodes.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["2024", "readme.md"]);

    let err = orch.list_object_nodes(TENANT, WAREHOUSE, "", None).await.unwrap_err();
    assert!(matches!(err, ScanError::Configuration(_)));

    assert!(store.list_resources(TENANT).await.unwrap().is_empty());
    assert!(orch.scan_history(TENANT, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_search_and_stats_after_scan() {
    let (orch, _store) = orchestrator(
        vec![registered(WAREHOUSE, "postgres", relational_attributes())],
        FixtureFactory::relational(warehouse_upstream()),
    )
    .await;
    orch.scan_resource(ScanRequest::new(TENANT, WAREHOUSE).with_namespaces(["sales"]))
        .await
        .unwrap();

    let tables = orch.search_tables(TENANT, "ORDER", 10).await.unwrap();
    let names: Vec<_> = tables.iter().map(|t| t.full_name.as_str()).collect();
    assert_eq!(names, vec!["sales.orders"]);

    let fields = orch.search_fields(TENANT, "customers_col", 3).await.unwrap();
    let names: Vec<_> = fields.iter().map(|f| f.field.name.as_str()).collect();
    assert_eq!(names, vec!["customers_col2", "customers_col3", "customers_col4"]);
    assert!(fields.iter().all(|f| f.table_full_name == "sales.customers"));

    let stats = orch.metadata_stats(TENANT).await.unwrap();
    assert_eq!(stats.resource_count, 1);
    assert_eq!((stats.namespace_count, stats.scanned_namespace_count), (1, 1));
    assert_eq!((stats.table_count, stats.field_count), (2, 15));
    assert_eq!(stats.object_count, 0);
}

// ============================================================================
// Single-table scans
// ============================================================================

#[tokio::test]
async fn test_table_scan_refreshes_one_table() {
    let upstream = warehouse_upstream();
    let (orch, store) = orchestrator(
        vec![registered(WAREHOUSE, "postgres", relational_attributes())],
        FixtureFactory::relational(upstream.clone()),
    )
    .await;
    orch.scan_resource(ScanRequest::new(TENANT, WAREHOUSE).with_namespaces(["sales"]))
        .await
        .unwrap();

    upstream.add_table("sales", "orders", 12);
    let summary = orch
        .scan_table(TableScanRequest {
            tenant_id: TENANT,
            external_id: WAREHOUSE,
            schema: "sales".into(),
            table: "orders".into(),
            token: None,
        })
        .await
        .unwrap();
    assert_eq!(summary.status, RunStatus::Success);
    assert_eq!((summary.items_scanned, summary.fields_scanned), (1, 12));

    let run = store.get_scan_run(TENANT, &summary.run_id).await.unwrap().unwrap();
    assert_eq!(run.mode, ScanMode::Manual);
    assert_eq!(run.targets, vec!["sales.orders".to_string()]);

    let hits = orch.search_fields(TENANT, "orders_col12", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(
        root_status(&store, WAREHOUSE, NodeKind::Schema, "sales").await,
        Some(ScanStatus::Scanned)
    );
}

#[tokio::test]
async fn test_table_scan_rejects_object_storage_and_busy_schema() {
    let backend = MemoryBackend::new();
    backend.put_object("archive", "a.csv", 1);
    let (orch, store) = orchestrator(
        vec![
            registered(LAKE, "s3", s3_attributes(&["archive"])),
            registered(WAREHOUSE, "postgres", relational_attributes()),
        ],
        FixtureFactory::relational(warehouse_upstream()).with_objects(backend),
    )
    .await;
    let request = |external, schema: &str| TableScanRequest {
        tenant_id: TENANT,
        external_id: external,
        schema: schema.into(),
        table: "orders".into(),
        token: None,
    };

    let summary = orch.scan_table(request(LAKE, "archive")).await.unwrap();
    assert_eq!(summary.status, RunStatus::Failed);
    assert!(summary.message.unwrap().contains("not relational"));

    orch.scan_resource(ScanRequest::new(TENANT, WAREHOUSE).with_namespaces(["sales"]))
        .await
        .unwrap();
    let resource = store.get_resource(TENANT, WAREHOUSE).await.unwrap().unwrap();
    let key = SubtreeKey::new(TENANT, &resource.id, NodeKind::Schema, "sales");
    let guard = orch.locks().try_acquire(key).unwrap();

    let summary = orch.scan_table(request(WAREHOUSE, "sales")).await.unwrap();
    assert_eq!(summary.status, RunStatus::Failed);
    assert!(summary.message.unwrap().contains("already being scanned"));

    drop(guard);
    let summary = orch.scan_table(request(WAREHOUSE, "hr")).await.unwrap();
    assert_eq!(summary.status, RunStatus::Failed);
    assert!(summary.message.unwrap().contains("not in the catalog"));
}
