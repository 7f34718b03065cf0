//! Reconciler behaviour against an in-memory catalog and fake upstreams.

use atlas_connect::{
    ConnectorError, ConnectorTimeouts, MemoryBackend, RelationalConnector, ResourceKind,
    S3Connector, SchemaSummary,
};
use atlas_db::*;
use atlas_ids::{ExternalResourceId, TenantId};
use atlas_scan::{Reconciler, ScanError};
use atlas_test_utils::FakeRelational;
use std::sync::Arc;

struct Harness {
    store: Arc<dyn CatalogStore>,
    reconciler: Reconciler,
    resource: CatalogResource,
}

async fn harness(kind: &str) -> Harness {
    let db = CatalogDb::open_in_memory().await.unwrap();
    let store: Arc<dyn CatalogStore> = Arc::new(db);
    let resource = store
        .upsert_resource(&ResourceUpsert {
            tenant_id: TenantId::new(1),
            external_id: ExternalResourceId::new(10),
            kind: kind.into(),
            engine: kind.into(),
            name: "fixture".into(),
            config: Default::default(),
            status: EntityStatus::Active,
        })
        .await
        .unwrap();
    Harness {
        reconciler: Reconciler::new(store.clone()),
        store,
        resource,
    }
}

impl Harness {
    async fn root(&self, kind: NodeKind, name: &str) -> CatalogNode {
        self.store
            .get_node(self.resource.tenant_id, &self.resource.id, None, kind, name)
            .await
            .unwrap()
            .unwrap()
    }

    async fn child(&self, parent: &CatalogNode, name: &str) -> Option<CatalogNode> {
        self.store
            .get_node(self.resource.tenant_id, &self.resource.id, Some(&parent.id), NodeKind::Prefix, name)
            .await
            .unwrap()
            .filter(|n| n.deleted_at.is_none())
    }

    /// (full name, depth, item count, size) of every live node, sorted.
    async fn node_shapes(&self) -> Vec<(String, u32, i64, i64)> {
        let mut shapes: Vec<_> = self
            .store
            .list_resource_nodes(self.resource.tenant_id, &self.resource.id)
            .await
            .unwrap()
            .into_iter()
            .map(|n| (n.full_name, n.depth, n.item_count, n.total_size_bytes))
            .collect();
        shapes.sort();
        shapes
    }

    async fn item_names(&self, node: &CatalogNode) -> Vec<String> {
        self.store
            .list_items(self.resource.tenant_id, &node.id)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect()
    }
}

fn archive(backend: &MemoryBackend) -> S3Connector<MemoryBackend> {
    S3Connector::new(backend.clone(), vec!["archive".into()], ConnectorTimeouts::default())
}

async fn schema_summary(upstream: &FakeRelational, name: &str) -> SchemaSummary {
    upstream
        .list_schemas()
        .await
        .unwrap()
        .into_iter()
        .find(|s| s.name == name)
        .unwrap()
}

fn field_count(item: &CatalogItem) -> usize {
    match &item.attributes {
        ItemAttributes::RelationalTable(table) => table.fields.len(),
        other => panic!("expected table attributes, got {:?}", other),
    }
}

// ============================================================================
// Relational
// ============================================================================

#[tokio::test]
async fn test_relational_schema_scan_builds_node_and_items() {
    let h = harness("postgres").await;
    let upstream = FakeRelational::new(ResourceKind::Postgres)
        .schema("sales")
        .table("orders", 10)
        .table("customers", 5);
    let schema = schema_summary(&upstream, "sales").await;

    let counts = h.reconciler.reconcile_schema(&h.resource, &upstream, &schema).await.unwrap();
    assert_eq!(counts.namespaces_scanned, 1);
    assert_eq!(counts.items_scanned, 2);
    assert_eq!(counts.fields_scanned, 15);

    let sales = h.root(NodeKind::Schema, "sales").await;
    assert_eq!(sales.scan_status, ScanStatus::Scanned);
    assert_eq!(sales.item_count, 2);
    assert!(sales.last_scan_at.is_some());

    let items = h.store.list_items(h.resource.tenant_id, &sales.id).await.unwrap();
    let orders = items.iter().find(|i| i.name == "orders").unwrap();
    let customers = items.iter().find(|i| i.name == "customers").unwrap();
    assert_eq!(field_count(orders), 10);
    assert_eq!(field_count(customers), 5);
    assert_eq!(orders.full_name, "sales.orders");
    assert_eq!(orders.kind, ItemKind::Table);
}

#[tokio::test]
async fn test_mysql_namespaces_are_databases_and_views_are_kept_apart() {
    let h = harness("mysql").await;
    let upstream = FakeRelational::new(ResourceKind::MySql)
        .schema("app")
        .table("users", 3)
        .view("active_users", 2);
    let schema = schema_summary(&upstream, "app").await;

    h.reconciler.reconcile_schema(&h.resource, &upstream, &schema).await.unwrap();

    let app = h.root(NodeKind::Database, "app").await;
    let items = h.store.list_items(h.resource.tenant_id, &app.id).await.unwrap();
    let view = items.iter().find(|i| i.name == "active_users").unwrap();
    assert_eq!(view.kind, ItemKind::View);
}

#[tokio::test]
async fn test_rescan_is_idempotent_and_drops_vanished_tables() {
    let h = harness("postgres").await;
    let upstream = FakeRelational::new(ResourceKind::Postgres)
        .schema("sales")
        .table("orders", 4)
        .table("customers", 2);
    let schema = schema_summary(&upstream, "sales").await;

    h.reconciler.reconcile_schema(&h.resource, &upstream, &schema).await.unwrap();
    h.reconciler.reconcile_schema(&h.resource, &upstream, &schema).await.unwrap();

    let sales = h.root(NodeKind::Schema, "sales").await;
    assert_eq!(h.item_names(&sales).await.len(), 2);
    assert_eq!(h.store.list_root_nodes(h.resource.tenant_id, &h.resource.id, None).await.unwrap().len(), 1);

    upstream.drop_table("sales", "customers");
    h.reconciler.reconcile_schema(&h.resource, &upstream, &schema).await.unwrap();

    let sales = h.root(NodeKind::Schema, "sales").await;
    assert_eq!(h.item_names(&sales).await, vec!["orders".to_string()]);
    assert_eq!(sales.item_count, 1);
}

#[tokio::test]
async fn test_single_table_refresh_leaves_siblings_alone() {
    let h = harness("postgres").await;
    let upstream = FakeRelational::new(ResourceKind::Postgres)
        .schema("sales")
        .table("orders", 4)
        .table("customers", 2);
    let schema = schema_summary(&upstream, "sales").await;
    h.reconciler.reconcile_schema(&h.resource, &upstream, &schema).await.unwrap();
    let before = h.root(NodeKind::Schema, "sales").await;

    upstream.add_table("sales", "orders", 7);
    upstream.add_table("sales", "returns", 1);
    let fields_before = upstream.calls().scan_fields;

    let counts = h
        .reconciler
        .reconcile_table(&h.resource, &upstream, "sales", "orders")
        .await
        .unwrap();
    assert_eq!((counts.items_scanned, counts.fields_scanned), (1, 7));
    assert_eq!(upstream.calls().scan_fields, fields_before + 1);

    let sales = h.root(NodeKind::Schema, "sales").await;
    let items = h.store.list_items(h.resource.tenant_id, &sales.id).await.unwrap();
    let orders = items.iter().find(|i| i.name == "orders").unwrap();
    let customers = items.iter().find(|i| i.name == "customers").unwrap();
    assert_eq!(field_count(orders), 7);
    assert_eq!(field_count(customers), 2);
    assert!(items.iter().all(|i| i.name != "returns"));

    assert_eq!(sales.scan_status, ScanStatus::Scanned);
    assert_eq!(sales.last_scan_at, before.last_scan_at);
    assert_eq!((sales.item_count, sales.total_size_bytes), (2, 2 * 8192));
}

#[tokio::test]
async fn test_single_table_refresh_removes_vanished_table() {
    let h = harness("postgres").await;
    let upstream = FakeRelational::new(ResourceKind::Postgres)
        .schema("sales")
        .table("orders", 4)
        .table("customers", 2);
    let schema = schema_summary(&upstream, "sales").await;
    h.reconciler.reconcile_schema(&h.resource, &upstream, &schema).await.unwrap();

    upstream.drop_table("sales", "customers");
    let counts = h
        .reconciler
        .reconcile_table(&h.resource, &upstream, "sales", "customers")
        .await
        .unwrap();
    assert_eq!(counts.items_scanned, 0);

    let sales = h.root(NodeKind::Schema, "sales").await;
    assert_eq!(h.item_names(&sales).await, vec!["orders".to_string()]);
    assert_eq!((sales.item_count, sales.total_size_bytes), (1, 8192));
}

#[tokio::test]
async fn test_single_table_refresh_needs_a_cataloged_namespace() {
    let h = harness("postgres").await;
    let upstream = FakeRelational::new(ResourceKind::Postgres).schema("hr").table("staff", 3);

    let err = h
        .reconciler
        .reconcile_table(&h.resource, &upstream, "hr", "staff")
        .await
        .unwrap_err();
    assert!(matches!(err, ScanError::Configuration(_)));
    assert!(h.store.list_resource_items(h.resource.tenant_id, &h.resource.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unreadable_table_is_skipped_not_fatal() {
    let h = harness("postgres").await;
    let upstream = FakeRelational::new(ResourceKind::Postgres)
        .schema("sales")
        .table("orders", 4)
        .table("secret", 2);
    upstream.fail_fields("sales", "secret", ConnectorError::enumeration("sales.secret", "permission denied"));
    let schema = schema_summary(&upstream, "sales").await;

    let counts = h.reconciler.reconcile_schema(&h.resource, &upstream, &schema).await.unwrap();
    assert_eq!(counts.items_scanned, 1);
    assert_eq!(counts.skipped, 1);

    let sales = h.root(NodeKind::Schema, "sales").await;
    assert_eq!(sales.scan_status, ScanStatus::Scanned);
    assert_eq!(h.item_names(&sales).await, vec!["orders".to_string()]);
}

#[tokio::test]
async fn test_failed_schema_scan_leaves_node_unscanned_with_error() {
    let h = harness("postgres").await;
    let upstream = FakeRelational::new(ResourceKind::Postgres).schema("sales").table("orders", 4);
    let schema = schema_summary(&upstream, "sales").await;
    h.reconciler.reconcile_schema(&h.resource, &upstream, &schema).await.unwrap();

    upstream.fail_tables("sales", ConnectorError::connection("connection reset"));
    let err = h.reconciler.reconcile_schema(&h.resource, &upstream, &schema).await.unwrap_err();
    assert!(matches!(err, ScanError::Connection(_)));

    let sales = h.root(NodeKind::Schema, "sales").await;
    assert_eq!(sales.scan_status, ScanStatus::Unscanned);
    assert!(sales.error_message.unwrap().contains("connection reset"));

    // A later successful pass clears the error
    upstream.clear_failures();
    h.reconciler.reconcile_schema(&h.resource, &upstream, &schema).await.unwrap();
    let sales = h.root(NodeKind::Schema, "sales").await;
    assert_eq!(sales.scan_status, ScanStatus::Scanned);
    assert!(sales.error_message.is_none());
}

// ============================================================================
// Object storage
// ============================================================================

#[tokio::test]
async fn test_bucket_scan_builds_prefix_tree_with_aggregates() {
    let h = harness("s3").await;
    let backend = MemoryBackend::new();
    backend.put_object("archive", "2024/jan.csv", 100);
    backend.put_object("archive", "2024/feb.csv", 250);

    let counts = h.reconciler.reconcile_object_path(&h.resource, &archive(&backend), "archive").await.unwrap();
    assert_eq!(counts.namespaces_scanned, 1);
    assert_eq!(counts.items_scanned, 2);

    let bucket = h.root(NodeKind::Bucket, "archive").await;
    assert_eq!(bucket.scan_status, ScanStatus::Scanned);
    assert_eq!((bucket.item_count, bucket.total_size_bytes), (2, 350));
    assert!(matches!(bucket.attributes, NodeAttributes::Storage { reported_object_count: 2, .. }));

    let year = h.child(&bucket, "2024").await.unwrap();
    assert_eq!((year.item_count, year.total_size_bytes), (2, 350));
    assert_eq!(year.full_name, "archive/2024");

    let mut names = h.item_names(&year).await;
    names.sort();
    assert_eq!(names, vec!["feb.csv".to_string(), "jan.csv".to_string()]);
    assert!(h.item_names(&bucket).await.is_empty());

    let items = h.store.list_items(h.resource.tenant_id, &year.id).await.unwrap();
    let jan = items.iter().find(|i| i.name == "jan.csv").unwrap();
    assert_eq!(jan.full_name, "archive/2024/jan.csv");
    match &jan.attributes {
        ItemAttributes::Object(attrs) => {
            assert_eq!(attrs.file_type.as_deref(), Some("csv"));
            assert_eq!(attrs.content_type.as_deref(), Some("text/csv"));
        }
        other => panic!("expected object attributes, got {:?}", other),
    }
}

#[tokio::test]
async fn test_bucket_rescan_reflects_external_delete() {
    let h = harness("s3").await;
    let backend = MemoryBackend::new();
    backend.put_object("archive", "2024/jan.csv", 100);
    backend.put_object("archive", "2024/feb.csv", 250);
    let conn = archive(&backend);

    h.reconciler.reconcile_object_path(&h.resource, &conn, "archive").await.unwrap();
    assert!(backend.remove_object("archive", "2024/jan.csv"));
    h.reconciler.reconcile_object_path(&h.resource, &conn, "archive").await.unwrap();

    let bucket = h.root(NodeKind::Bucket, "archive").await;
    let year = h.child(&bucket, "2024").await.unwrap();
    assert_eq!((year.item_count, year.total_size_bytes), (1, 250));
    assert_eq!(h.item_names(&year).await, vec!["feb.csv".to_string()]);
    assert_eq!(bucket.total_size_bytes, 250);
}

#[tokio::test]
async fn test_emptied_prefix_disappears_on_rescan() {
    let h = harness("s3").await;
    let backend = MemoryBackend::new();
    backend.put_object("archive", "2023/old.csv", 10);
    backend.put_object("archive", "2024/new.csv", 20);
    let conn = archive(&backend);

    h.reconciler.reconcile_object_path(&h.resource, &conn, "archive").await.unwrap();
    backend.remove_object("archive", "2023/old.csv");
    h.reconciler.reconcile_object_path(&h.resource, &conn, "archive").await.unwrap();

    let bucket = h.root(NodeKind::Bucket, "archive").await;
    assert!(h.child(&bucket, "2023").await.is_none());
    assert!(h.child(&bucket, "2024").await.is_some());
}

#[tokio::test]
async fn test_prefix_refresh_leaves_siblings_and_rolls_up() {
    let h = harness("s3").await;
    let backend = MemoryBackend::new();
    backend.put_object("archive", "root.csv", 5);
    backend.put_object("archive", "2023/old.csv", 10);
    backend.put_object("archive", "2024/01/a.csv", 100);
    let conn = archive(&backend);
    h.reconciler.reconcile_object_path(&h.resource, &conn, "archive").await.unwrap();

    // Changes on both sides, only 2024 is refreshed
    backend.put_object("archive", "2024/01/b.csv", 50);
    backend.put_object("archive", "2024/feb.csv", 7);
    backend.remove_object("archive", "2023/old.csv");

    let counts = h
        .reconciler
        .reconcile_object_path(&h.resource, &conn, "archive/2024")
        .await
        .unwrap();
    assert_eq!(counts.items_scanned, 3);

    let bucket = h.root(NodeKind::Bucket, "archive").await;
    let old = h.child(&bucket, "2023").await.unwrap();
    assert_eq!(h.item_names(&old).await, vec!["old.csv".to_string()]);

    let year = h.child(&bucket, "2024").await.unwrap();
    assert_eq!(year.scan_status, ScanStatus::Scanned);
    assert_eq!((year.item_count, year.total_size_bytes), (3, 157));
    let month = h.child(&year, "01").await.unwrap();
    assert_eq!((month.item_count, month.total_size_bytes), (2, 150));

    // Bucket = root.csv + stale 2023 + refreshed 2024
    assert_eq!((bucket.item_count, bucket.total_size_bytes), (5, 172));
}

#[tokio::test]
async fn test_single_object_refresh_and_forget() {
    let h = harness("s3").await;
    let backend = MemoryBackend::new();
    backend.put_object("archive", "2024/jan.csv", 100);
    backend.put_object("archive", "2024/feb.csv", 250);
    let conn = archive(&backend);
    h.reconciler.reconcile_object_path(&h.resource, &conn, "archive").await.unwrap();

    backend.put_object("archive", "2024/feb.csv", 400);
    let counts = h
        .reconciler
        .reconcile_object_path(&h.resource, &conn, "archive/2024/feb.csv")
        .await
        .unwrap();
    assert_eq!(counts.items_scanned, 1);

    let bucket = h.root(NodeKind::Bucket, "archive").await;
    let year = h.child(&bucket, "2024").await.unwrap();
    assert_eq!((year.item_count, year.total_size_bytes), (2, 500));
    assert_eq!(bucket.total_size_bytes, 500);

    backend.remove_object("archive", "2024/feb.csv");
    h.reconciler
        .reconcile_object_path(&h.resource, &conn, "archive/2024/feb.csv")
        .await
        .unwrap();

    let bucket = h.root(NodeKind::Bucket, "archive").await;
    let year = h.child(&bucket, "2024").await.unwrap();
    assert_eq!(h.item_names(&year).await, vec!["jan.csv".to_string()]);
    assert_eq!((year.item_count, year.total_size_bytes), (1, 100));
    assert_eq!(bucket.total_size_bytes, 100);
}

#[tokio::test]
async fn test_vanished_prefix_refresh_prunes_emptied_ancestors() {
    let h = harness("s3").await;
    let backend = MemoryBackend::new();
    backend.put_object("archive", "2024/q1/feb.csv", 10);
    backend.put_object("archive", "2024/q1/mar.csv", 20);
    backend.put_object("archive", "top.csv", 1);
    let conn = archive(&backend);
    h.reconciler.reconcile_object_path(&h.resource, &conn, "archive").await.unwrap();

    backend.remove_object("archive", "2024/q1/feb.csv");
    backend.remove_object("archive", "2024/q1/mar.csv");
    h.reconciler
        .reconcile_object_path(&h.resource, &conn, "archive/2024/q1")
        .await
        .unwrap();
    let after_refresh = h.node_shapes().await;
    assert_eq!(after_refresh, vec![("archive".to_string(), 1, 1, 1)]);

    h.reconciler.reconcile_object_path(&h.resource, &conn, "archive").await.unwrap();
    assert_eq!(h.node_shapes().await, after_refresh);
}

#[tokio::test]
async fn test_vanished_object_keeps_ancestors_that_still_hold_data() {
    let h = harness("s3").await;
    let backend = MemoryBackend::new();
    backend.put_object("archive", "2024/q1/feb.csv", 10);
    backend.put_object("archive", "2024/jan.csv", 5);
    let conn = archive(&backend);
    h.reconciler.reconcile_object_path(&h.resource, &conn, "archive").await.unwrap();

    backend.remove_object("archive", "2024/q1/feb.csv");
    h.reconciler
        .reconcile_object_path(&h.resource, &conn, "archive/2024/q1/feb.csv")
        .await
        .unwrap();

    assert_eq!(
        h.node_shapes().await,
        vec![("archive".to_string(), 1, 1, 5), ("archive/2024".to_string(), 2, 1, 5)]
    );
}

#[tokio::test]
async fn test_keys_with_empty_segments_leave_bucket_attributes_alone() {
    let h = harness("s3").await;
    let backend = MemoryBackend::new();
    backend.put_object("archive", "a//b.csv", 5);
    backend.put_object("archive", "/lead.csv", 7);
    backend.put_object("archive", "2024/jan.csv", 100);
    let conn = archive(&backend);

    let counts = h.reconciler.reconcile_object_path(&h.resource, &conn, "archive").await.unwrap();
    assert_eq!(counts.items_scanned, 3);

    let bucket = h.root(NodeKind::Bucket, "archive").await;
    assert!(matches!(
        bucket.attributes,
        NodeAttributes::Storage { reported_object_count: 3, reported_size_bytes: 112, .. }
    ));
    assert_eq!(
        h.node_shapes().await,
        vec![
            ("archive".to_string(), 1, 3, 112),
            ("archive/2024".to_string(), 2, 1, 100),
            ("archive/a".to_string(), 2, 1, 5),
        ]
    );
    assert_eq!(h.item_names(&bucket).await, vec!["lead.csv".to_string()]);
    let a = h.child(&bucket, "a").await.unwrap();
    assert_eq!(h.item_names(&a).await, vec!["b.csv".to_string()]);
}

#[tokio::test]
async fn test_reserved_segments_never_reach_the_catalog() {
    let h = harness("s3").await;
    let backend = MemoryBackend::new();
    backend.put_object("archive", "data/a.csv", 1);
    backend.put_object("archive", "__bucket__/meta.json", 1);
    backend.put_object("archive", "data/.minio.sys/format.json", 1);
    let conn = archive(&backend);

    h.reconciler.reconcile_object_path(&h.resource, &conn, "archive").await.unwrap();

    let items = h.store.list_resource_items(h.resource.tenant_id, &h.resource.id).await.unwrap();
    let names: Vec<_> = items.iter().map(|i| i.full_name.as_str()).collect();
    assert_eq!(names, vec!["archive/data/a.csv"]);

    let nodes = h.store.list_resource_nodes(h.resource.tenant_id, &h.resource.id).await.unwrap();
    assert!(nodes.iter().all(|n| n.name != "__bucket__" && n.name != ".minio.sys"));

    let skipped = h
        .reconciler
        .reconcile_object_path(&h.resource, &conn, "archive/__bucket__")
        .await
        .unwrap();
    assert_eq!(skipped.skipped, 1);
}

#[tokio::test]
async fn test_unreachable_store_fails_bucket_node() {
    let h = harness("s3").await;
    let backend = MemoryBackend::new();
    backend.put_object("archive", "a.csv", 1);
    let conn = archive(&backend);
    h.reconciler.reconcile_object_path(&h.resource, &conn, "archive").await.unwrap();

    backend.set_offline(true);
    let err = h.reconciler.reconcile_object_path(&h.resource, &conn, "archive").await.unwrap_err();
    assert!(matches!(err, ScanError::Connection(_)));

    let bucket = h.root(NodeKind::Bucket, "archive").await;
    assert_eq!(bucket.scan_status, ScanStatus::Unscanned);
    assert!(bucket.error_message.is_some());
}

#[tokio::test]
async fn test_every_item_hangs_off_a_live_node_of_the_same_resource() {
    let h = harness("s3").await;
    let backend = MemoryBackend::new();
    for key in ["a/b/c/1.csv", "a/b/2.csv", "a/3.csv", "4.csv", "x/y/5.parquet"] {
        backend.put_object("archive", key, 10);
    }
    let conn = archive(&backend);
    h.reconciler.reconcile_object_path(&h.resource, &conn, "archive").await.unwrap();
    backend.remove_object("archive", "a/b/c/1.csv");
    h.reconciler.reconcile_object_path(&h.resource, &conn, "archive/a").await.unwrap();

    let tenant = h.resource.tenant_id;
    let nodes = h.store.list_resource_nodes(tenant, &h.resource.id).await.unwrap();
    let items = h.store.list_resource_items(tenant, &h.resource.id).await.unwrap();
    assert_eq!(items.len(), 4);
    for item in &items {
        let node = nodes.iter().find(|n| n.id == item.node_id).expect("item without node");
        assert_eq!(node.resource_id, item.resource_id);
        assert!(item.full_name.starts_with(&format!("{}/", node.full_name)));
    }

    let bucket = h.root(NodeKind::Bucket, "archive").await;
    let subtree = h.store.aggregate_subtree(tenant, &bucket.id).await.unwrap();
    assert_eq!(subtree, NodeAggregate { item_count: 4, total_size_bytes: 40 });
    assert_eq!((bucket.item_count, bucket.total_size_bytes), (4, 40));
}
