//! Keyword search and tenant-wide counts
//!
//! Matching is a case-insensitive substring test (SQLite `LIKE`) on names
//! and comments. An empty keyword matches everything up to the limit.

use crate::error::{DbError, Result};
use crate::items::ITEM_COLUMNS;
use crate::types::*;
use crate::CatalogDb;
use atlas_ids::{ItemId, ResourceId, TenantId};
use sqlx::Row;

/// Hits returned when the caller does not ask for a limit.
pub const DEFAULT_SEARCH_LIMIT: u32 = 100;

/// `%keyword%` with LIKE wildcards in the keyword taken literally.
fn like_pattern(keyword: &str) -> String {
    let mut pattern = String::with_capacity(keyword.len() + 2);
    pattern.push('%');
    for c in keyword.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

impl CatalogDb {
    /// Tables and views whose name or comment contains `keyword`.
    pub async fn search_items(
        &self,
        tenant_id: TenantId,
        keyword: &str,
        limit: u32,
    ) -> Result<Vec<CatalogItem>> {
        let rows = sqlx::query(&format!(
            r#"SELECT {ITEM_COLUMNS} FROM catalog_items
               WHERE tenant_id = ?1
                 AND kind IN ('table', 'view')
                 AND (name LIKE ?2 ESCAPE '\'
                      OR json_extract(attributes, '$.comment') LIKE ?2 ESCAPE '\')
               ORDER BY full_name
               LIMIT ?3"#
        ))
        .bind(tenant_id.get())
        .bind(like_pattern(keyword))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| self.row_to_item(row)).collect()
    }

    /// Columns whose name or comment contains `keyword`, across every table
    /// of the tenant.
    pub async fn search_fields(
        &self,
        tenant_id: TenantId,
        keyword: &str,
        limit: u32,
    ) -> Result<Vec<FieldMatch>> {
        let rows = sqlx::query(
            r#"SELECT i.id AS item_id, i.resource_id, i.full_name, f.value AS field
               FROM catalog_items i, json_each(i.attributes, '$.fields') f
               WHERE i.tenant_id = ?1
                 AND i.kind IN ('table', 'view')
                 AND (json_extract(f.value, '$.name') LIKE ?2 ESCAPE '\'
                      OR json_extract(f.value, '$.comment') LIKE ?2 ESCAPE '\')
               ORDER BY i.full_name, json_extract(f.value, '$.ordinal')
               LIMIT ?3"#,
        )
        .bind(tenant_id.get())
        .bind(like_pattern(keyword))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let item_id: String = row.get("item_id");
                let resource_id: String = row.get("resource_id");
                let field: String = row.get("field");
                Ok(FieldMatch {
                    item_id: ItemId::parse(&item_id)
                        .map_err(|e| DbError::invalid_state(e.to_string()))?,
                    resource_id: ResourceId::parse(&resource_id)
                        .map_err(|e| DbError::invalid_state(e.to_string()))?,
                    table_full_name: row.get("full_name"),
                    field: serde_json::from_str(&field)?,
                })
            })
            .collect()
    }

    /// Resource, namespace, table, field and object counts for a tenant.
    pub async fn metadata_stats(&self, tenant_id: TenantId) -> Result<MetadataStats> {
        let row = sqlx::query(
            r#"SELECT
                   (SELECT COUNT(*) FROM catalog_resources WHERE tenant_id = ?1) AS resources,
                   (SELECT COUNT(*) FROM catalog_nodes
                     WHERE tenant_id = ?1 AND parent_id IS NULL AND deleted_at IS NULL) AS namespaces,
                   (SELECT COUNT(*) FROM catalog_nodes
                     WHERE tenant_id = ?1 AND parent_id IS NULL AND deleted_at IS NULL
                       AND scan_status = 'scanned') AS scanned_namespaces,
                   (SELECT COUNT(*) FROM catalog_items
                     WHERE tenant_id = ?1 AND kind IN ('table', 'view')) AS tables,
                   (SELECT COALESCE(SUM(json_array_length(attributes, '$.fields')), 0)
                      FROM catalog_items
                     WHERE tenant_id = ?1 AND kind IN ('table', 'view')) AS fields,
                   (SELECT COUNT(*) FROM catalog_items
                     WHERE tenant_id = ?1 AND kind = 'object') AS objects,
                   (SELECT COALESCE(SUM(size_bytes), 0) FROM catalog_items
                     WHERE tenant_id = ?1) AS bytes"#,
        )
        .bind(tenant_id.get())
        .fetch_one(&self.pool)
        .await?;

        Ok(MetadataStats {
            resource_count: row.get("resources"),
            namespace_count: row.get("namespaces"),
            scanned_namespace_count: row.get("scanned_namespaces"),
            table_count: row.get("tables"),
            field_count: row.get("fields"),
            object_count: row.get("objects"),
            total_size_bytes: row.get("bytes"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_ids::{ExternalResourceId, NodeId};

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("order"), "%order%");
        assert_eq!(like_pattern(" 100%_x "), "%100\\%\\_x%");
        assert_eq!(like_pattern(""), "%%");
    }

    fn column(name: &str, ordinal: i32, comment: Option<&str>) -> ColumnAttribute {
        ColumnAttribute {
            name: name.to_string(),
            ordinal,
            data_type: "text".to_string(),
            nullable: true,
            comment: comment.map(str::to_string),
            ..ColumnAttribute::default()
        }
    }

    async fn seed_table(
        db: &CatalogDb,
        tenant: TenantId,
        node: &NodeId,
        name: &str,
        comment: Option<&str>,
        fields: Vec<ColumnAttribute>,
    ) {
        db.upsert_item(&ItemUpsert {
            tenant_id: tenant,
            node_id: node.clone(),
            kind: ItemKind::Table,
            name: name.to_string(),
            row_count: Some(10),
            size_bytes: 100,
            last_modified_at: None,
            attributes: ItemAttributes::RelationalTable(TableAttributes {
                table_type: "BASE TABLE".to_string(),
                comment: comment.map(str::to_string),
                fields,
            }),
        })
        .await
        .unwrap();
    }

    async fn seed(db: &CatalogDb, tenant: i64) -> NodeId {
        let tenant = TenantId::new(tenant);
        let resource = db
            .upsert_resource(&ResourceUpsert {
                tenant_id: tenant,
                external_id: ExternalResourceId::new(10),
                kind: "postgres".into(),
                engine: "postgres".into(),
                name: "warehouse".into(),
                config: Default::default(),
                status: EntityStatus::Active,
            })
            .await
            .unwrap();
        let sales = db
            .upsert_node(&NodeUpsert {
                tenant_id: tenant,
                resource_id: resource.id.clone(),
                parent_id: None,
                kind: NodeKind::Schema,
                name: "sales".into(),
                attributes: None,
            })
            .await
            .unwrap();
        seed_table(
            db,
            tenant,
            &sales.id,
            "orders",
            Some("customer purchases"),
            vec![column("id", 1, None), column("customer_id", 2, Some("buyer"))],
        )
        .await;
        seed_table(db, tenant, &sales.id, "invoices", None, vec![column("total", 1, None)]).await;
        sales.id
    }

    #[tokio::test]
    async fn test_search_items_matches_name_or_comment() {
        let db = CatalogDb::open_in_memory().await.unwrap();
        seed(&db, 1).await;
        let tenant = TenantId::new(1);

        let by_name: Vec<_> = db
            .search_items(tenant, "ORDER", DEFAULT_SEARCH_LIMIT)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.full_name)
            .collect();
        assert_eq!(by_name, vec!["sales.orders"]);

        let by_comment = db.search_items(tenant, "purchase", DEFAULT_SEARCH_LIMIT).await.unwrap();
        assert_eq!(by_comment.len(), 1);

        assert_eq!(db.search_items(tenant, "", DEFAULT_SEARCH_LIMIT).await.unwrap().len(), 2);
        assert_eq!(db.search_items(tenant, "", 1).await.unwrap().len(), 1);
        assert!(db.search_items(tenant, "%", DEFAULT_SEARCH_LIMIT).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_fields_reads_inline_columns() {
        let db = CatalogDb::open_in_memory().await.unwrap();
        seed(&db, 1).await;
        let tenant = TenantId::new(1);

        let hits = db.search_fields(tenant, "customer", DEFAULT_SEARCH_LIMIT).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].table_full_name, "sales.orders");
        assert_eq!(hits[0].field.name, "customer_id");
        assert_eq!(hits[0].field.ordinal, 2);

        let by_comment = db.search_fields(tenant, "buyer", DEFAULT_SEARCH_LIMIT).await.unwrap();
        assert_eq!(by_comment[0].field.name, "customer_id");

        let all: Vec<_> = db
            .search_fields(tenant, "", DEFAULT_SEARCH_LIMIT)
            .await
            .unwrap()
            .into_iter()
            .map(|hit| (hit.table_full_name, hit.field.name))
            .collect();
        assert_eq!(
            all,
            vec![
                ("sales.invoices".to_string(), "total".to_string()),
                ("sales.orders".to_string(), "id".to_string()),
                ("sales.orders".to_string(), "customer_id".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_search_and_stats_are_tenant_scoped() {
        let db = CatalogDb::open_in_memory().await.unwrap();
        seed(&db, 1).await;
        seed(&db, 2).await;

        assert_eq!(db.search_items(TenantId::new(2), "orders", 10).await.unwrap().len(), 1);
        assert!(db.search_fields(TenantId::new(3), "", 10).await.unwrap().is_empty());

        let stats = db.metadata_stats(TenantId::new(1)).await.unwrap();
        assert_eq!(
            stats,
            MetadataStats {
                resource_count: 1,
                namespace_count: 1,
                scanned_namespace_count: 0,
                table_count: 2,
                field_count: 3,
                object_count: 0,
                total_size_bytes: 200,
            }
        );
        assert_eq!(db.metadata_stats(TenantId::new(9)).await.unwrap(), MetadataStats::default());
    }
}
