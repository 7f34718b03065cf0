use super::Reconciler;
use crate::error::{Result, ScanError};
use atlas_connect::{FieldSummary, RelationalConnector, SchemaSummary, TableSummary};
use atlas_db::{
    CatalogNode, CatalogResource, ColumnAttribute, ItemAttributes, ItemKind, ItemUpsert,
    NodeAggregate, NodeAttributes, NodeUpsert, ScanCounts, TableAttributes,
};
use tracing::{debug, info, warn};

impl Reconciler {
    /// Full pass over one schema (Postgres) or database (MySQL).
    pub async fn reconcile_schema(
        &self,
        resource: &CatalogResource,
        conn: &dyn RelationalConnector,
        schema: &SchemaSummary,
    ) -> Result<ScanCounts> {
        let node = self
            .store
            .upsert_node(&NodeUpsert {
                tenant_id: resource.tenant_id,
                resource_id: resource.id.clone(),
                parent_id: None,
                kind: super::namespace_kind(conn.kind()),
                name: schema.name.clone(),
                attributes: Some(NodeAttributes::Namespace {
                    reported_table_count: schema.table_count,
                    reported_size_bytes: schema.size_bytes,
                    charset: schema.charset.clone(),
                    collation: schema.collation.clone(),
                }),
            })
            .await?;

        self.store.begin_node_scan(resource.tenant_id, &node.id).await?;

        match self.replace_tables(&node, conn).await {
            Ok((aggregate, mut counts)) => {
                self.store
                    .finish_node_scan(resource.tenant_id, &node.id, aggregate)
                    .await?;
                counts.namespaces_scanned = 1;
                info!(
                    schema = %node.full_name,
                    tables = counts.items_scanned,
                    fields = counts.fields_scanned,
                    skipped = counts.skipped,
                    "Schema reconciled"
                );
                Ok(counts)
            }
            Err(e) => {
                self.mark_failed(resource.tenant_id, &node.id, &e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Refresh one table of a namespace that is already in the catalog.
    ///
    /// Sibling items and the namespace scan status are left alone. A table
    /// that vanished upstream is removed. The namespace aggregate is
    /// recomputed from its items afterwards.
    pub async fn reconcile_table(
        &self,
        resource: &CatalogResource,
        conn: &dyn RelationalConnector,
        schema: &str,
        table: &str,
    ) -> Result<ScanCounts> {
        let tenant_id = resource.tenant_id;
        let kind = super::namespace_kind(conn.kind());
        let node = self
            .store
            .get_node(tenant_id, &resource.id, None, kind, schema)
            .await?
            .ok_or_else(|| {
                ScanError::configuration(format!(
                    "{} '{}' is not in the catalog yet; scan it first",
                    kind, schema
                ))
            })?;

        let upstream = conn
            .scan_tables(schema)
            .await?
            .into_iter()
            .find(|t| t.name == table);

        let mut counts = ScanCounts::default();
        match upstream {
            Some(summary) => {
                let fields = conn.scan_fields(schema, table).await?;
                let item = table_item(&node, &summary, &fields);
                // A table that became a view (or back) leaves its old row behind
                let other = match item.kind {
                    ItemKind::View => ItemKind::Table,
                    _ => ItemKind::View,
                };
                self.store.delete_item(tenant_id, &node.id, other, table).await?;
                self.store.upsert_item(&item).await?;
                counts.items_scanned = 1;
                counts.fields_scanned = fields.len() as u64;
            }
            None => {
                let mut removed = false;
                for kind in [ItemKind::Table, ItemKind::View] {
                    removed |= self.store.delete_item(tenant_id, &node.id, kind, table).await?;
                }
                if removed {
                    info!(schema = %node.full_name, table, "Removed vanished table");
                }
            }
        }

        let aggregate = self.store.sum_children(tenant_id, &node.id).await?;
        self.store.set_node_aggregate(tenant_id, &node.id, aggregate).await?;
        debug!(
            schema = %node.full_name,
            table,
            fields = counts.fields_scanned,
            "Table reconciled"
        );
        Ok(counts)
    }

    async fn replace_tables(
        &self,
        node: &CatalogNode,
        conn: &dyn RelationalConnector,
    ) -> Result<(NodeAggregate, ScanCounts)> {
        let (items, nodes) = self.store.clear_subtree(node.tenant_id, &node.id).await?;
        debug!(schema = %node.name, items, nodes, "Cleared schema subtree");

        let tables = conn.scan_tables(&node.name).await?;

        let mut aggregate = NodeAggregate::default();
        let mut counts = ScanCounts::default();
        for table in tables {
            let fields = match conn.scan_fields(&node.name, &table.name).await {
                Ok(fields) => fields,
                Err(e) if e.is_connection_level() => return Err(ScanError::from(e)),
                Err(e) => {
                    warn!(schema = %node.name, table = %table.name, error = %e, "Skipping table");
                    counts.skipped += 1;
                    continue;
                }
            };

            let item = self.store.upsert_item(&table_item(node, &table, &fields)).await?;
            aggregate.add_item(item.size_bytes);
            counts.items_scanned += 1;
            counts.fields_scanned += fields.len() as u64;
        }

        Ok((aggregate, counts))
    }
}

fn table_item(node: &CatalogNode, table: &TableSummary, fields: &[FieldSummary]) -> ItemUpsert {
    ItemUpsert {
        tenant_id: node.tenant_id,
        node_id: node.id.clone(),
        kind: if table.is_view() {
            ItemKind::View
        } else {
            ItemKind::Table
        },
        name: table.name.clone(),
        row_count: table.row_count_estimate,
        size_bytes: table.size_bytes.unwrap_or(0).max(0),
        last_modified_at: None,
        attributes: ItemAttributes::RelationalTable(TableAttributes {
            table_type: table.kind.clone(),
            comment: table.comment.clone(),
            fields: fields.iter().map(column_attribute).collect(),
        }),
    }
}

fn column_attribute(field: &FieldSummary) -> ColumnAttribute {
    ColumnAttribute {
        name: field.name.clone(),
        ordinal: field.ordinal,
        data_type: field.data_type.clone(),
        nullable: field.nullable,
        default_value: field.default.clone(),
        comment: field.comment.clone(),
        is_primary_key: field.is_primary_key,
        is_unique_key: field.is_unique_key,
        charset: field.charset.clone(),
        collation: field.collation.clone(),
        precision: field.precision,
        scale: field.scale,
    }
}
