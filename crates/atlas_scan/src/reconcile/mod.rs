//! Reconciliation: sync one catalog subtree to the live structure of the
//! external system.
//!
//! Every pass is a full replace. The subtree root is marked `Scanning`,
//! everything below it is cleared, the connector is enumerated, entities
//! are upserted with their aggregates and the root is marked `Scanned`.
//! A failure returns the root to `Unscanned` with the error recorded.

mod object;
mod relational;

pub use object::{split_object_path, ObjectTarget};

use atlas_connect::ResourceKind;
use atlas_db::{CatalogStore, NodeKind};
use atlas_ids::{NodeId, TenantId};
use std::sync::Arc;
use tracing::warn;

/// Applies connector output to the catalog store.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn CatalogStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.store
    }

    /// Record a failed pass on the subtree root. The original error wins;
    /// a secondary store failure is only logged.
    async fn mark_failed(&self, tenant_id: TenantId, node_id: &NodeId, error: &str) {
        if let Err(e) = self.store.fail_node_scan(tenant_id, node_id, error).await {
            warn!(node = %node_id, error = %e, "Could not record scan failure");
        }
    }
}

/// Node kind of a top-level relational namespace.
pub fn namespace_kind(kind: ResourceKind) -> NodeKind {
    match kind {
        ResourceKind::MySql => NodeKind::Database,
        ResourceKind::Postgres => NodeKind::Schema,
        ResourceKind::S3 => NodeKind::Bucket,
    }
}
