//! Resource registry: the boundary to the system-of-record that owns
//! resource definitions and credentials.
//!
//! Descriptors are fetched just-in-time per scan. Only the sanitized
//! attribute snapshot is ever written to the catalog.

use crate::error::{Result, ScanError};
use async_trait::async_trait;
use atlas_connect::{sanitize_attributes, Attributes, ConnectionDescriptor};
use atlas_db::{CatalogResource, CatalogStore, EntityStatus, ResourceUpsert};
use atlas_ids::{ExternalResourceId, TenantId};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A resource as the system-of-record describes it, credentials included.
#[derive(Clone)]
pub struct RegisteredResource {
    pub tenant_id: TenantId,
    pub external_id: ExternalResourceId,
    pub name: String,
    /// Declared kind, possibly an alias (`postgresql`, `minio`, ...)
    pub kind: String,
    pub is_active: bool,
    pub attributes: Attributes,
}

impl fmt::Debug for RegisteredResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredResource")
            .field("tenant_id", &self.tenant_id)
            .field("external_id", &self.external_id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("is_active", &self.is_active)
            .field("attributes", &sanitize_attributes(&self.attributes))
            .finish()
    }
}

/// Lookup service for resource definitions.
#[async_trait]
pub trait ResourceDirectory: Send + Sync {
    /// Resolve one resource. `token` is the caller's credential, forwarded
    /// to directories that scope decryption to the caller.
    async fn get_resource(
        &self,
        external_id: ExternalResourceId,
        token: Option<&str>,
    ) -> Result<Option<RegisteredResource>>;

    async fn list_resources(&self, tenant_id: TenantId) -> Result<Vec<RegisteredResource>>;
}

/// Fixed in-process directory, fed from configuration or tests.
#[derive(Debug, Clone, Default)]
pub struct StaticResourceDirectory {
    resources: Vec<RegisteredResource>,
}

impl StaticResourceDirectory {
    pub fn new(resources: Vec<RegisteredResource>) -> Self {
        Self { resources }
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[async_trait]
impl ResourceDirectory for StaticResourceDirectory {
    async fn get_resource(
        &self,
        external_id: ExternalResourceId,
        _token: Option<&str>,
    ) -> Result<Option<RegisteredResource>> {
        Ok(self
            .resources
            .iter()
            .find(|r| r.external_id == external_id)
            .cloned())
    }

    async fn list_resources(&self, tenant_id: TenantId) -> Result<Vec<RegisteredResource>> {
        Ok(self
            .resources
            .iter()
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .collect())
    }
}

/// Resolves resources for a tenant and mirrors them into the catalog.
#[derive(Clone)]
pub struct ResourceRegistry {
    directory: Arc<dyn ResourceDirectory>,
    store: Arc<dyn CatalogStore>,
}

impl ResourceRegistry {
    pub fn new(directory: Arc<dyn ResourceDirectory>, store: Arc<dyn CatalogStore>) -> Self {
        Self { directory, store }
    }

    /// Fetch a resource on behalf of `tenant_id`.
    ///
    /// A resource owned by another tenant is reported as access denied,
    /// never returned.
    pub async fn lookup(
        &self,
        tenant_id: TenantId,
        external_id: ExternalResourceId,
        token: Option<&str>,
    ) -> Result<RegisteredResource> {
        let registered = self
            .directory
            .get_resource(external_id, token)
            .await?
            .ok_or_else(|| ScanError::ResourceNotFound(external_id.to_string()))?;

        if registered.tenant_id != tenant_id {
            return Err(ScanError::AccessDenied(format!(
                "resource {} does not belong to tenant {}",
                external_id, tenant_id
            )));
        }
        Ok(registered)
    }

    /// Active resources visible to a tenant.
    pub async fn list_active(&self, tenant_id: TenantId) -> Result<Vec<RegisteredResource>> {
        let mut resources = self.directory.list_resources(tenant_id).await?;
        resources.retain(|r| r.tenant_id == tenant_id && r.is_active);
        resources.sort_by_key(|r| r.external_id);
        Ok(resources)
    }

    /// Build the connection descriptor, failing on unknown kinds.
    pub fn descriptor(&self, registered: &RegisteredResource) -> Result<ConnectionDescriptor> {
        Ok(ConnectionDescriptor::new(
            &registered.kind,
            registered.attributes.clone(),
        )?)
    }

    /// Create or refresh the catalog row for a resource.
    pub async fn ensure_resource(
        &self,
        registered: &RegisteredResource,
        descriptor: &ConnectionDescriptor,
    ) -> Result<CatalogResource> {
        let resource = self
            .store
            .upsert_resource(&ResourceUpsert {
                tenant_id: registered.tenant_id,
                external_id: registered.external_id,
                kind: descriptor.kind.as_str().to_string(),
                engine: descriptor.engine.clone(),
                name: registered.name.clone(),
                config: descriptor.sanitized(),
                status: if registered.is_active {
                    EntityStatus::Active
                } else {
                    EntityStatus::Inactive
                },
            })
            .await?;

        debug!(
            resource = %resource.id,
            external_id = %registered.external_id,
            sync_version = resource.sync_version,
            "Catalog resource ensured"
        );
        Ok(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_db::CatalogDb;
    use serde_json::json;

    fn registered(tenant: i64, external: i64, kind: &str) -> RegisteredResource {
        RegisteredResource {
            tenant_id: TenantId::new(tenant),
            external_id: ExternalResourceId::new(external),
            name: format!("resource-{}", external),
            kind: kind.into(),
            is_active: true,
            attributes: json!({
                "host": "db.internal",
                "port": 5432,
                "username": "reader",
                "password": "hunter2",
                "database": "warehouse"
            })
            .as_object()
            .cloned()
            .unwrap(),
        }
    }

    async fn registry(resources: Vec<RegisteredResource>) -> (ResourceRegistry, Arc<CatalogDb>) {
        let db = Arc::new(CatalogDb::open_in_memory().await.unwrap());
        let registry = ResourceRegistry::new(
            Arc::new(StaticResourceDirectory::new(resources)),
            db.clone(),
        );
        (registry, db)
    }

    #[tokio::test]
    async fn test_lookup_enforces_tenant() {
        let (registry, _db) = registry(vec![registered(1, 10, "postgres")]).await;

        assert!(registry.lookup(TenantId::new(1), ExternalResourceId::new(10), None).await.is_ok());
        assert!(matches!(
            registry.lookup(TenantId::new(2), ExternalResourceId::new(10), None).await,
            Err(ScanError::AccessDenied(_))
        ));
        assert!(matches!(
            registry.lookup(TenantId::new(1), ExternalResourceId::new(11), None).await,
            Err(ScanError::ResourceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_ensure_resource_persists_sanitized_config() {
        let (registry, db) = registry(vec![registered(1, 10, "PostgreSQL")]).await;
        let reg = registry.lookup(TenantId::new(1), ExternalResourceId::new(10), None).await.unwrap();
        let descriptor = registry.descriptor(&reg).unwrap();

        let resource = registry.ensure_resource(&reg, &descriptor).await.unwrap();
        assert_eq!(resource.kind, "postgres");
        assert_eq!(resource.engine, "postgresql");
        assert!(!resource.config.contains_key("password"));

        let stored = db
            .get_resource(TenantId::new(1), ExternalResourceId::new(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, resource.id);
        assert!(!format!("{:?}", reg).contains("hunter2"));
    }

    #[tokio::test]
    async fn test_unknown_kind_is_configuration_error() {
        let (registry, _db) = registry(vec![registered(1, 10, "oracle")]).await;
        let reg = registry.lookup(TenantId::new(1), ExternalResourceId::new(10), None).await.unwrap();
        assert!(matches!(registry.descriptor(&reg), Err(ScanError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_list_active_skips_inactive() {
        let mut inactive = registered(1, 11, "mysql");
        inactive.is_active = false;
        let (registry, _db) =
            registry(vec![registered(1, 12, "postgres"), inactive, registered(2, 13, "s3")]).await;

        let active = registry.list_active(TenantId::new(1)).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].external_id, ExternalResourceId::new(12));
    }
}
