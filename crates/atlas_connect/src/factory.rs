//! Builds a live connector from a connection descriptor.

use crate::config::ConnectorTimeouts;
use crate::connector::Connector;
use crate::descriptor::{ConnectionDescriptor, RelationalSettings, S3Settings};
use crate::error::Result;
use crate::kind::ResourceKind;
use crate::object_storage::{S3Backend, S3Connector};
use crate::relational::{MySqlConnector, PostgresConnector};
use async_trait::async_trait;
use tracing::debug;

/// Seam between the orchestrator and the outside world. Tests substitute
/// a factory that hands out in-memory connectors.
#[async_trait]
pub trait ConnectorFactory: Send + Sync {
    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Connector>;
}

#[derive(Debug, Clone, Default)]
pub struct DefaultConnectorFactory {
    timeouts: ConnectorTimeouts,
}

impl DefaultConnectorFactory {
    pub fn new(timeouts: ConnectorTimeouts) -> Self {
        Self { timeouts }
    }
}

#[async_trait]
impl ConnectorFactory for DefaultConnectorFactory {
    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Connector> {
        debug!(kind = %descriptor.kind, engine = %descriptor.engine, "Building connector");
        match descriptor.kind {
            ResourceKind::Postgres => {
                let settings = RelationalSettings::from_descriptor(descriptor)?;
                let conn = PostgresConnector::connect(&settings, self.timeouts).await?;
                Ok(Connector::Relational(Box::new(conn)))
            }
            ResourceKind::MySql => {
                let settings = RelationalSettings::from_descriptor(descriptor)?;
                let conn = MySqlConnector::connect(&settings, self.timeouts).await?;
                Ok(Connector::Relational(Box::new(conn)))
            }
            ResourceKind::S3 => {
                let settings = S3Settings::from_descriptor(descriptor)?;
                let backend = S3Backend::new(&settings);
                Ok(Connector::ObjectStorage(Box::new(S3Connector::new(
                    backend,
                    settings.buckets,
                    self.timeouts,
                ))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectorError;
    use crate::kind::ConnectorFamily;
    use serde_json::json;

    fn descriptor(kind: &str, attrs: serde_json::Value) -> ConnectionDescriptor {
        ConnectionDescriptor::new(kind, attrs.as_object().cloned().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_before_connecting() {
        let factory = DefaultConnectorFactory::default();
        let err = factory
            .connect(&descriptor("postgres", json!({"host": "db", "port": 5432})))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_s3_connector_is_built_lazily() {
        let factory = DefaultConnectorFactory::default();
        let conn = factory
            .connect(&descriptor(
                "minio",
                json!({
                    "endpoint": "127.0.0.1:1",
                    "access_key": "AK",
                    "secret_key": "SK",
                    "bucket": "archive"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(conn.family(), ConnectorFamily::ObjectStorage);
        // Explicit allow-list answers without touching the endpoint
        assert_eq!(conn.list_namespaces().await.unwrap(), vec!["archive"]);
        conn.close().await;
    }
}
