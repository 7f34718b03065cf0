//! Connector error taxonomy.

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConnectorError>;

#[derive(Error, Debug, Clone)]
pub enum ConnectorError {
    /// Unknown resource kind or missing/invalid connection attributes.
    /// Raised before any network traffic.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Cannot reach or authenticate to the external system.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A single schema, table or object listing could not be read.
    #[error("Failed to enumerate {target}: {message}")]
    Enumeration { target: String, message: String },

    /// An external call exceeded its deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// Path points at a bucket outside the resource's allow-list.
    #[error("Bucket '{0}' is not allowed for this resource")]
    BucketNotAllowed(String),
}

impl ConnectorError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn enumeration(target: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Enumeration {
            target: target.into(),
            message: msg.into(),
        }
    }

    /// Errors that mean the whole resource is unusable for this scan.
    pub fn is_connection_level(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout { .. })
    }

    /// Classify a sqlx failure raised while reading `target`.
    pub(crate) fn from_sqlx(target: &str, err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Self::Connection(format!("{}: {}", target, err)),
            sqlx::Error::Configuration(e) => Self::Configuration(e.to_string()),
            other => Self::enumeration(target, other.to_string()),
        }
    }
}

/// Run `fut` with a deadline, mapping expiry to [`ConnectorError::Timeout`].
pub(crate) async fn with_timeout<T, F>(operation: &str, after: Duration, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(ConnectorError::Timeout {
            operation: operation.to_string(),
            after,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_level_classification() {
        assert!(ConnectorError::connection("refused").is_connection_level());
        assert!(ConnectorError::Timeout {
            operation: "list schemas".into(),
            after: Duration::from_secs(1)
        }
        .is_connection_level());
        assert!(!ConnectorError::enumeration("sales.orders", "denied").is_connection_level());
        assert!(!ConnectorError::configuration("no host").is_connection_level());
    }

    #[test]
    fn test_sqlx_pool_timeout_is_connection_error() {
        let err = ConnectorError::from_sqlx("schemas", sqlx::Error::PoolTimedOut);
        assert!(matches!(err, ConnectorError::Connection(_)));

        let err = ConnectorError::from_sqlx("sales.orders", sqlx::Error::RowNotFound);
        assert!(matches!(err, ConnectorError::Enumeration { .. }));
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result: Result<()> = with_timeout("slow call", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(ConnectorError::Timeout { .. })));
    }
}
