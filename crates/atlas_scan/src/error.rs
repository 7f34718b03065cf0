//! Scan error taxonomy.
//!
//! Connector and store failures are folded into the categories the
//! orchestrator acts on: enumeration failures are skipped, everything
//! else ends the resource scan.

use atlas_connect::ConnectorError;
use atlas_db::DbError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScanError>;

#[derive(Error, Debug)]
pub enum ScanError {
    /// Unknown resource kind, missing attributes, inactive resource
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    /// One namespace, table or object could not be read
    #[error("Enumeration error: {0}")]
    Enumeration(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] DbError),

    #[error("Resource {0} not found")]
    ResourceNotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Subtree {0} is already being scanned")]
    SubtreeBusy(String),

    /// The resource directory could not answer
    #[error("Resource directory error: {0}")]
    Directory(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScanError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Errors after which no further namespace of the resource is attempted.
    pub fn aborts_resource(&self) -> bool {
        !matches!(self, Self::Enumeration(_) | Self::SubtreeBusy(_))
    }
}

impl From<ConnectorError> for ScanError {
    fn from(err: ConnectorError) -> Self {
        match err {
            ConnectorError::Configuration(msg) => Self::Configuration(msg),
            ConnectorError::Connection(_) | ConnectorError::Timeout { .. } => {
                Self::Connection(err.to_string())
            }
            ConnectorError::Enumeration { .. } => Self::Enumeration(err.to_string()),
            ConnectorError::BucketNotAllowed(_) => Self::AccessDenied(err.to_string()),
        }
    }
}
