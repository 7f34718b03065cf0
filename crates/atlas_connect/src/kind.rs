//! Declared resource kinds and the connector family each one maps to.

use crate::error::{ConnectorError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Postgres,
    MySql,
    /// Any S3-compatible store (AWS, MinIO, OSS)
    S3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorFamily {
    Relational,
    ObjectStorage,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [Self::Postgres, Self::MySql, Self::S3];

    /// Canonical name stored in the catalog.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::S3 => "s3",
        }
    }

    /// Parse a declared kind, accepting the aliases the registry uses.
    /// Unknown kinds are a configuration error.
    pub fn parse(declared: &str) -> Result<Self> {
        match declared.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" => Ok(Self::MySql),
            "s3" | "minio" | "oss" | "object_storage" | "object-storage" => Ok(Self::S3),
            other => Err(ConnectorError::configuration(format!(
                "unsupported resource kind '{}'",
                other
            ))),
        }
    }

    pub fn family(&self) -> ConnectorFamily {
        match self {
            Self::Postgres | Self::MySql => ConnectorFamily::Relational,
            Self::S3 => ConnectorFamily::ObjectStorage,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_aliases() {
        assert_eq!(ResourceKind::parse("PostgreSQL").unwrap(), ResourceKind::Postgres);
        assert_eq!(ResourceKind::parse(" postgres ").unwrap(), ResourceKind::Postgres);
        assert_eq!(ResourceKind::parse("mysql").unwrap(), ResourceKind::MySql);
        for alias in ["s3", "minio", "oss", "object_storage", "object-storage"] {
            assert_eq!(ResourceKind::parse(alias).unwrap(), ResourceKind::S3);
        }
    }

    #[test]
    fn test_unknown_kind_fails_closed() {
        let err = ResourceKind::parse("oracle").unwrap_err();
        assert!(matches!(err, ConnectorError::Configuration(_)));
    }

    #[test]
    fn test_family() {
        assert_eq!(ResourceKind::MySql.family(), ConnectorFamily::Relational);
        assert_eq!(ResourceKind::S3.family(), ConnectorFamily::ObjectStorage);
    }
}
