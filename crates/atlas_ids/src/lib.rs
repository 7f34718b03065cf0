//! Shared identifier wrappers for the Atlas catalog.
//!
//! Catalog-owned entities use UUID-backed ids. Tenants and external
//! resources are owned by the system-of-record and arrive as integers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {kind}: '{input}' ({reason})")]
pub struct IdParseError {
    kind: &'static str,
    input: String,
    reason: String,
}

impl IdParseError {
    fn new(kind: &'static str, input: &str, reason: impl ToString) -> Self {
        Self {
            kind,
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Which identifier failed to parse, e.g. `"node ID"`.
    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

/// Catalog-minted ids. Stored as the hyphenated UUID text so they read the
/// same in SQLite, JSON and log lines.
macro_rules! catalog_id {
    ($(#[$doc:meta])* $name:ident => $kind:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4().hyphenated().to_string())
            }

            pub fn parse(value: &str) -> Result<Self, IdParseError> {
                match Uuid::parse_str(value) {
                    Ok(_) => Ok(Self(value.to_string())),
                    Err(e) => Err(IdParseError::new($kind, value, e)),
                }
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(raw: &str) -> Result<Self, IdParseError> {
                $name::parse(raw)
            }
        }
    };
}

/// Integer ids handed to us by the system-of-record.
macro_rules! external_id {
    ($(#[$doc:meta])* $name:ident => $kind:literal) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub fn parse(value: &str) -> Result<Self, IdParseError> {
                value
                    .trim()
                    .parse()
                    .map(Self)
                    .map_err(|e| IdParseError::new($kind, value, e))
            }

            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(raw: &str) -> Result<Self, IdParseError> {
                $name::parse(raw)
            }
        }
    };
}

catalog_id!(
    /// Catalog row for a registered data source.
    ResourceId => "resource ID"
);
catalog_id!(NodeId => "node ID");
catalog_id!(ItemId => "item ID");
catalog_id!(ScanRunId => "scan run ID");

external_id!(TenantId => "tenant ID");
external_id!(
    /// Resource id in the upstream registry, not the catalog.
    ExternalResourceId => "external resource ID"
);
