//! Catalog store failures.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

/// To the scanner every variant is a persistence failure; the split only
/// matters for messages and tests.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("catalog query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("catalog file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} not found in catalog")]
    NotFound(String),

    /// Unique key clash or a row whose parent belongs elsewhere
    #[error("catalog constraint violated: {0}")]
    Constraint(String),

    /// Stored value outside the known set, e.g. an unknown run status
    #[error("unrecognised catalog value: {0}")]
    InvalidState(String),

    #[error("could not encode attributes: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DbError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn constraint(detail: impl Into<String>) -> Self {
        Self::Constraint(detail.into())
    }

    pub fn invalid_state(detail: impl Into<String>) -> Self {
        Self::InvalidState(detail.into())
    }
}
