//! Relational connectors backed by sqlx pools.

mod mysql;
mod postgres;

pub use mysql::MySqlConnector;
pub use postgres::PostgresConnector;

/// Empty strings from catalog views mean "no value".
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
