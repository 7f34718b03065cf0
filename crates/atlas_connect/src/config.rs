//! Deadlines for external calls.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorTimeouts {
    /// Establishing a connection / first request
    pub connect: Duration,
    /// One metadata query (schemas, tables, fields, stat)
    pub metadata_query: Duration,
    /// One recursive object-storage walk
    pub object_walk: Duration,
}

impl Default for ConnectorTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            metadata_query: Duration::from_secs(30),
            object_walk: Duration::from_secs(120),
        }
    }
}
