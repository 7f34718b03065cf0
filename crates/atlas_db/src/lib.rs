//! Catalog store for the Atlas data catalog.
//!
//! Persists the Resource → Node → Item tree that mirrors external storage
//! systems, plus scan-run bookkeeping. Every read and write is scoped by
//! tenant id. There are no business rules here beyond keeping `depth`,
//! `path` and `full_name` consistent with the parent chain.
//!
//! # Usage
//!
//! ```rust,ignore
//! use atlas_db::{CatalogDb, CatalogStore};
//!
//! let db = CatalogDb::open("~/.atlas_catalog/catalog.sqlite3").await?;
//! let roots = db.list_root_nodes(tenant, &resource.id, None).await?;
//! ```

mod error;
mod schema;
mod store;
mod types;

// Method implementations organized by entity
mod items;
mod nodes;
mod resources;
mod scan_runs;
mod search;

pub use error::{DbError, Result};
pub use search::DEFAULT_SEARCH_LIMIT;
pub use store::CatalogStore;
pub use types::*;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// SQLite-backed catalog store.
#[derive(Clone)]
pub struct CatalogDb {
    pool: SqlitePool,
}

impl CatalogDb {
    /// Open `path`, creating the file, its directory and the tables as needed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir)?,
            _ => {}
        }

        let db = Self::connect(
            SqlitePoolOptions::new().max_connections(5),
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal),
        )
        .await?;

        info!(path = %path.display(), "Catalog database opened");
        Ok(db)
    }

    /// Private in-memory catalog for tests and dry runs.
    ///
    /// Pinned to one connection that never expires; the database lives
    /// only as long as that connection.
    pub async fn open_in_memory() -> Result<Self> {
        Self::connect(
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None),
            SqliteConnectOptions::from_str("sqlite::memory:")?,
        )
        .await
    }

    async fn connect(pool: SqlitePoolOptions, options: SqliteConnectOptions) -> Result<Self> {
        let pool = pool.connect_with(options.foreign_keys(true)).await?;
        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// Raw pool, for queries the store traits do not cover.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

// Timestamps are stored as epoch milliseconds.
impl CatalogDb {
    pub fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// Out-of-range values fall back to now.
    pub fn millis_to_datetime(millis: i64) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp_millis(millis).unwrap_or_else(chrono::Utc::now)
    }

    pub(crate) fn opt_datetime(millis: Option<i64>) -> Option<chrono::DateTime<chrono::Utc>> {
        millis.map(Self::millis_to_datetime)
    }
}
