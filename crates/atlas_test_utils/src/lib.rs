//! Atlas Test Utilities
//!
//! In-memory fixtures for scan tests, plus Docker-based infrastructure for
//! exercising the real PostgreSQL and MySQL connectors.
//!
//! # Features
//!
//! - `docker-tests`: Enable tests that require Docker containers
//!
//! # Usage
//!
//! ```rust,ignore
//! use atlas_test_utils::{FakeRelational, FixtureFactory};
//! use atlas_connect::ResourceKind;
//!
//! let upstream = FakeRelational::new(ResourceKind::Postgres)
//!     .schema("sales")
//!     .table("orders", 5)
//!     .table("customers", 10);
//! let factory = FixtureFactory::relational(upstream.clone());
//! // hand `factory` to the orchestrator, then evolve `upstream`
//! upstream.drop_table("sales", "customers");
//! ```

pub mod cleanup;
pub mod config;
pub mod containers;
pub mod fixtures;
pub mod pools;

// Re-exports for convenience
pub use cleanup::{MySqlTestGuard, PostgresTestGuard};
pub use config::{DbVersion, TestDbConfig};
pub use containers::lifecycle::{ensure_container_running, wait_for_healthy};
pub use fixtures::{
    relational_attributes, s3_attributes, CallCounts, FakeRelational, FixtureFactory,
};
pub use pools::mysql::TestMySqlPool;
pub use pools::postgres::TestPgPool;
