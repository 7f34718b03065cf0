//! Catalog scanning for Atlas.
//!
//! The [`ScanOrchestrator`] resolves resources through the
//! [`ResourceRegistry`], builds connectors, and drives the [`Reconciler`]
//! over each namespace under a per-subtree guard.

pub mod config;
pub mod error;
pub mod lock;
pub mod orchestrator;
pub mod reconcile;
pub mod registry;
pub mod tree;

pub use config::ScanConfig;
pub use error::{Result, ScanError};
pub use lock::{SubtreeGuard, SubtreeKey, SubtreeLocks};
pub use orchestrator::{
    ScanDispatch, ScanOrchestrator, ScanRequest, ScanRunSummary, TableScanRequest,
};
pub use reconcile::{namespace_kind, split_object_path, ObjectTarget, Reconciler};
pub use registry::{RegisteredResource, ResourceDirectory, ResourceRegistry, StaticResourceDirectory};
pub use tree::{build_resource_tree, NodeTree, ResourceTree};
