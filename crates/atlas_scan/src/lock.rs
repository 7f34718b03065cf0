//! Per-subtree scan guards.
//!
//! At most one reconciliation may run against a root namespace at a time.
//! Acquisition never waits: a held subtree is reported as busy.

use crate::error::{Result, ScanError};
use atlas_db::NodeKind;
use atlas_ids::{ResourceId, TenantId};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubtreeKey {
    pub tenant_id: TenantId,
    pub resource_id: ResourceId,
    pub kind: NodeKind,
    pub name: String,
}

impl SubtreeKey {
    pub fn new(tenant_id: TenantId, resource_id: &ResourceId, kind: NodeKind, name: &str) -> Self {
        Self {
            tenant_id,
            resource_id: resource_id.clone(),
            kind,
            name: name.to_string(),
        }
    }
}

impl std::fmt::Display for SubtreeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}/{}", self.resource_id, self.kind, self.name)
    }
}

/// Set of subtrees currently being scanned. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct SubtreeLocks {
    held: Arc<Mutex<HashSet<SubtreeKey>>>,
}

impl SubtreeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the guard for `key`, or fail with [`ScanError::SubtreeBusy`].
    pub fn try_acquire(&self, key: SubtreeKey) -> Result<SubtreeGuard> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if !held.insert(key.clone()) {
            return Err(ScanError::SubtreeBusy(key.to_string()));
        }
        debug!(subtree = %key, "Acquired subtree guard");
        Ok(SubtreeGuard {
            held: Arc::clone(&self.held),
            key,
        })
    }

    pub fn is_held(&self, key: &SubtreeKey) -> bool {
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(key)
    }
}

/// Releases the subtree when dropped.
#[derive(Debug)]
pub struct SubtreeGuard {
    held: Arc<Mutex<HashSet<SubtreeKey>>>,
    key: SubtreeKey,
}

impl SubtreeGuard {
    pub fn key(&self) -> &SubtreeKey {
        &self.key
    }
}

impl Drop for SubtreeGuard {
    fn drop(&mut self) {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        held.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> SubtreeKey {
        SubtreeKey::new(TenantId::new(1), &ResourceId::new(), NodeKind::Schema, name)
    }

    #[test]
    fn test_second_acquire_is_busy_until_release() {
        let locks = SubtreeLocks::new();
        let sales = key("sales");

        let guard = locks.try_acquire(sales.clone()).unwrap();
        assert!(locks.is_held(&sales));
        assert!(matches!(
            locks.try_acquire(sales.clone()),
            Err(ScanError::SubtreeBusy(_))
        ));

        drop(guard);
        assert!(!locks.is_held(&sales));
        assert!(locks.try_acquire(sales).is_ok());
    }

    #[test]
    fn test_distinct_subtrees_do_not_contend() {
        let locks = SubtreeLocks::new();
        let resource = ResourceId::new();
        let _a = locks
            .try_acquire(SubtreeKey::new(TenantId::new(1), &resource, NodeKind::Schema, "sales"))
            .unwrap();
        let _b = locks
            .try_acquire(SubtreeKey::new(TenantId::new(1), &resource, NodeKind::Schema, "hr"))
            .unwrap();
        let _c = locks
            .try_acquire(SubtreeKey::new(TenantId::new(2), &resource, NodeKind::Schema, "sales"))
            .unwrap();
    }
}
