//! Per-`(kind, node)` mutual exclusion for reconcile runs.

use crate::core::domain::model::{node::NodeId, resource_kind::ResourceKind};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

type RunKey = (ResourceKind, NodeId);

/// Tracks which `(kind, node)` pairs currently have a run in flight.
///
/// Cloning is cheap and every clone shares the same set. The state lives only
/// in memory: after a restart nothing is marked running.
#[derive(Debug, Clone, Default)]
pub struct RunGuard {
    running: Arc<Mutex<HashSet<RunKey>>>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the set half-updated, so a
    // poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, HashSet<RunKey>> {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Marks `(kind, node_id)` as running.
    ///
    /// Returns `None` when a run for the pair is already in flight. The check
    /// and the insert happen under one lock, so two concurrent callers can
    /// never both succeed.
    pub fn try_acquire(&self, kind: ResourceKind, node_id: NodeId) -> Option<RunPermit> {
        let inserted = self.lock().insert((kind, node_id));
        inserted.then(|| RunPermit {
            guard: self.clone(),
            key: (kind, node_id),
        })
    }

    pub fn is_running(&self, kind: ResourceKind, node_id: NodeId) -> bool {
        self.lock().contains(&(kind, node_id))
    }

    /// Snapshot of every pair currently running, in no particular order.
    pub fn running(&self) -> Vec<(ResourceKind, NodeId)> {
        self.lock().iter().copied().collect()
    }
}

/// Proof that the holder owns the run slot for one `(kind, node)` pair.
///
/// Dropping the permit releases the slot, whichever way the run ends.
#[derive(Debug)]
pub struct RunPermit {
    guard: RunGuard,
    key: RunKey,
}

impl RunPermit {
    pub fn kind(&self) -> ResourceKind {
        self.key.0
    }

    pub fn node_id(&self) -> NodeId {
        self.key.1
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.guard.lock().remove(&self.key);
    }
}
