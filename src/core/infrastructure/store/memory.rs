//! In-memory implementation of the store traits.
//!
//! Deterministic and test-friendly; it is also what the daemon uses when no
//! external database is wired in. Contents are lost on restart.

use super::traits::{CacheRowStore, NodeStore, TaskStore};
use crate::core::domain::{
    error::{StoreError, StoreResult},
    model::{
        cache_record::{CacheRecord, NaturalKey},
        node::{Node, NodeId},
        resource_kind::ResourceKind,
        sync_task::{SyncTask, TaskId, TaskStatus},
    },
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryStore {
    nodes: RwLock<BTreeMap<NodeId, Node>>,
    rows: RwLock<BTreeMap<NaturalKey, CacheRecord>>,
    tasks: RwLock<BTreeMap<TaskId, SyncTask>>,
    // Never reused, even after a node's tasks are removed.
    task_sequence: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NodeStore for InMemoryStore {
    async fn upsert_node(&self, node: Node) -> StoreResult<()> {
        let mut guard = self.nodes.write().await;
        if let Some(other) = guard
            .values()
            .find(|existing| existing.name == node.name && existing.id != node.id)
        {
            return Err(StoreError::Conflict(format!(
                "node name '{}' already used by node {}",
                node.name, other.id
            )));
        }
        guard.insert(node.id, node);
        Ok(())
    }

    async fn get_node(&self, node_id: NodeId) -> StoreResult<Option<Node>> {
        let guard = self.nodes.read().await;
        Ok(guard.get(&node_id).cloned())
    }

    async fn list_nodes(&self) -> StoreResult<Vec<Node>> {
        let guard = self.nodes.read().await;
        Ok(guard.values().cloned().collect())
    }

    async fn remove_node(&self, node_id: NodeId) -> StoreResult<bool> {
        let removed = {
            let mut guard = self.nodes.write().await;
            guard.remove(&node_id).is_some()
        };
        if removed {
            self.rows
                .write()
                .await
                .retain(|key, _| key.node_id() != node_id);
            self.tasks
                .write()
                .await
                .retain(|_, task| task.node_id != node_id);
        }
        Ok(removed)
    }
}

#[async_trait]
impl CacheRowStore for InMemoryStore {
    async fn upsert_row(&self, row: CacheRecord) -> StoreResult<()> {
        let mut guard = self.rows.write().await;
        guard.insert(row.natural_key(), row);
        Ok(())
    }

    async fn list_rows(
        &self,
        kind: ResourceKind,
        node_id: NodeId,
    ) -> StoreResult<Vec<CacheRecord>> {
        let guard = self.rows.read().await;
        Ok(guard
            .iter()
            .filter(|(key, _)| key.kind() == kind && key.node_id() == node_id)
            .map(|(_, row)| row.clone())
            .collect())
    }

    async fn delete_row(&self, key: &NaturalKey) -> StoreResult<bool> {
        let mut guard = self.rows.write().await;
        Ok(guard.remove(key).is_some())
    }

    async fn purge_rows(&self, kind: ResourceKind, node_id: NodeId) -> StoreResult<usize> {
        let mut guard = self.rows.write().await;
        let before = guard.len();
        guard.retain(|key, _| !(key.kind() == kind && key.node_id() == node_id));
        Ok(before - guard.len())
    }
}

#[async_trait]
impl TaskStore for InMemoryStore {
    async fn insert_task(&self, mut task: SyncTask) -> StoreResult<SyncTask> {
        let mut guard = self.tasks.write().await;
        task.id = TaskId(self.task_sequence.fetch_add(1, Ordering::SeqCst) + 1);
        guard.insert(task.id, task.clone());
        Ok(task)
    }

    async fn update_task(&self, task: &SyncTask) -> StoreResult<()> {
        let mut guard = self.tasks.write().await;
        let slot = guard
            .get_mut(&task.id)
            .ok_or_else(|| StoreError::NotFound(format!("task {} not found", task.id)))?;
        *slot = task.clone();
        Ok(())
    }

    async fn recent_tasks(&self, kind: ResourceKind, limit: usize) -> StoreResult<Vec<SyncTask>> {
        let guard = self.tasks.read().await;
        Ok(guard
            .values()
            .rev()
            .filter(|task| task.kind == kind)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn latest_task(
        &self,
        kind: ResourceKind,
        node_id: NodeId,
    ) -> StoreResult<Option<SyncTask>> {
        let guard = self.tasks.read().await;
        Ok(guard
            .values()
            .rev()
            .find(|task| task.kind == kind && task.node_id == node_id)
            .cloned())
    }

    async fn tasks_with_status(&self, status: TaskStatus) -> StoreResult<Vec<SyncTask>> {
        let guard = self.tasks.read().await;
        Ok(guard
            .values()
            .filter(|task| task.status == status)
            .cloned()
            .collect())
    }
}
