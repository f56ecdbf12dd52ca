use crate::core::domain::{
    error::StoreResult,
    model::{
        cache_record::{CacheRecord, NaturalKey},
        node::{Node, NodeId},
        resource_kind::ResourceKind,
        sync_task::{SyncTask, TaskStatus},
    },
};
use async_trait::async_trait;

/// Registry of managed nodes.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Insert or replace a node by id. Names must stay unique.
    async fn upsert_node(&self, node: Node) -> StoreResult<()>;

    async fn get_node(&self, node_id: NodeId) -> StoreResult<Option<Node>>;

    /// All nodes ordered by id.
    async fn list_nodes(&self) -> StoreResult<Vec<Node>>;

    /// Remove a node together with its cache rows and task history.
    ///
    /// Returns `false` when no such node existed.
    async fn remove_node(&self, node_id: NodeId) -> StoreResult<bool>;
}

/// Cache tables, addressed by natural key.
#[async_trait]
pub trait CacheRowStore: Send + Sync {
    /// Insert the row, or overwrite the existing row with the same natural key.
    async fn upsert_row(&self, row: CacheRecord) -> StoreResult<()>;

    /// Every row of `kind` belonging to `node_id`.
    async fn list_rows(&self, kind: ResourceKind, node_id: NodeId)
    -> StoreResult<Vec<CacheRecord>>;

    /// Delete one row. Returns `false` when the key was absent.
    async fn delete_row(&self, key: &NaturalKey) -> StoreResult<bool>;

    /// Delete every row of `kind` belonging to `node_id`, returning the count.
    async fn purge_rows(&self, kind: ResourceKind, node_id: NodeId) -> StoreResult<usize>;
}

/// Run history.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a new task and return it with its assigned id.
    async fn insert_task(&self, task: SyncTask) -> StoreResult<SyncTask>;

    /// Overwrite an existing task.
    async fn update_task(&self, task: &SyncTask) -> StoreResult<()>;

    /// Tasks of `kind`, newest first.
    async fn recent_tasks(&self, kind: ResourceKind, limit: usize) -> StoreResult<Vec<SyncTask>>;

    /// The newest task of `kind` for `node_id`.
    async fn latest_task(
        &self,
        kind: ResourceKind,
        node_id: NodeId,
    ) -> StoreResult<Option<SyncTask>>;

    /// Every task currently in `status`, any kind.
    async fn tasks_with_status(&self, status: TaskStatus) -> StoreResult<Vec<SyncTask>>;
}

/// Everything the sync engine needs from durable storage.
///
/// Writes are single-row upserts or deletes; the backend is expected to
/// serialize them internally.
pub trait CacheStore: NodeStore + CacheRowStore + TaskStore + Send + Sync {}

impl<T> CacheStore for T where T: NodeStore + CacheRowStore + TaskStore + Send + Sync {}
