//! Run history for reconciliation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::domain::model::{node::NodeId, resource_kind::ResourceKind};

/// Store-assigned task identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a run: `Pending` → `Running` → `Completed` | `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// One reconciliation run for a `(kind, node)` pair.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SyncTask {
    pub id: TaskId,
    pub kind: ResourceKind,
    pub node_id: NodeId,
    pub node_name: String,
    pub status: TaskStatus,
    pub total_count: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl SyncTask {
    /// A fresh, not yet persisted task. The store assigns the id on insert.
    pub fn pending(kind: ResourceKind, node_id: NodeId, node_name: impl Into<String>) -> Self {
        Self {
            id: TaskId(0),
            kind,
            node_id,
            node_name: node_name.into(),
            status: TaskStatus::Pending,
            total_count: 0,
            success_count: 0,
            failed_count: 0,
            started_at: None,
            finished_at: None,
            error_message: None,
        }
    }
}
