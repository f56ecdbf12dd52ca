//! Persists the lifecycle of each reconcile run.

use crate::{CacheStore, Node, ResourceKind, SyncResult, SyncTask, TaskId, TaskStatus};
use chrono::Utc;
use std::sync::Arc;

/// Message recorded on tasks that were still running when the process died.
pub const INTERRUPTED_MESSAGE: &str = "interrupted by restart";

/// An open task owned by exactly one run.
///
/// [`TaskRecorder::finish`] consumes the handle, so a run records at most one
/// terminal state.
#[derive(Debug)]
pub struct TaskHandle {
    task: SyncTask,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.task.id
    }

    pub fn task(&self) -> &SyncTask {
        &self.task
    }
}

/// Writes task rows through the cache store.
#[derive(Clone)]
pub struct TaskRecorder {
    store: Arc<dyn CacheStore>,
}

impl TaskRecorder {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Inserts a `running` task for `kind` on `node`.
    pub async fn start(&self, kind: ResourceKind, node: &Node) -> SyncResult<TaskHandle> {
        let mut task = SyncTask::pending(kind, node.id, node.name.clone());
        task.status = TaskStatus::Running;
        task.started_at = Some(Utc::now());

        let task = self.store.insert_task(task).await?;
        Ok(TaskHandle { task })
    }

    /// Records how many items the run is going to process.
    pub async fn set_total(&self, handle: &mut TaskHandle, total: usize) -> SyncResult<()> {
        handle.task.total_count = total;
        self.store.update_task(&handle.task).await?;
        Ok(())
    }

    /// Closes the task: `completed` when `error` is `None`, otherwise `failed`.
    ///
    /// If the store rejects the write, it is retried once as `failed` with
    /// the store error appended to the message.
    pub async fn finish(
        &self,
        handle: TaskHandle,
        success: usize,
        failed: usize,
        error: Option<String>,
    ) -> SyncResult<SyncTask> {
        let mut task = handle.task;
        task.success_count = success;
        task.failed_count = failed;
        task.finished_at = Some(Utc::now());
        task.status = if error.is_some() {
            TaskStatus::Failed
        } else {
            TaskStatus::Completed
        };
        task.error_message = error;

        if let Err(e) = self.store.update_task(&task).await {
            tracing::warn!(
                task_id = %task.id,
                kind = %task.kind,
                node_id = %task.node_id,
                error = %e,
                "failed to record task result, retrying as failed"
            );
            let recorded = format!("failed to record task result: {}", e);
            task.status = TaskStatus::Failed;
            task.error_message = Some(match task.error_message.take() {
                Some(message) => format!("{}; {}", message, recorded),
                None => recorded,
            });
            self.store.update_task(&task).await?;
        }
        Ok(task)
    }

    /// Fails every task still marked `running`.
    ///
    /// Run guards are not persisted, so at startup any `running` row belongs
    /// to a run that no longer exists.
    pub async fn recover_stranded(&self) -> SyncResult<usize> {
        let stranded = self.store.tasks_with_status(TaskStatus::Running).await?;
        let now = Utc::now();
        for mut task in stranded.iter().cloned() {
            task.status = TaskStatus::Failed;
            task.finished_at = Some(now);
            task.error_message = Some(INTERRUPTED_MESSAGE.to_string());
            self.store.update_task(&task).await?;
            tracing::info!(
                task_id = %task.id,
                kind = %task.kind,
                node_id = %task.node_id,
                "marked stranded task as failed"
            );
        }
        Ok(stranded.len())
    }
}
