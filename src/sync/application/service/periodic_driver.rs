//! Fleet-wide scheduling: the periodic container sync and the manual
//! "sync every node" operations.

use crate::{
    Node, ResourceKind, SyncError, SyncResult,
    sync::application::service::reconciler::{ListingStrategy, Reconciler},
};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Timing of the periodic container sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodicSettings {
    /// Pause after startup before the first fleet sync.
    pub startup_delay: Duration,
    /// Pause between fleet syncs.
    pub interval: Duration,
}

impl Default for PeriodicSettings {
    fn default() -> Self {
        Self {
            startup_delay: Duration::from_secs(10),
            interval: Duration::from_secs(300),
        }
    }
}

/// Background loop that keeps the container cache fresh.
///
/// Every tick launches one detached fan-out run per active node and does not
/// wait for them. A node still busy from the previous tick is skipped.
pub struct PeriodicDriver {
    reconciler: Reconciler,
    settings: PeriodicSettings,
    shutdown: CancellationToken,
}

impl PeriodicDriver {
    pub fn new(
        reconciler: Reconciler,
        settings: PeriodicSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            reconciler,
            settings,
            shutdown,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs until the shutdown token fires.
    pub async fn run(self) {
        tracing::info!(
            startup_delay = ?self.settings.startup_delay,
            interval = ?self.settings.interval,
            "periodic container sync started"
        );

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return,
            _ = tokio::time::sleep(self.settings.startup_delay) => {}
        }

        loop {
            match spawn_concurrent(
                &self.reconciler,
                ResourceKind::Container,
                ListingStrategy::FanOut,
                &self.shutdown,
            )
            .await
            {
                Ok(nodes) => tracing::info!(nodes, "periodic container sync dispatched"),
                Err(e) => tracing::error!(error = %e, "periodic container sync failed to start"),
            }

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
        }

        tracing::info!("periodic container sync stopped");
    }
}

async fn active_nodes(reconciler: &Reconciler) -> SyncResult<Vec<Node>> {
    let nodes = reconciler.store().list_nodes().await?;
    Ok(nodes.into_iter().filter(Node::is_active).collect())
}

fn log_run_error(kind: ResourceKind, node: &Node, error: &SyncError) {
    match error {
        SyncError::Cancelled => {
            tracing::info!(%kind, node = %node.name, "sync cancelled");
        }
        SyncError::AlreadyRunning { .. } => {
            tracing::debug!(%kind, node = %node.name, "sync already running, skipped");
        }
        e => {
            tracing::error!(%kind, node_id = %node.id, node = %node.name, error = %e, "sync failed");
        }
    }
}

/// Launches one detached run per active node, all at once.
///
/// Returns the number of runs started. Nodes that already have a run of
/// `kind` in flight are skipped.
pub async fn spawn_concurrent(
    reconciler: &Reconciler,
    kind: ResourceKind,
    strategy: ListingStrategy,
    shutdown: &CancellationToken,
) -> SyncResult<usize> {
    let mut started = 0;
    for node in active_nodes(reconciler).await? {
        let Some(permit) = reconciler.guard().try_acquire(kind, node.id) else {
            tracing::debug!(%kind, node = %node.name, "sync already running, skipped");
            continue;
        };

        let reconciler = reconciler.clone();
        let cancel = shutdown.child_token();
        tokio::spawn(async move {
            let log_node = node.clone();
            if let Err(e) = reconciler.run(permit, node, strategy, cancel).await {
                log_run_error(kind, &log_node, &e);
            }
        });
        started += 1;
    }
    Ok(started)
}

/// Launches one detached task that syncs active nodes one after another.
///
/// Between two nodes the task waits for the batch interval of the node just
/// synced, which keeps several kinds from fanning out across the fleet at
/// the same time. Returns the number of nodes queued.
pub async fn spawn_sequential(
    reconciler: &Reconciler,
    kind: ResourceKind,
    strategy: ListingStrategy,
    shutdown: &CancellationToken,
) -> SyncResult<usize> {
    let nodes = active_nodes(reconciler).await?;
    let queued = nodes.len();

    let reconciler = reconciler.clone();
    let shutdown = shutdown.clone();
    tokio::spawn(async move {
        tracing::info!(%kind, nodes = queued, "fleet sync started");
        for (index, node) in nodes.iter().enumerate() {
            if shutdown.is_cancelled() {
                break;
            }

            let result = reconciler
                .reconcile(kind, node.id, strategy, shutdown.child_token())
                .await;
            match result {
                Ok(_) => {}
                Err(SyncError::Cancelled) => {
                    log_run_error(kind, node, &SyncError::Cancelled);
                    break;
                }
                Err(e) => log_run_error(kind, node, &e),
            }

            if index + 1 < queued {
                let pause = node
                    .sync_preset
                    .resolve(reconciler.batch_defaults())
                    .interval;
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }
        tracing::info!(%kind, "fleet sync finished");
    });

    Ok(queued)
}
