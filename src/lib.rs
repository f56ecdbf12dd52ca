//! Reconciliation engine for a fleet of container hosts.
//!
//! `fleet_sync` keeps a local cache of state owned by remote nodes (containers,
//! NAT rules, IPv6 bindings and reverse-proxy configurations). It pulls the
//! authoritative set from each node's management API, upserts it by natural
//! key, evicts rows the node no longer reports and records every run as a
//! task. At most one run per `(kind, node)` is in flight at any time.
//!
//! # Examples
//!
//! ```no_run
//! use fleet_sync::{
//!     FleetSync, Node, NodeAddress, NodeId, ResourceKind, SyncResult, TriggerOutcome,
//! };
//!
//! #[tokio::main]
//! async fn main() -> SyncResult<()> {
//!     let fleet = FleetSync::builder().build().await?;
//!     fleet
//!         .register_node(Node::new(1, "hk-01", NodeAddress::parse("https://10.0.0.2:8443")?))
//!         .await?;
//!
//!     if let TriggerOutcome::Started(job) = fleet.trigger_sync(ResourceKind::Nat, NodeId(1)).await? {
//!         let report = job.wait().await?;
//!         println!("synced {} NAT rules", report.task.success_count);
//!     }
//!
//!     fleet.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
mod core;
mod sync;


pub use crate::config::{AgentConfig, FleetSyncConfig, LoggingConfig, NodeConfig, SyncConfig};
pub use crate::core::domain::error::{
    StoreError, StoreResult, SyncError, SyncResult, ValidationError,
};
pub use crate::core::domain::model::{
    agent_response::{AgentRequest, AgentResponse},
    cache_record::{CacheRecord, NaturalKey},
    container_cache::ContainerCache,
    ipv6_binding_cache::Ipv6BindingCache,
    nat_rule_cache::NatRuleCache,
    node::{Node, NodeId, NodeStatus},
    proxy_config_cache::ProxyConfigCache,
    resource_kind::ResourceKind,
    sync_preset::{BatchSettings, SyncPreset},
    sync_task::{SyncTask, TaskId, TaskStatus},
};
pub use crate::core::domain::value_object::{ApiKey, NodeAddress};
pub use crate::core::infrastructure::agent_client::{AgentClient, AgentClientConfig, NodeApi};
pub use crate::core::infrastructure::store::{
    CacheRowStore, CacheStore, InMemoryStore, NodeStore, TaskStore,
};
pub use crate::sync::application::resource::{
    DetailShape, MappingError, ResourceSpec, spec_for,
};
pub use crate::sync::application::service::{
    batch_scheduler::BatchScheduler,
    periodic_driver::{PeriodicDriver, PeriodicSettings},
    reconciler::{EvictionPolicy, ListingStrategy, Reconciler, SyncReport},
    run_guard::{RunGuard, RunPermit},
    task_recorder::{TaskHandle, TaskRecorder},
};

use crate::sync::application::service::periodic_driver::{spawn_concurrent, spawn_sequential};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Entry point for everything outside the engine: request handlers, the
/// daemon binary and tests.
///
/// Triggers return as soon as the run is scheduled; the run itself executes
/// on a detached task. Dropping a [`SyncJob`] does not stop its run.
pub struct FleetSync {
    reconciler: Reconciler,
    periodic: PeriodicSettings,
    shutdown: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
}

/// Builder for FleetSync configuration
#[derive(Default)]
pub struct FleetSyncBuilder {
    api: Option<Arc<dyn NodeApi>>,
    agent: AgentClientConfig,
    store: Option<Arc<dyn CacheStore>>,
    batch: BatchSettings,
    periodic: PeriodicSettings,
    eviction: EvictionPolicy,
    nodes: Vec<Node>,
}

impl FleetSyncBuilder {
    /// Seeds the builder from a loaded configuration.
    ///
    /// # Errors
    /// Returns `SyncError::Validation` if a configured node is invalid.
    pub fn from_config(config: &FleetSyncConfig) -> SyncResult<Self> {
        let nodes = config
            .nodes
            .iter()
            .map(NodeConfig::to_node)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            agent: config.agent.client_config(),
            batch: config.sync.batch_settings(),
            periodic: config.sync.periodic_settings(),
            eviction: config.sync.eviction,
            nodes,
            ..Self::default()
        })
    }

    /// Replaces the HTTP agent client, mainly for tests.
    pub fn api(mut self, api: Arc<dyn NodeApi>) -> Self {
        self.api = Some(api);
        self
    }

    pub fn agent_config(mut self, agent: AgentClientConfig) -> Self {
        self.agent = agent;
        self
    }

    /// Uses `store` instead of a fresh [`InMemoryStore`].
    pub fn store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Global pacing for fan-out runs, used by nodes on the default preset.
    pub fn batch_settings(mut self, batch: BatchSettings) -> Self {
        self.batch = batch;
        self
    }

    pub fn periodic(mut self, periodic: PeriodicSettings) -> Self {
        self.periodic = periodic;
        self
    }

    pub fn eviction_policy(mut self, eviction: EvictionPolicy) -> Self {
        self.eviction = eviction;
        self
    }

    /// Registers `node` when the service is built.
    pub fn node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub async fn build(self) -> SyncResult<FleetSync> {
        let api: Arc<dyn NodeApi> = match self.api {
            Some(api) => api,
            None => Arc::new(AgentClient::new(&self.agent)?),
        };
        let store: Arc<dyn CacheStore> = match self.store {
            Some(store) => store,
            None => Arc::new(InMemoryStore::new()),
        };

        for node in self.nodes {
            store.upsert_node(node).await?;
        }

        let reconciler = Reconciler::new(api, store, RunGuard::new(), self.batch, self.eviction);
        Ok(FleetSync {
            reconciler,
            periodic: self.periodic,
            shutdown: CancellationToken::new(),
            driver: Mutex::new(None),
        })
    }
}

/// Result of a trigger call.
#[derive(Debug)]
pub enum TriggerOutcome {
    /// A new run was scheduled.
    Started(SyncJob),
    /// A run for the same kind and node is in flight; nothing was scheduled.
    AlreadyRunning,
}

impl TriggerOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, TriggerOutcome::Started(_))
    }

    pub fn into_job(self) -> Option<SyncJob> {
        match self {
            TriggerOutcome::Started(job) => Some(job),
            TriggerOutcome::AlreadyRunning => None,
        }
    }
}

/// Handle to a scheduled run.
#[derive(Debug)]
pub struct SyncJob {
    kind: ResourceKind,
    node_id: NodeId,
    cancel: CancellationToken,
    handle: JoinHandle<SyncResult<SyncReport>>,
}

impl SyncJob {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Asks the run to stop. It records its task as failed and skips eviction.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the run to end.
    ///
    /// # Errors
    /// `SyncError::Cancelled` for a cancelled run, `SyncError::Aborted` if the
    /// run panicked, otherwise whatever the run itself returned.
    pub async fn wait(self) -> SyncResult<SyncReport> {
        self.handle
            .await
            .map_err(|e| SyncError::Aborted(e.to_string()))?
    }
}

/// Sync state of one node for one kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSyncStatus {
    pub node_id: NodeId,
    pub node_name: String,
    /// Whether a run is in flight right now.
    pub syncing: bool,
    /// The newest recorded run, finished or not.
    pub last_task: Option<SyncTask>,
}

impl FleetSync {
    /// Creates a new builder for FleetSync configuration
    pub fn builder() -> FleetSyncBuilder {
        FleetSyncBuilder::default()
    }

    fn store(&self) -> &Arc<dyn CacheStore> {
        self.reconciler.store()
    }

    async fn node(&self, node_id: NodeId) -> SyncResult<Node> {
        self.store()
            .get_node(node_id)
            .await?
            .ok_or(SyncError::NodeNotFound(node_id))
    }

    async fn trigger(
        &self,
        kind: ResourceKind,
        node_id: NodeId,
        strategy: ListingStrategy,
    ) -> SyncResult<TriggerOutcome> {
        let node = self.node(node_id).await?;
        let Some(permit) = self.reconciler.guard().try_acquire(kind, node_id) else {
            tracing::debug!(%kind, %node_id, "sync already running, trigger ignored");
            return Ok(TriggerOutcome::AlreadyRunning);
        };

        let cancel = self.shutdown.child_token();
        let reconciler = self.reconciler.clone();
        let run_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let result = reconciler.run(permit, node, strategy, run_cancel).await;
            match &result {
                Ok(_) | Err(SyncError::Cancelled) => {}
                Err(e) => tracing::error!(%kind, %node_id, error = %e, "sync failed"),
            }
            result
        });

        Ok(TriggerOutcome::Started(SyncJob {
            kind,
            node_id,
            cancel,
            handle,
        }))
    }

    /// Schedules a fan-out run: list containers, then query each one.
    ///
    /// # Errors
    /// `SyncError::NodeNotFound` for an unknown node; store errors.
    pub async fn trigger_sync(
        &self,
        kind: ResourceKind,
        node_id: NodeId,
    ) -> SyncResult<TriggerOutcome> {
        self.trigger(kind, node_id, ListingStrategy::FanOut).await
    }

    /// Schedules a bulk run that reads the node's own cache in one call.
    pub async fn trigger_refresh(
        &self,
        kind: ResourceKind,
        node_id: NodeId,
    ) -> SyncResult<TriggerOutcome> {
        self.trigger(kind, node_id, ListingStrategy::Bulk).await
    }

    /// Schedules a fan-out run of `kind` on every active node.
    ///
    /// Containers sync all nodes concurrently. The other kinds walk the nodes
    /// one at a time, pausing for each node's batch interval in between.
    /// Returns the number of nodes scheduled.
    pub async fn trigger_sync_all(&self, kind: ResourceKind) -> SyncResult<usize> {
        match kind {
            ResourceKind::Container => {
                spawn_concurrent(&self.reconciler, kind, ListingStrategy::FanOut, &self.shutdown)
                    .await
            }
            _ => {
                spawn_sequential(&self.reconciler, kind, ListingStrategy::FanOut, &self.shutdown)
                    .await
            }
        }
    }

    /// Runs one reconcile in the caller's task and returns its report.
    ///
    /// # Errors
    /// `SyncError::AlreadyRunning` instead of waiting when the slot is busy.
    pub async fn sync_now(
        &self,
        kind: ResourceKind,
        node_id: NodeId,
        strategy: ListingStrategy,
    ) -> SyncResult<SyncReport> {
        self.reconciler
            .reconcile(kind, node_id, strategy, self.shutdown.child_token())
            .await
    }

    pub fn is_running(&self, kind: ResourceKind, node_id: NodeId) -> bool {
        self.reconciler.guard().is_running(kind, node_id)
    }

    /// Most recent tasks of `kind` across all nodes, newest first.
    pub async fn list_recent_tasks(
        &self,
        kind: ResourceKind,
        limit: usize,
    ) -> SyncResult<Vec<SyncTask>> {
        Ok(self.store().recent_tasks(kind, limit).await?)
    }

    /// Per-node sync state for `kind`, for one node or the whole fleet.
    pub async fn status(
        &self,
        kind: ResourceKind,
        node_id: Option<NodeId>,
    ) -> SyncResult<Vec<NodeSyncStatus>> {
        let nodes = match node_id {
            Some(node_id) => vec![self.node(node_id).await?],
            None => self.store().list_nodes().await?,
        };

        let mut statuses = Vec::with_capacity(nodes.len());
        for node in nodes {
            statuses.push(NodeSyncStatus {
                syncing: self.is_running(kind, node.id),
                last_task: self.store().latest_task(kind, node.id).await?,
                node_id: node.id,
                node_name: node.name,
            });
        }
        Ok(statuses)
    }

    /// Adds or replaces a node.
    pub async fn register_node(&self, node: Node) -> SyncResult<()> {
        tracing::info!(node_id = %node.id, node = %node.name, "node registered");
        Ok(self.store().upsert_node(node).await?)
    }

    /// Removes a node with its cache rows and task history.
    ///
    /// Every run slot of the node is held while the store removes it, so no
    /// run can start against the node half way through.
    ///
    /// # Errors
    /// `SyncError::AlreadyRunning` while any run for the node is in flight;
    /// `SyncError::NodeNotFound` for an unknown node.
    pub async fn remove_node(&self, node_id: NodeId) -> SyncResult<()> {
        let mut permits = Vec::with_capacity(ResourceKind::ALL.len());
        for kind in ResourceKind::ALL {
            // Dropping `permits` on return releases the slots already taken.
            permits.push(self.reconciler.acquire(kind, node_id)?);
        }
        let removed = self.store().remove_node(node_id).await?;
        drop(permits);
        if !removed {
            return Err(SyncError::NodeNotFound(node_id));
        }
        tracing::info!(%node_id, "node removed");
        Ok(())
    }

    /// Cached rows of `kind` for one node.
    pub async fn cached_rows(
        &self,
        kind: ResourceKind,
        node_id: NodeId,
    ) -> SyncResult<Vec<CacheRecord>> {
        Ok(self.store().list_rows(kind, node_id).await?)
    }

    /// Fails tasks left `running` by a previous process. Call once at startup.
    pub async fn recover_stranded(&self) -> SyncResult<usize> {
        self.reconciler.recorder().recover_stranded().await
    }

    /// Starts the periodic container sync. Returns `false` if it was
    /// already started.
    pub fn start_periodic(&self) -> bool {
        let mut driver = self
            .driver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if driver.is_some() || self.shutdown.is_cancelled() {
            return false;
        }
        *driver = Some(
            PeriodicDriver::new(self.reconciler.clone(), self.periodic, self.shutdown.clone())
                .spawn(),
        );
        true
    }

    /// Cancels every run and stops the periodic driver.
    ///
    /// Runs record their tasks as failed on their own; this only waits for
    /// the driver loop.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let driver = self
            .driver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(driver) = driver {
            if let Err(e) = driver.await {
                tracing::warn!(error = %e, "periodic driver ended abnormally");
            }
        }
    }
}
