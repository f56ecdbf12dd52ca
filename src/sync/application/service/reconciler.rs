//! Generic reconcile run: fetch authoritative state from a node, upsert it
//! into the cache, evict what the node no longer reports.

use crate::{
    AgentRequest, AgentResponse, BatchSettings, CacheStore, NaturalKey, Node, NodeApi, NodeId,
    ResourceKind, SyncError, SyncResult, SyncTask,
    sync::application::{
        resource::{DetailShape, ResourceSpec, container, spec_for},
        service::{
            batch_scheduler::BatchScheduler,
            run_guard::{RunGuard, RunPermit},
            task_recorder::{TaskHandle, TaskRecorder},
        },
    },
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Error message recorded on runs interrupted through their token.
pub const CANCELLED_MESSAGE: &str = "cancelled";

/// How the authoritative item set is fetched from a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStrategy {
    /// One call returning the node's own cache of every item.
    Bulk,
    /// List containers, then one paced call per container.
    #[default]
    FanOut,
}

/// Which keys survive the eviction step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Keep every key the node reported, even if writing its row failed.
    #[default]
    Observed,
    /// Keep only keys whose row was written in this run.
    Persisted,
}

/// Outcome of one completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    /// The task as finally recorded.
    pub task: SyncTask,
    /// Rows removed because the node no longer reported them.
    pub evicted: usize,
    /// Rows removed because the listing call failed.
    pub purged: usize,
}

enum FetchError {
    Listing(String),
    Cancelled,
}

#[derive(Default)]
struct Fetched {
    total: usize,
    items: Vec<Value>,
    failed: usize,
}

/// Drives reconcile runs for every resource kind.
#[derive(Clone)]
pub struct Reconciler {
    api: Arc<dyn NodeApi>,
    store: Arc<dyn CacheStore>,
    recorder: TaskRecorder,
    guard: RunGuard,
    batch_defaults: BatchSettings,
    eviction: EvictionPolicy,
}

impl Reconciler {
    pub fn new(
        api: Arc<dyn NodeApi>,
        store: Arc<dyn CacheStore>,
        guard: RunGuard,
        batch_defaults: BatchSettings,
        eviction: EvictionPolicy,
    ) -> Self {
        Self {
            api,
            recorder: TaskRecorder::new(store.clone()),
            store,
            guard,
            batch_defaults,
            eviction,
        }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn guard(&self) -> &RunGuard {
        &self.guard
    }

    pub fn recorder(&self) -> &TaskRecorder {
        &self.recorder
    }

    pub fn batch_defaults(&self) -> BatchSettings {
        self.batch_defaults
    }

    /// Claims the run slot for `(kind, node_id)`.
    ///
    /// # Errors
    /// `SyncError::AlreadyRunning` if another run holds the slot.
    pub fn acquire(&self, kind: ResourceKind, node_id: NodeId) -> SyncResult<RunPermit> {
        self.guard
            .try_acquire(kind, node_id)
            .ok_or(SyncError::AlreadyRunning { kind, node_id })
    }

    /// Looks up the node, claims its slot and runs to completion.
    pub async fn reconcile(
        &self,
        kind: ResourceKind,
        node_id: NodeId,
        strategy: ListingStrategy,
        cancel: CancellationToken,
    ) -> SyncResult<SyncReport> {
        let node = self
            .store
            .get_node(node_id)
            .await?
            .ok_or(SyncError::NodeNotFound(node_id))?;
        let permit = self.acquire(kind, node_id)?;
        self.run(permit, node, strategy, cancel).await
    }

    /// Runs one reconcile for the slot held by `permit`.
    ///
    /// The slot is released when this future completes or is dropped.
    ///
    /// # Errors
    /// `SyncError::Cancelled` after recording the task as failed if `cancel`
    /// fired; store errors when the task cannot be opened or its final state
    /// cannot be written even on retry. Remote failures are not
    /// errors: they end up in the task counters or, for the listing call, in
    /// a failed task.
    pub async fn run(
        &self,
        permit: RunPermit,
        node: Node,
        strategy: ListingStrategy,
        cancel: CancellationToken,
    ) -> SyncResult<SyncReport> {
        let spec = spec_for(permit.kind());
        let kind = spec.kind;
        // Removal holds every slot of the node, so a node still present here
        // outlives this run.
        let node = self
            .store
            .get_node(node.id)
            .await?
            .ok_or(SyncError::NodeNotFound(node.id))?;

        let mut handle = self.recorder.start(kind, &node).await?;
        tracing::info!(
            %kind,
            node_id = %node.id,
            node = %node.name,
            task_id = %handle.id(),
            ?strategy,
            "sync started"
        );

        let fetched = match strategy {
            ListingStrategy::Bulk => self.fetch_bulk(spec, &node, &cancel).await,
            ListingStrategy::FanOut => self.fetch_fan_out(spec, &node, &cancel).await,
        };
        let fetched = match fetched {
            Ok(fetched) => fetched,
            Err(FetchError::Cancelled) => return self.finish_cancelled(handle, &node, 0, 0).await,
            Err(FetchError::Listing(message)) => {
                return self.finish_listing_failure(handle, &node, message).await;
            }
        };

        // A lost total does not stop the run, but the task cannot complete.
        let mut bookkeeping_error = None;
        if let Err(e) = self.recorder.set_total(&mut handle, fetched.total).await {
            tracing::warn!(
                %kind,
                node = %node.name,
                task_id = %handle.id(),
                error = %e,
                "failed to record task total"
            );
            bookkeeping_error = Some(format!("failed to record task total: {}", e));
        }

        let synced_at = Utc::now();
        let mut success = 0usize;
        let mut failed = fetched.failed;
        let mut observed = HashSet::new();
        let mut persisted = HashSet::new();

        for item in &fetched.items {
            if cancel.is_cancelled() {
                return self.finish_cancelled(handle, &node, success, failed).await;
            }
            let row = match spec.map_value(&node, item, synced_at) {
                Ok(row) => row,
                Err(e) => {
                    tracing::warn!(%kind, node = %node.name, error = %e, "skipping malformed item");
                    failed += 1;
                    continue;
                }
            };
            let key = row.natural_key();
            observed.insert(key.clone());
            match self.store.upsert_row(row).await {
                Ok(()) => {
                    success += 1;
                    persisted.insert(key);
                }
                Err(e) => {
                    tracing::warn!(%kind, node = %node.name, %key, error = %e, "failed to write cache row");
                    failed += 1;
                }
            }
        }

        if cancel.is_cancelled() {
            return self.finish_cancelled(handle, &node, success, failed).await;
        }

        let keep = match self.eviction {
            EvictionPolicy::Observed => &observed,
            EvictionPolicy::Persisted => &persisted,
        };
        let (evicted, error) = match self.evict(kind, &node, keep).await {
            Ok(evicted) => (evicted, None),
            Err(e) => {
                tracing::error!(%kind, node = %node.name, error = %e, "eviction failed");
                (0, Some(format!("failed to evict stale rows: {}", e)))
            }
        };

        let error = error.or(bookkeeping_error);
        let task = self.recorder.finish(handle, success, failed, error).await?;
        tracing::info!(
            %kind,
            node_id = %node.id,
            node = %node.name,
            total = task.total_count,
            success,
            failed,
            evicted,
            "sync finished"
        );

        Ok(SyncReport {
            task,
            evicted,
            purged: 0,
        })
    }

    async fn fetch_bulk(
        &self,
        spec: &ResourceSpec,
        node: &Node,
        cancel: &CancellationToken,
    ) -> Result<Fetched, FetchError> {
        let response = self
            .api
            .call(node, AgentRequest::get(spec.bulk_path), cancel.clone())
            .await;
        let items = listing_entries(response, cancel)?;
        Ok(Fetched {
            total: items.len(),
            items,
            failed: 0,
        })
    }

    async fn fetch_fan_out(
        &self,
        spec: &ResourceSpec,
        node: &Node,
        cancel: &CancellationToken,
    ) -> Result<Fetched, FetchError> {
        let response = self
            .api
            .call(node, AgentRequest::get(spec.listing_path), cancel.clone())
            .await;
        let entries = listing_entries(response, cancel)?;
        let listed = entries.len();

        let containers: Vec<(String, Map<String, Value>)> = entries
            .into_iter()
            .filter_map(|entry| match entry {
                Value::Object(listing) => {
                    let hostname = listing
                        .get("hostname")
                        .and_then(Value::as_str)
                        .filter(|hostname| !hostname.is_empty())?
                        .to_string();
                    Some((hostname, listing))
                }
                _ => None,
            })
            .collect();
        if containers.len() < listed {
            tracing::debug!(
                node = %node.name,
                skipped = listed - containers.len(),
                "listing entries without hostname skipped"
            );
        }

        let settings = node.sync_preset.resolve(self.batch_defaults);
        tracing::debug!(
            kind = %spec.kind,
            node = %node.name,
            containers = containers.len(),
            batch_size = settings.size.get(),
            batch_interval = ?settings.interval,
            "fanning out per-container calls"
        );

        let api = self.api.as_ref();
        let responses = BatchScheduler::new(settings)
            .run(containers, cancel, |(hostname, listing)| {
                let request = AgentRequest::get(spec.detail_path).query("hostname", hostname.clone());
                let cancel = cancel.clone();
                async move {
                    let response = api.call(node, request, cancel).await;
                    (hostname, listing, response)
                }
            })
            .await
            .map_err(|_| FetchError::Cancelled)?;
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let mut fetched = Fetched::default();
        match spec.detail {
            DetailShape::Merge => {
                fetched.total = listed;
                for (hostname, listing, response) in responses {
                    let detail = if response.is_success() {
                        response.data.as_object()
                    } else {
                        tracing::debug!(
                            node = %node.name,
                            %hostname,
                            code = response.code,
                            "detail call failed, using listing entry"
                        );
                        None
                    };
                    fetched
                        .items
                        .push(container::merge_detail(&hostname, &listing, detail));
                }
            }
            DetailShape::Items => {
                for (hostname, _, response) in responses {
                    let items = if !response.is_success() {
                        tracing::warn!(
                            kind = %spec.kind,
                            node = %node.name,
                            %hostname,
                            code = response.code,
                            msg = %response.msg,
                            "per-container call failed"
                        );
                        None
                    } else {
                        match response.data {
                            Value::Array(items) => Some(items),
                            // Agents send `null` for a container with no items.
                            Value::Null => Some(Vec::new()),
                            _ => {
                                tracing::warn!(
                                    kind = %spec.kind,
                                    node = %node.name,
                                    %hostname,
                                    "per-container payload is not an array"
                                );
                                None
                            }
                        }
                    };

                    // A failed container counts as one failed item.
                    let Some(items) = items else {
                        fetched.total += 1;
                        fetched.failed += 1;
                        continue;
                    };

                    fetched.total += items.len();
                    fetched.items.extend(items.into_iter().map(|mut item| {
                        if let Value::Object(fields) = &mut item {
                            fill_hostname(fields, &hostname);
                        }
                        item
                    }));
                }
            }
        }
        Ok(fetched)
    }

    /// Deletes rows of `kind` on `node` whose key is not in `keep`.
    async fn evict(
        &self,
        kind: ResourceKind,
        node: &Node,
        keep: &HashSet<NaturalKey>,
    ) -> SyncResult<usize> {
        let mut evicted = 0;
        for row in self.store.list_rows(kind, node.id).await? {
            let key = row.natural_key();
            if keep.contains(&key) {
                continue;
            }
            if self.store.delete_row(&key).await? {
                tracing::debug!(%kind, node = %node.name, %key, "evicted stale row");
                evicted += 1;
            }
        }
        Ok(evicted)
    }

    async fn finish_listing_failure(
        &self,
        handle: TaskHandle,
        node: &Node,
        message: String,
    ) -> SyncResult<SyncReport> {
        let kind = handle.task().kind;
        tracing::error!(
            %kind,
            node_id = %node.id,
            node = %node.name,
            error = %message,
            "listing failed, purging cache"
        );
        let purged = match self.store.purge_rows(kind, node.id).await {
            Ok(purged) => purged,
            Err(e) => {
                tracing::error!(%kind, node = %node.name, error = %e, "failed to purge cache");
                0
            }
        };
        let task = self.recorder.finish(handle, 0, 0, Some(message)).await?;
        Ok(SyncReport {
            task,
            evicted: 0,
            purged,
        })
    }

    async fn finish_cancelled(
        &self,
        handle: TaskHandle,
        node: &Node,
        success: usize,
        failed: usize,
    ) -> SyncResult<SyncReport> {
        let task = self
            .recorder
            .finish(handle, success, failed, Some(CANCELLED_MESSAGE.to_string()))
            .await?;
        tracing::info!(
            kind = %task.kind,
            node = %node.name,
            task_id = %task.id,
            "sync cancelled"
        );
        Err(SyncError::Cancelled)
    }
}

fn listing_entries(
    response: AgentResponse,
    cancel: &CancellationToken,
) -> Result<Vec<Value>, FetchError> {
    if cancel.is_cancelled() {
        return Err(FetchError::Cancelled);
    }
    if !response.is_success() {
        return Err(FetchError::Listing(format!(
            "failed to fetch listing: {}",
            response.msg
        )));
    }
    match response.data {
        Value::Array(items) => Ok(items),
        other => Err(FetchError::Listing(format!(
            "malformed listing payload: expected an array, got {}",
            json_type(&other)
        ))),
    }
}

fn fill_hostname(fields: &mut Map<String, Value>, hostname: &str) {
    let named = ["container_name", "hostname"].iter().any(|name| {
        fields
            .get(*name)
            .and_then(Value::as_str)
            .is_some_and(|value| !value.is_empty())
    });
    if !named {
        fields.insert("hostname".to_string(), Value::String(hostname.to_string()));
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
