//! Domain model for a managed virtualization host.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::domain::{
    model::sync_preset::SyncPreset,
    value_object::{ApiKey, NodeAddress},
};

/// Numeric identity of a node, stable for its lifetime in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(id: u32) -> Self {
        NodeId(id)
    }
}

/// Operator-facing health of a node. Only `Active` nodes take part in
/// fleet-wide syncs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Active,
    #[default]
    Inactive,
    Error,
}

/// A node as the engine sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Store identity.
    pub id: NodeId,
    /// Unique display name (e.g. "hk-01").
    pub name: String,
    /// Base address of the node's management API.
    pub address: NodeAddress,
    /// Optional key sent in the `apikey` header.
    pub api_key: Option<ApiKey>,
    /// Health status maintained by the operator layer.
    pub status: NodeStatus,
    /// Last time the operator layer probed the node.
    pub last_check: Option<DateTime<Utc>>,
    /// Batch pacing override for fan-out polling.
    pub sync_preset: SyncPreset,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, name: impl Into<String>, address: NodeAddress) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address,
            api_key: None,
            status: NodeStatus::Active,
            last_check: None,
            sync_preset: SyncPreset::Default,
        }
    }

    pub fn with_api_key(mut self, api_key: ApiKey) -> Self {
        self.api_key = Some(api_key);
        self
    }

    pub fn with_status(mut self, status: NodeStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_preset(mut self, preset: SyncPreset) -> Self {
        self.sync_preset = preset;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == NodeStatus::Active
    }
}
