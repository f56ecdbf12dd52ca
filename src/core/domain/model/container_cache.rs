//! Cached view of one container running on a node.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::domain::model::node::NodeId;

/// A container as last reported by its node.
///
/// Natural key: `(node_id, hostname)`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ContainerCache {
    pub node_id: NodeId,
    pub node_name: String,
    pub hostname: String,
    /// Runtime state reported by the node (e.g. "Running", "Stopped").
    pub status: String,
    pub ipv4: String,
    pub ipv6: String,
    pub image: String,
    pub cpus: u32,
    /// Configured memory limit as displayed by the node (e.g. "512MB").
    pub memory: String,
    /// Configured disk size as displayed by the node.
    pub disk: String,
    /// Monthly traffic allowance, 0 when unlimited or unknown.
    pub traffic_limit: u64,
    /// CPU usage percentage.
    pub cpu_usage: f64,
    /// Memory usage in bytes.
    pub memory_usage: u64,
    /// Memory limit in bytes.
    pub memory_total: u64,
    /// Disk usage in bytes.
    pub disk_usage: u64,
    /// Disk size in bytes.
    pub disk_total: u64,
    pub traffic_total: u64,
    pub traffic_in: u64,
    pub traffic_out: u64,
    pub last_sync: DateTime<Utc>,
    pub sync_error: String,
}
