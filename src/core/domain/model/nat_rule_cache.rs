//! Cached NAT port-forward rule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::domain::model::node::NodeId;

/// A port-forward from the node's public address into a container.
///
/// Natural key: `(node_id, hostname, external_port, protocol)`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NatRuleCache {
    pub node_id: NodeId,
    pub node_name: String,
    /// Container the rule forwards to.
    pub hostname: String,
    pub external_port: u16,
    pub internal_port: u16,
    /// Lower-case transport protocol ("tcp" or "udp").
    pub protocol: String,
    pub description: String,
    pub status: String,
    pub last_sync: DateTime<Utc>,
    pub sync_error: String,
}
