//! Cached reverse-proxy site.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::domain::model::node::NodeId;

/// A domain served by the node's reverse proxy and routed to a container port.
///
/// Natural key: `(node_id, hostname, domain)`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProxyConfigCache {
    pub node_id: NodeId,
    pub node_name: String,
    pub hostname: String,
    pub domain: String,
    pub backend_port: u16,
    pub ssl_enabled: bool,
    /// Certificate source ("none", "self", "letsencrypt", ...).
    pub ssl_type: String,
    pub status: String,
    pub last_sync: DateTime<Utc>,
    pub sync_error: String,
}
