//! Cached public IPv6 binding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::domain::model::node::NodeId;

/// A public IPv6 address routed to a container.
///
/// Natural key: `(node_id, hostname, ipv6_address)`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Ipv6BindingCache {
    pub node_id: NodeId,
    pub node_name: String,
    pub hostname: String,
    pub ipv6_address: String,
    /// Host interface carrying the address, empty when unknown.
    pub interface: String,
    pub status: String,
    pub last_sync: DateTime<Utc>,
    pub sync_error: String,
}
