//! The categories of remotely-owned facts the engine mirrors.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::domain::error::ValidationError;

/// A category of cached remote state.
///
/// Each kind has its own cache table, its own task history and its own
/// run-guard slot, so a container sync and a NAT sync of the same node may
/// overlap while two NAT syncs of that node may not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Container,
    Nat,
    Ipv6,
    Proxy,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Container,
        ResourceKind::Nat,
        ResourceKind::Ipv6,
        ResourceKind::Proxy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Container => "container",
            ResourceKind::Nat => "nat",
            ResourceKind::Ipv6 => "ipv6",
            ResourceKind::Proxy => "proxy",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "container" | "containers" => Ok(ResourceKind::Container),
            "nat" => Ok(ResourceKind::Nat),
            "ipv6" => Ok(ResourceKind::Ipv6),
            "proxy" => Ok(ResourceKind::Proxy),
            other => Err(ValidationError::Field {
                field: "kind".to_string(),
                message: format!("unknown resource kind '{}'", other),
            }),
        }
    }
}
