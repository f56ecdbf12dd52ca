//! Kind-agnostic view over the four cache tables.
//!
//! The store and the reconciler only need two things from a row: which node
//! and kind it belongs to, and its natural key. `CacheRecord` wraps the typed
//! rows so both can be handled uniformly.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::domain::model::{
    container_cache::ContainerCache, ipv6_binding_cache::Ipv6BindingCache,
    nat_rule_cache::NatRuleCache, node::NodeId, proxy_config_cache::ProxyConfigCache,
    resource_kind::ResourceKind,
};

/// The field combination that identifies a row within its kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NaturalKey {
    Container {
        node_id: NodeId,
        hostname: String,
    },
    Nat {
        node_id: NodeId,
        hostname: String,
        external_port: u16,
        protocol: String,
    },
    Ipv6 {
        node_id: NodeId,
        hostname: String,
        ipv6_address: String,
    },
    Proxy {
        node_id: NodeId,
        hostname: String,
        domain: String,
    },
}

impl NaturalKey {
    pub fn kind(&self) -> ResourceKind {
        match self {
            NaturalKey::Container { .. } => ResourceKind::Container,
            NaturalKey::Nat { .. } => ResourceKind::Nat,
            NaturalKey::Ipv6 { .. } => ResourceKind::Ipv6,
            NaturalKey::Proxy { .. } => ResourceKind::Proxy,
        }
    }

    pub fn node_id(&self) -> NodeId {
        match self {
            NaturalKey::Container { node_id, .. }
            | NaturalKey::Nat { node_id, .. }
            | NaturalKey::Ipv6 { node_id, .. }
            | NaturalKey::Proxy { node_id, .. } => *node_id,
        }
    }

    pub fn hostname(&self) -> &str {
        match self {
            NaturalKey::Container { hostname, .. }
            | NaturalKey::Nat { hostname, .. }
            | NaturalKey::Ipv6 { hostname, .. }
            | NaturalKey::Proxy { hostname, .. } => hostname,
        }
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NaturalKey::Container { hostname, .. } => write!(f, "{}", hostname),
            NaturalKey::Nat {
                hostname,
                external_port,
                protocol,
                ..
            } => write!(f, "{}:{}/{}", hostname, external_port, protocol),
            NaturalKey::Ipv6 {
                hostname,
                ipv6_address,
                ..
            } => write!(f, "{} -> {}", hostname, ipv6_address),
            NaturalKey::Proxy {
                hostname, domain, ..
            } => write!(f, "{} -> {}", domain, hostname),
        }
    }
}

/// One cached row of any kind.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", content = "row", rename_all = "lowercase")]
pub enum CacheRecord {
    Container(ContainerCache),
    Nat(NatRuleCache),
    Ipv6(Ipv6BindingCache),
    Proxy(ProxyConfigCache),
}

impl CacheRecord {
    pub fn kind(&self) -> ResourceKind {
        match self {
            CacheRecord::Container(_) => ResourceKind::Container,
            CacheRecord::Nat(_) => ResourceKind::Nat,
            CacheRecord::Ipv6(_) => ResourceKind::Ipv6,
            CacheRecord::Proxy(_) => ResourceKind::Proxy,
        }
    }

    pub fn node_id(&self) -> NodeId {
        match self {
            CacheRecord::Container(row) => row.node_id,
            CacheRecord::Nat(row) => row.node_id,
            CacheRecord::Ipv6(row) => row.node_id,
            CacheRecord::Proxy(row) => row.node_id,
        }
    }

    pub fn natural_key(&self) -> NaturalKey {
        match self {
            CacheRecord::Container(row) => NaturalKey::Container {
                node_id: row.node_id,
                hostname: row.hostname.clone(),
            },
            CacheRecord::Nat(row) => NaturalKey::Nat {
                node_id: row.node_id,
                hostname: row.hostname.clone(),
                external_port: row.external_port,
                protocol: row.protocol.clone(),
            },
            CacheRecord::Ipv6(row) => NaturalKey::Ipv6 {
                node_id: row.node_id,
                hostname: row.hostname.clone(),
                ipv6_address: row.ipv6_address.clone(),
            },
            CacheRecord::Proxy(row) => NaturalKey::Proxy {
                node_id: row.node_id,
                hostname: row.hostname.clone(),
                domain: row.domain.clone(),
            },
        }
    }

    pub fn as_container(&self) -> Option<&ContainerCache> {
        match self {
            CacheRecord::Container(row) => Some(row),
            _ => None,
        }
    }

    pub fn as_nat(&self) -> Option<&NatRuleCache> {
        match self {
            CacheRecord::Nat(row) => Some(row),
            _ => None,
        }
    }

    pub fn as_ipv6(&self) -> Option<&Ipv6BindingCache> {
        match self {
            CacheRecord::Ipv6(row) => Some(row),
            _ => None,
        }
    }

    pub fn as_proxy(&self) -> Option<&ProxyConfigCache> {
        match self {
            CacheRecord::Proxy(row) => Some(row),
            _ => None,
        }
    }
}
