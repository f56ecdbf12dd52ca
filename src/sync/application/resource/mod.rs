//! Per-kind wiring for the generic reconciler: which endpoints to call and
//! how an agent payload entry becomes a cache row.

pub mod container;
pub mod ipv6;
pub mod nat;
pub mod proxy;

use crate::{CacheRecord, Node, ResourceKind};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

/// Why a payload entry could not be turned into a row.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MappingError {
    #[error("entry is not a JSON object")]
    NotAnObject,

    #[error("missing or empty field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' out of range: {value}")]
    OutOfRange { field: &'static str, value: String },
}

/// How the per-container response of a fan-out run is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailShape {
    /// One object describing the container itself, merged over its listing
    /// entry. A failed call falls back to the listing entry.
    Merge,
    /// An array of the container's items of this kind.
    Items,
}

/// Maps one payload object to a row for `node`.
pub type RowMapper = fn(&Node, &Map<String, Value>, DateTime<Utc>) -> Result<CacheRecord, MappingError>;

/// Static description of one resource kind.
#[derive(Debug, Clone, Copy)]
pub struct ResourceSpec {
    pub kind: ResourceKind,
    /// Endpoint returning every item of the kind in one call.
    pub bulk_path: &'static str,
    /// Endpoint listing the node's containers for fan-out runs.
    pub listing_path: &'static str,
    /// Per-container endpoint, called with `?hostname=`.
    pub detail_path: &'static str,
    pub detail: DetailShape,
    pub map_item: RowMapper,
}

impl ResourceSpec {
    /// Maps a raw payload entry, rejecting anything that is not an object.
    pub fn map_value(
        &self,
        node: &Node,
        item: &Value,
        synced_at: DateTime<Utc>,
    ) -> Result<CacheRecord, MappingError> {
        let object = item.as_object().ok_or(MappingError::NotAnObject)?;
        (self.map_item)(node, object, synced_at)
    }
}

/// The [`ResourceSpec`] registered for `kind`.
pub fn spec_for(kind: ResourceKind) -> &'static ResourceSpec {
    match kind {
        ResourceKind::Container => &container::CONTAINER,
        ResourceKind::Nat => &nat::NAT,
        ResourceKind::Ipv6 => &ipv6::IPV6,
        ResourceKind::Proxy => &proxy::PROXY,
    }
}

/// Lookup helpers over an agent payload object.
///
/// Agents are not consistent about field names across endpoints, so every
/// getter takes a list of aliases and returns the first usable one.
pub(crate) struct Fields<'a>(pub &'a Map<String, Value>);

impl<'a> Fields<'a> {
    pub fn str(&self, names: &[&str]) -> Option<&'a str> {
        names
            .iter()
            .find_map(|name| self.0.get(*name).and_then(Value::as_str))
    }

    /// Like [`Fields::str`], but skips empty strings.
    pub fn non_empty(&self, names: &[&str]) -> Option<&'a str> {
        names.iter().find_map(|name| {
            self.0
                .get(*name)
                .and_then(Value::as_str)
                .filter(|value| !value.is_empty())
        })
    }

    pub fn string_or_default(&self, names: &[&str]) -> String {
        self.str(names).unwrap_or_default().to_string()
    }

    pub fn f64(&self, names: &[&str]) -> Option<f64> {
        names
            .iter()
            .find_map(|name| self.0.get(*name).and_then(Value::as_f64))
    }

    /// Non-negative number truncated to an integer.
    pub fn u64(&self, names: &[&str]) -> Option<u64> {
        self.f64(names)
            .filter(|value| value.is_finite() && *value >= 0.0)
            .map(|value| value as u64)
    }

    pub fn bool(&self, names: &[&str]) -> Option<bool> {
        names
            .iter()
            .find_map(|name| self.0.get(*name).and_then(Value::as_bool))
    }

    pub fn object(&self, name: &str) -> Option<Fields<'a>> {
        self.0.get(name).and_then(Value::as_object).map(Fields)
    }

    /// A TCP/UDP port under one of `names`.
    pub fn port(&self, field: &'static str, names: &[&str]) -> Result<Option<u16>, MappingError> {
        match self.f64(names) {
            None => Ok(None),
            Some(value) if value.fract() == 0.0 && (0.0..=65535.0).contains(&value) => {
                Ok(Some(value as u16))
            }
            Some(value) => Err(MappingError::OutOfRange {
                field,
                value: value.to_string(),
            }),
        }
    }
}

/// Item status, defaulting to `active` when the agent does not send one.
pub(crate) fn status_or_active(fields: &Fields<'_>) -> String {
    fields.str(&["status"]).unwrap_or("active").to_string()
}
