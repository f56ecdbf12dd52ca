use super::{DetailShape, Fields, MappingError, ResourceSpec, status_or_active};
use crate::{CacheRecord, NatRuleCache, Node, ResourceKind};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

pub const NAT: ResourceSpec = ResourceSpec {
    kind: ResourceKind::Nat,
    bulk_path: "/api/cache/nat",
    listing_path: "/api/cache/containers",
    detail_path: "/api/natlist",
    detail: DetailShape::Items,
    map_item: to_row,
};

fn to_row(
    node: &Node,
    item: &Map<String, Value>,
    synced_at: DateTime<Utc>,
) -> Result<CacheRecord, MappingError> {
    let fields = Fields(item);
    let hostname = fields
        .non_empty(&["container_name", "hostname"])
        .ok_or(MappingError::MissingField("hostname"))?;
    let protocol = fields
        .non_empty(&["protocol"])
        .ok_or(MappingError::MissingField("protocol"))?;
    let external_port = fields
        .port("external_port", &["external_port", "external"])?
        .ok_or(MappingError::MissingField("external_port"))?;
    let internal_port = fields
        .port("internal_port", &["internal_port", "internal"])?
        .unwrap_or(0);

    Ok(CacheRecord::Nat(NatRuleCache {
        node_id: node.id,
        node_name: node.name.clone(),
        hostname: hostname.to_string(),
        external_port,
        internal_port,
        protocol: protocol.to_string(),
        description: fields.string_or_default(&["description"]),
        status: status_or_active(&fields),
        last_sync: synced_at,
        sync_error: String::new(),
    }))
}
