use super::{DetailShape, Fields, MappingError, ResourceSpec, status_or_active};
use crate::{CacheRecord, Ipv6BindingCache, Node, ResourceKind};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

pub const IPV6: ResourceSpec = ResourceSpec {
    kind: ResourceKind::Ipv6,
    bulk_path: "/api/cache/ipv6",
    listing_path: "/api/cache/containers",
    detail_path: "/api/ipv6/list",
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
    let ipv6_address = fields
        .non_empty(&["public_ipv6", "ipv6_address"])
        .ok_or(MappingError::MissingField("ipv6_address"))?;

    Ok(CacheRecord::Ipv6(Ipv6BindingCache {
        node_id: node.id,
        node_name: node.name.clone(),
        hostname: hostname.to_string(),
        ipv6_address: ipv6_address.to_string(),
        interface: fields.string_or_default(&["interface"]),
        status: status_or_active(&fields),
        last_sync: synced_at,
        sync_error: String::new(),
    }))
}
