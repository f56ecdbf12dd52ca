use super::{DetailShape, Fields, MappingError, ResourceSpec, status_or_active};
use crate::{CacheRecord, Node, ProxyConfigCache, ResourceKind};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

pub const PROXY: ResourceSpec = ResourceSpec {
    kind: ResourceKind::Proxy,
    bulk_path: "/api/cache/proxy",
    listing_path: "/api/cache/containers",
    detail_path: "/api/proxy/list",
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
    let domain = fields
        .non_empty(&["domain"])
        .ok_or(MappingError::MissingField("domain"))?;

    Ok(CacheRecord::Proxy(ProxyConfigCache {
        node_id: node.id,
        node_name: node.name.clone(),
        hostname: hostname.to_string(),
        domain: domain.to_string(),
        backend_port: fields
            .port("backend_port", &["container_port", "backend_port"])?
            .unwrap_or(0),
        ssl_enabled: fields.bool(&["ssl_enabled", "ssl"]).unwrap_or(false),
        ssl_type: fields.str(&["ssl_type"]).unwrap_or("none").to_string(),
        status: status_or_active(&fields),
        last_sync: synced_at,
        sync_error: String::new(),
    }))
}
