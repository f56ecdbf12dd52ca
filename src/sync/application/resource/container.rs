use super::{DetailShape, Fields, MappingError, ResourceSpec};
use crate::{CacheRecord, ContainerCache, Node, ResourceKind};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

const MIB: f64 = 1024.0 * 1024.0;

pub const CONTAINER: ResourceSpec = ResourceSpec {
    kind: ResourceKind::Container,
    bulk_path: "/api/cache/containers",
    listing_path: "/api/list",
    detail_path: "/api/info",
    detail: DetailShape::Merge,
    map_item: to_row,
};

fn to_row(
    node: &Node,
    item: &Map<String, Value>,
    synced_at: DateTime<Utc>,
) -> Result<CacheRecord, MappingError> {
    let fields = Fields(item);
    let hostname = fields
        .non_empty(&["hostname"])
        .ok_or(MappingError::MissingField("hostname"))?;
    let config = fields.object("config");

    // `memory` and `disk` arrive as MB numbers on the detail endpoint and as
    // display strings under `config` on some agent versions.
    let memory_mb = fields.f64(&["memory"]);
    let disk_mb = fields.f64(&["disk"]);
    let memory = config
        .as_ref()
        .and_then(|c| c.non_empty(&["memory"]))
        .map(str::to_string)
        .or_else(|| memory_mb.map(|mb| format!("{:.0}MB", mb)))
        .unwrap_or_default();
    let disk = config
        .as_ref()
        .and_then(|c| c.non_empty(&["disk"]))
        .map(str::to_string)
        .or_else(|| disk_mb.map(|mb| format!("{:.0}MB", mb)))
        .unwrap_or_default();

    let traffic_total = fields.u64(&["traffic_usage_raw"]).unwrap_or(0);

    Ok(CacheRecord::Container(ContainerCache {
        node_id: node.id,
        node_name: node.name.clone(),
        hostname: hostname.to_string(),
        status: fields.string_or_default(&["status"]),
        ipv4: fields.string_or_default(&["ipv4"]),
        ipv6: fields.string_or_default(&["ipv6"]),
        image: fields.string_or_default(&["image"]),
        cpus: fields
            .u64(&["cpus"])
            .map(|cpus| u32::try_from(cpus).unwrap_or(u32::MAX))
            .unwrap_or(0),
        memory,
        disk,
        traffic_limit: config
            .as_ref()
            .and_then(|c| c.u64(&["traffic_limit"]))
            .unwrap_or(0),
        cpu_usage: fields.f64(&["cpu_percent", "cpu_usage"]).unwrap_or(0.0),
        memory_usage: fields.u64(&["memory_usage_raw"]).unwrap_or(0),
        memory_total: memory_mb.map(|mb| (mb * MIB) as u64).unwrap_or(0),
        disk_usage: fields.u64(&["disk_usage_raw"]).unwrap_or(0),
        disk_total: disk_mb.map(|mb| (mb * MIB) as u64).unwrap_or(0),
        traffic_total,
        traffic_in: traffic_total / 2,
        traffic_out: traffic_total / 2,
        last_sync: synced_at,
        sync_error: String::new(),
    }))
}

/// Overlays a container's detail object on its listing entry.
///
/// Detail values win; listing values only fill gaps. The hostname from the
/// listing is always kept so the row key matches what was listed.
pub(crate) fn merge_detail(
    hostname: &str,
    listing: &Map<String, Value>,
    detail: Option<&Map<String, Value>>,
) -> Value {
    let mut merged = detail.cloned().unwrap_or_default();
    for (key, value) in listing {
        merged.entry(key.clone()).or_insert_with(|| value.clone());
    }
    merged.insert("hostname".to_string(), Value::String(hostname.to_string()));
    Value::Object(merged)
}
