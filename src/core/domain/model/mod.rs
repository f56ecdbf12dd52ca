pub mod agent_response;
pub mod cache_record;
pub mod container_cache;
pub mod ipv6_binding_cache;
pub mod nat_rule_cache;
pub mod node;
pub mod proxy_config_cache;
pub mod resource_kind;
pub mod sync_preset;
pub mod sync_task;
