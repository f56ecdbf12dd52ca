pub mod agent_client;
pub mod store;
