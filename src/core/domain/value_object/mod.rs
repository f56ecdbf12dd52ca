mod api_key;
mod node_address;

pub use api_key::ApiKey;
pub use node_address::NodeAddress;
