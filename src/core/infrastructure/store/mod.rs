mod memory;
mod traits;

pub use memory::InMemoryStore;
pub use traits::{CacheRowStore, CacheStore, NodeStore, TaskStore};
