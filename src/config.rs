//! Configuration for the sync engine and the `fleet-syncd` daemon.
//!
//! Values are layered: built-in defaults, then an optional file (format by
//! extension), then `FLEET_SYNC__`-prefixed environment variables such as
//! `FLEET_SYNC__SYNC__INTERVAL_SECS=600`.

use crate::{
    AgentClientConfig, ApiKey, BatchSettings, EvictionPolicy, Node, NodeAddress, NodeStatus,
    PeriodicSettings, SyncError, SyncPreset, SyncResult, ValidationError,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "FLEET_SYNC";

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetSyncConfig {
    /// Scheduling and pacing
    #[serde(default)]
    pub sync: SyncConfig,

    /// HTTP client used for node calls
    #[serde(default)]
    pub agent: AgentConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Nodes registered at startup
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

/// Scheduling and pacing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Seconds between periodic container syncs
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Seconds to wait after startup before the first periodic sync
    #[serde(default = "default_startup_delay")]
    pub startup_delay_secs: u64,

    /// Per-container calls issued at once during fan-out runs
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Seconds between two fan-out batches
    #[serde(default = "default_batch_interval")]
    pub batch_interval_secs: u64,

    /// Which keys survive the eviction step
    #[serde(default)]
    pub eviction: EvictionPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            startup_delay_secs: default_startup_delay(),
            batch_size: default_batch_size(),
            batch_interval_secs: default_batch_interval(),
            eviction: EvictionPolicy::default(),
        }
    }
}

impl SyncConfig {
    pub fn batch_settings(&self) -> BatchSettings {
        BatchSettings::new(self.batch_size, Duration::from_secs(self.batch_interval_secs))
    }

    pub fn periodic_settings(&self) -> PeriodicSettings {
        PeriodicSettings {
            startup_delay: Duration::from_secs(self.startup_delay_secs),
            interval: Duration::from_secs(self.interval_secs),
        }
    }
}

/// Node HTTP client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Accept self-signed node certificates
    #[serde(default = "default_true")]
    pub accept_invalid_certs: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            accept_invalid_certs: true,
        }
    }
}

impl AgentConfig {
    pub fn client_config(&self) -> AgentClientConfig {
        AgentClientConfig {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            accept_invalid_certs: self.accept_invalid_certs,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// A node declared in the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub id: u32,
    pub name: String,
    /// Base URL of the node's management API
    pub address: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_node_status")]
    pub status: NodeStatus,
    /// `low`, `medium`, `high` or `custom`; unset means the global pacing
    #[serde(default)]
    pub sync_preset: Option<String>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub batch_interval_secs: Option<u64>,
}

impl NodeConfig {
    pub fn to_node(&self) -> Result<Node, ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::Field {
                field: "name".to_string(),
                message: format!("node {} has an empty name", self.id),
            });
        }
        let preset = SyncPreset::from_parts(
            self.sync_preset.as_deref(),
            self.batch_size,
            self.batch_interval_secs,
        )?;

        let mut node = Node::new(self.id, self.name.clone(), NodeAddress::parse(&self.address)?)
            .with_status(self.status)
            .with_preset(preset);
        if let Some(api_key) = self.api_key.as_deref().filter(|key| !key.is_empty()) {
            node = node.with_api_key(ApiKey::new(api_key)?);
        }
        Ok(node)
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_interval() -> u64 {
    300
}

fn default_startup_delay() -> u64 {
    10
}

fn default_batch_size() -> usize {
    5
}

fn default_batch_interval() -> u64 {
    2
}

fn default_request_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_node_status() -> NodeStatus {
    NodeStatus::Active
}

impl FleetSyncConfig {
    /// Loads and validates the configuration.
    ///
    /// `path` must exist when given.
    pub fn load(path: Option<&str>) -> SyncResult<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`FleetSyncConfig::load`], reading overrides from `env` instead
    /// of the process environment when it is `Some`.
    pub fn load_with_env(
        path: Option<&str>,
        env: Option<HashMap<String, String>>,
    ) -> SyncResult<Self> {
        let config_error = |e: config::ConfigError| SyncError::Config(e.to_string());

        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&FleetSyncConfig::default()).map_err(config_error)?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let config: FleetSyncConfig = builder
            .build()
            .map_err(config_error)?
            .try_deserialize()
            .map_err(config_error)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> SyncResult<()> {
        if self.sync.interval_secs == 0 {
            return Err(SyncError::Config("sync.interval_secs must be positive".to_string()));
        }
        if self.sync.batch_size == 0 {
            return Err(SyncError::Config("sync.batch_size must be positive".to_string()));
        }
        if self.agent.request_timeout_secs == 0 {
            return Err(SyncError::Config(
                "agent.request_timeout_secs must be positive".to_string(),
            ));
        }

        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id) {
                return Err(SyncError::Config(format!("duplicate node id {}", node.id)));
            }
            if !names.insert(node.name.as_str()) {
                return Err(SyncError::Config(format!("duplicate node name '{}'", node.name)));
            }
            node.to_node()?;
        }
        Ok(())
    }
}
