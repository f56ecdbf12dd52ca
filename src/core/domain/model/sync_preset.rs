//! Per-node pacing overrides for fan-out polling.

use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::time::Duration;

use crate::core::domain::error::ValidationError;

/// Effective pacing for one fan-out run: how many detail calls go out at once
/// and how long to wait between consecutive batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    pub size: NonZeroUsize,
    pub interval: Duration,
}

impl BatchSettings {
    /// Builds settings, treating a zero size as one call per batch.
    pub fn new(size: usize, interval: Duration) -> Self {
        Self {
            size: NonZeroUsize::new(size).unwrap_or(NonZeroUsize::MIN),
            interval,
        }
    }
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(2))
    }
}

/// Throughput profile chosen for a node.
///
/// Named presets trade speed against load on the node. `Custom` values of zero
/// fall back to the global defaults, as does `Default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(tag = "preset", rename_all = "lowercase")]
pub enum SyncPreset {
    #[default]
    Default,
    Low,
    Medium,
    High,
    Custom {
        batch_size: usize,
        batch_interval_secs: u64,
    },
}

impl SyncPreset {
    /// Builds a preset from the flat form used in configuration files.
    pub fn from_parts(
        preset: Option<&str>,
        batch_size: Option<usize>,
        batch_interval_secs: Option<u64>,
    ) -> Result<Self, ValidationError> {
        match preset.map(|p| p.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("default") => {
                if batch_size.is_some() || batch_interval_secs.is_some() {
                    Ok(SyncPreset::Custom {
                        batch_size: batch_size.unwrap_or(0),
                        batch_interval_secs: batch_interval_secs.unwrap_or(0),
                    })
                } else {
                    Ok(SyncPreset::Default)
                }
            }
            Some("low") => Ok(SyncPreset::Low),
            Some("medium") => Ok(SyncPreset::Medium),
            Some("high") => Ok(SyncPreset::High),
            Some("custom") => Ok(SyncPreset::Custom {
                batch_size: batch_size.unwrap_or(0),
                batch_interval_secs: batch_interval_secs.unwrap_or(0),
            }),
            Some(other) => Err(ValidationError::Field {
                field: "sync_preset".to_string(),
                message: format!("unknown preset '{}', expected low, medium, high or custom", other),
            }),
        }
    }

    /// Resolves the preset against the global defaults.
    pub fn resolve(&self, defaults: BatchSettings) -> BatchSettings {
        match *self {
            SyncPreset::Default => defaults,
            SyncPreset::Low => BatchSettings::new(3, Duration::from_secs(10)),
            SyncPreset::Medium => BatchSettings::new(5, Duration::from_secs(5)),
            SyncPreset::High => BatchSettings::new(10, Duration::from_secs(3)),
            SyncPreset::Custom {
                batch_size,
                batch_interval_secs,
            } => BatchSettings {
                size: NonZeroUsize::new(batch_size).unwrap_or(defaults.size),
                interval: if batch_interval_secs > 0 {
                    Duration::from_secs(batch_interval_secs)
                } else {
                    defaults.interval
                },
            },
        }
    }
}
