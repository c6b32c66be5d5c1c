//! Driver settings
//!
//! One TOML file with a `[queue]` table for the runtime limits and a
//! `[driver]` table for the demo driver. Missing file means defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use turnline_queue::QueueConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub queue: QueueConfig,
    pub driver: DriverConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Simulated length of one streaming turn, in milliseconds.
    pub turn_ms: u64,
    /// How often the driver checks the queue, in milliseconds.
    pub poll_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            turn_ms: 1500,
            poll_ms: 50,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config at {} - using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        let settings: Settings = toml::from_str(&content)?;
        settings.queue.validate()?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(settings)
    }

    /// Write the current settings as TOML.
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}
