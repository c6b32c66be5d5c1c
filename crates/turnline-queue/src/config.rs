//! Queue limits
//!
//! Loaded from the `[queue]` table of a TOML file, falls back to defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use turnline_core::{Error, Result};

pub const DEFAULT_MAX_ITEMS: usize = 100;

/// Hard ceiling multiplier applied when `hard_max_items` is unset.
pub const HARD_LIMIT_FACTOR: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Soft limit. Past it, new coalescable items evict the oldest coalescable item.
    pub max_items: usize,
    /// Hard ceiling. Past it, every enqueue is rejected. Defaults to `max_items * 3`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hard_max_items: Option<usize>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_items: DEFAULT_MAX_ITEMS,
            hard_max_items: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    queue: QueueConfig,
}

impl QueueConfig {
    pub fn new(max_items: usize) -> Self {
        Self {
            max_items,
            hard_max_items: None,
        }
    }

    pub fn with_hard_max_items(mut self, hard_max_items: usize) -> Self {
        self.hard_max_items = Some(hard_max_items);
        self
    }

    /// Effective hard ceiling.
    pub fn hard_limit(&self) -> usize {
        self.hard_max_items
            .unwrap_or_else(|| self.max_items.saturating_mul(HARD_LIMIT_FACTOR))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_items == 0 {
            return Err(Error::invalid_config("max_items must be at least 1"));
        }
        let hard = self.hard_limit();
        if hard < self.max_items {
            return Err(Error::invalid_config(format!(
                "hard_max_items ({}) is below max_items ({})",
                hard, self.max_items
            )));
        }
        Ok(())
    }

    /// Force the limits into a usable shape: soft at least 1, hard at least soft.
    pub fn clamped(&self) -> Self {
        let max_items = self.max_items.max(1);
        let hard = self
            .hard_max_items
            .unwrap_or_else(|| max_items.saturating_mul(HARD_LIMIT_FACTOR))
            .max(max_items);
        Self {
            max_items,
            hard_max_items: Some(hard),
        }
    }

    /// Parse the `[queue]` table out of a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content)?;
        file.queue.validate()?;
        Ok(file.queue)
    }

    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let config = Self::from_toml(&content)?;
                tracing::info!("Loaded queue config from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No queue config at {} - using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }
}
