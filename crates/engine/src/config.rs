// Local configuration for the engine.
//
// Tunables live in `~/.coscribe/config.toml`; every field has a serde
// default so a partial or missing file still yields a working engine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::debounce::DebounceConfig;

/// Root directory for Coscribe local state: `~/.coscribe/`.
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".coscribe"))
}

/// Path to the config file: `~/.coscribe/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Engine tunables loaded from `~/.coscribe/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Debounce window for local writes, in milliseconds.
    pub debounce_ms: u64,
    /// Age after which an active presence record is treated as dead.
    pub presence_stale_after_secs: u64,
    /// Interval between presence heartbeats.
    pub heartbeat_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { debounce_ms: 1000, presence_stale_after_secs: 45, heartbeat_interval_secs: 15 }
    }
}

impl EngineConfig {
    /// Load from `~/.coscribe/config.toml`. Returns defaults if the file
    /// doesn't exist or can't be parsed.
    pub fn load() -> Self {
        config_path().and_then(|path| Self::load_from(&path).ok()).unwrap_or_default()
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("failed to parse config at {}", path.display()))
    }

    pub fn debounce(&self) -> DebounceConfig {
        DebounceConfig::with_millis(self.debounce_ms)
    }

    pub fn presence_stale_after(&self) -> Duration {
        Duration::from_secs(self.presence_stale_after_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}
