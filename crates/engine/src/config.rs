//! Engine configuration.
//!
//! A small JSON document read from `STRATA_CONFIG_PATH` or the platform configuration directory
//! (`~/.config/strata/engine.json` on most platforms). Missing or unreadable files fall back to
//! defaults so an embedding viewer never fails to start over configuration.

use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use dirs_next::config_dir;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Environment variable allowing callers to override the configuration file path.
pub const CONFIG_PATH_ENV: &str = "STRATA_CONFIG_PATH";

const DEFAULT_STALE_TIME_MS: u64 = 300_000;
const DEFAULT_NOTIFICATION_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Age after which a cached payload must be refetched before reuse, unless the provider type
    /// supplies its own hint. In milliseconds.
    pub stale_time_ms: u64,
    /// Buffer size of each subscription topic.
    pub notification_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stale_time_ms: DEFAULT_STALE_TIME_MS,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Loads the configuration from the default location, falling back to defaults.
    pub fn load() -> Self {
        let path = default_config_path();
        if !path.exists() {
            debug!(path = %path.display(), "no engine config file, using defaults");
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(error) => {
                warn!(path = %path.display(), "ignoring engine config: {error:#}");
                Self::default()
            }
        }
    }

    /// Loads the configuration from an explicit path.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).with_context(|| format!("failed to read engine config: {}", path.display()))?;
        let config = serde_json::from_str(&content).with_context(|| format!("invalid engine config: {}", path.display()))?;
        Ok(config)
    }

    pub fn stale_time(&self) -> Duration {
        Duration::from_millis(self.stale_time_ms)
    }

    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time_ms = u64::try_from(stale_time.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

/// Default path of the engine configuration file.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV)
        && !path.trim().is_empty()
    {
        return PathBuf::from(path.trim());
    }

    config_dir().unwrap_or_else(|| PathBuf::from(".")).join("strata").join("engine.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("engine.json");
        std::fs::write(&path, r#"{ "stale_time_ms": 5000 }"#).unwrap();

        let config = EngineConfig::load_from(&path).expect("load config");
        assert_eq!(config.stale_time(), Duration::from_secs(5));
        assert_eq!(config.notification_capacity, DEFAULT_NOTIFICATION_CAPACITY);
    }

    #[test]
    fn stale_time_keeps_sub_second_precision() {
        let config = EngineConfig::default().with_stale_time(Duration::from_millis(1500));
        assert_eq!(config.stale_time(), Duration::from_secs_f64(1.5));
        assert_eq!(config.stale_time_ms, 1500);
    }

    #[test]
    fn invalid_file_reports_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("engine.json");
        std::fs::write(&path, "not json").unwrap();

        let error = EngineConfig::load_from(&path).expect_err("should fail");
        assert!(format!("{error:#}").contains("invalid engine config"), "unexpected error: {error:#}");
    }
}
