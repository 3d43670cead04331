//! # Persistence Module
//!
//! ## Why This Module Exists
//! Keeps the small amount of state padwatch carries across runs: the
//! application configuration (poll rate, rumble duration, debug display size)
//! and the user-assigned pad labels. Everything is stored as TOML under the
//! user's home config directory.
//!
//! ## Error Handling Strategy
//! Uses `color_eyre` for rich error context in file operations. Missing files
//! gracefully degrade to defaults so the application always starts; only
//! unreadable or corrupt files surface as errors.

pub mod label_store;

use color_eyre::eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

pub(crate) const CONFIG_DIR: &str = ".config/padwatch";
const CONFIG_FILE: &str = "config.toml";

/// Top-level application configuration.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(default)]
pub struct AppConfig {
    pub monitor: MonitorConfig,
    pub debug_log: DebugLogConfig,
}

/// Poll loop configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct MonitorConfig {
    /// Frame interval of the poll loop in milliseconds
    pub poll_interval_ms: u64,
    /// Default rumble duration in milliseconds
    pub rumble_duration_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 16,
            rumble_duration_ms: 300,
        }
    }
}

/// Debug display configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct DebugLogConfig {
    /// Number of retained debug display lines
    pub capacity: usize,
}

impl Default for DebugLogConfig {
    fn default() -> Self {
        Self {
            capacity: crate::debuglog::DEFAULT_CAPACITY,
        }
    }
}

impl AppConfig {
    /// Writes a default configuration file on first run.
    pub async fn ensure_default_config() -> Result<()> {
        let path = config_file_path();
        if tokio::fs::try_exists(&path)
            .await
            .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?
        {
            return Ok(());
        }

        info!("Creating default configuration at {}", path.display());
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }
        let content = toml::to_string_pretty(&AppConfig::default())
            .map_err(|e| eyre!("Failed to serialize default config: {}", e))?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| eyre!("Failed to write default config: {}", e))?;
        Ok(())
    }

    pub async fn load_or_default() -> Result<Self> {
        Self::load_from(config_file_path()).await
    }

    pub async fn load_from(path: PathBuf) -> Result<Self> {
        if !tokio::fs::try_exists(&path)
            .await
            .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?
        {
            warn!(
                "Config file {} does not exist, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| eyre!("Failed to read config file: {}", e))?;
        toml::from_str(&content).map_err(|e| eyre!("Failed to parse config file: {}", e))
    }
}

pub(crate) fn get_home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        warn!("Could not determine home directory, using current directory");
        PathBuf::from(".")
    })
}

fn config_file_path() -> PathBuf {
    let mut path = get_home_dir();
    path.push(CONFIG_DIR);
    path.push(CONFIG_FILE);
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let config = AppConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&serialized).unwrap();

        assert_eq!(parsed.monitor.poll_interval_ms, 16);
        assert_eq!(parsed.monitor.rumble_duration_ms, 300);
        assert_eq!(parsed.debug_log.capacity, crate::debuglog::DEFAULT_CAPACITY);
    }

    #[test]
    fn partial_config_fills_missing_sections_with_defaults() {
        let parsed: AppConfig = toml::from_str("[monitor]\npoll_interval_ms = 8\n").unwrap();
        assert_eq!(parsed.monitor.poll_interval_ms, 8);
        assert_eq!(parsed.monitor.rumble_duration_ms, 300);
        assert_eq!(parsed.debug_log.capacity, crate::debuglog::DEFAULT_CAPACITY);
    }

    #[tokio::test]
    async fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(dir.path().join("missing.toml"))
            .await
            .unwrap();
        assert_eq!(config.monitor.poll_interval_ms, 16);
    }

    #[tokio::test]
    async fn written_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, "[monitor]\npoll_interval_ms = 33\n[debug_log]\ncapacity = 10\n")
            .await
            .unwrap();

        let config = AppConfig::load_from(path).await.unwrap();
        assert_eq!(config.monitor.poll_interval_ms, 33);
        assert_eq!(config.debug_log.capacity, 10);
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, "not valid toml [").await.unwrap();

        assert!(AppConfig::load_from(path).await.is_err());
    }
}
