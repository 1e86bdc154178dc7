use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::normalizer::NormalizerMode;
use crate::services::batching::DeviceClass;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub normalizer: NormalizerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub guards: GuardConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Settle delay before a scheduled backlog starts linking
    #[serde(default = "default_backlog_delay_ms")]
    pub backlog_delay_ms: u64,

    /// Pause between two committed chunks of one bulk write
    #[serde(default)]
    pub chunk_pacing_ms: u64,

    /// Pause between two backlog chunks
    #[serde(default)]
    pub backlog_pause_ms: u64,

    /// Link inline during a full sync instead of deferring to the backlog
    #[serde(default)]
    pub link_on_initial_sync: bool,

    #[serde(default = "default_true")]
    pub link_on_incremental_sync: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Skip classification and use this class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_override: Option<DeviceClass>,

    #[serde(default = "default_low_ram_threshold_mb")]
    pub low_ram_threshold_mb: u64,

    #[serde(default)]
    pub is_tv: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_ram_mb: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizerConfig {
    #[serde(default)]
    pub mode: NormalizerMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardConfig {
    #[serde(default = "default_min_battery_percent")]
    pub min_battery_percent: u8,

    #[serde(default = "default_true")]
    pub allow_metered: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            info!("No config file found, using defaults");
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", path);
        let contents = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;
        info!("Config loaded successfully");
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents).context("Failed to write config file")?;

        debug!("Config saved to {:?}", path);
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;
        Ok(config_dir.join("fishit").join("catalog.toml"))
    }
}

impl SyncConfig {
    pub fn backlog_delay(&self) -> Duration {
        Duration::from_millis(self.backlog_delay_ms)
    }

    pub fn chunk_pacing(&self) -> Option<Duration> {
        (self.chunk_pacing_ms > 0).then(|| Duration::from_millis(self.chunk_pacing_ms))
    }

    pub fn backlog_pause(&self) -> Option<Duration> {
        (self.backlog_pause_ms > 0).then(|| Duration::from_millis(self.backlog_pause_ms))
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            backlog_delay_ms: default_backlog_delay_ms(),
            chunk_pacing_ms: 0,
            backlog_pause_ms: 0,
            link_on_initial_sync: false,
            link_on_incremental_sync: true,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            class_override: None,
            low_ram_threshold_mb: default_low_ram_threshold_mb(),
            is_tv: false,
            total_ram_mb: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: default_max_connections(),
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            min_battery_percent: default_min_battery_percent(),
            allow_metered: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_backlog_delay_ms() -> u64 {
    5000
}

fn default_low_ram_threshold_mb() -> u64 {
    2048
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_battery_percent() -> u8 {
    15
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.sync.backlog_delay(), Duration::from_millis(5000));
        assert!(config.sync.chunk_pacing().is_none());
        assert!(config.sync.link_on_incremental_sync);
        assert!(!config.sync.link_on_initial_sync);
        assert_eq!(config.normalizer.mode, NormalizerMode::Scene);
        assert_eq!(config.guards.min_battery_percent, 15);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [sync]
            chunk_pacing_ms = 50

            [device]
            class_override = "tv_low_ram"

            [normalizer]
            mode = "passthrough"
            "#,
        )
        .unwrap();

        assert_eq!(config.sync.chunk_pacing(), Some(Duration::from_millis(50)));
        assert_eq!(config.sync.backlog_delay_ms, 5000);
        assert_eq!(config.device.class_override, Some(DeviceClass::TvLowRam));
        assert_eq!(config.device.low_ram_threshold_mb, 2048);
        assert_eq!(config.normalizer.mode, NormalizerMode::Passthrough);
    }

    #[test]
    fn test_save_and_load_from_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("catalog.toml");

        let mut config = Config::default();
        config.database.max_connections = 4;
        config.device.total_ram_mb = Some(1536);
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
