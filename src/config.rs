/// Configuration loading
///
/// Priority: explicit path, then `<config_dir>/photo-curator/config.toml`,
/// then compiled defaults. Environment variables override the grading
/// endpoint and API key last.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::{CuratorError, Result};

pub const ENV_ENDPOINT: &str = "PHOTO_CURATOR_ENDPOINT";
pub const ENV_API_KEY: &str = "PHOTO_CURATOR_API_KEY";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub grading: GradingConfig,
    pub prepare: PrepareConfig,
    /// Default tracing filter when RUST_LOG is unset
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Base recurring tick
    pub tick_interval_ms: u64,
    /// Delay before the immediate follow-up pass after a batch completes
    pub follow_up_delay_ms: u64,
    pub start_paused: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            follow_up_delay_ms: 100,
            start_paused: false,
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn follow_up_delay(&self) -> Duration {
        Duration::from_millis(self.follow_up_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradingConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: u64,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080".to_string(),
            api_key: None,
            model: None,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrepareConfig {
    /// Longest edge of the payload sent for grading, in pixels
    pub max_edge: u32,
    pub jpeg_quality: u8,
}

impl Default for PrepareConfig {
    fn default() -> Self {
        Self {
            max_edge: 1536,
            jpeg_quality: 85,
        }
    }
}

impl Config {
    /// Resolve and load configuration, then apply environment overrides
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Config::default(),
            },
        };

        config.apply_overrides(
            std::env::var(ENV_ENDPOINT).ok(),
            std::env::var(ENV_API_KEY).ok(),
        );
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CuratorError::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config = Self::from_toml(&content)
            .map_err(|e| CuratorError::Config(format!("{}: {}", path.display(), e)))?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Blank values are ignored
    pub fn apply_overrides(&mut self, endpoint: Option<String>, api_key: Option<String>) {
        if let Some(endpoint) = endpoint.filter(|v| !v.trim().is_empty()) {
            self.grading.endpoint = endpoint;
        }
        if let Some(key) = api_key.filter(|v| !v.trim().is_empty()) {
            self.grading.api_key = Some(key);
        }
    }
}

/// `~/.config/photo-curator/config.toml` on Linux
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("photo-curator").join("config.toml"))
}
