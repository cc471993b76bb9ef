pub mod drone_config;
pub mod gamepad_config;
pub mod heading_config;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{error, info, warn};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::fs;

use crate::config::drone_config::DroneConfig;
use crate::config::heading_config::HeadingConfig;
use crate::utils::ensure_directory_exists;

/// A config struct persisted as a pretty-printed JSON file in the config directory.
#[async_trait]
pub trait ConfigFile: Serialize + DeserializeOwned + Default + Send + Sync {
    /// File name inside the config directory.
    const FILE_NAME: &'static str;

    fn path_in(config_dir: &Path) -> PathBuf {
        config_dir.join(Self::FILE_NAME)
    }

    /// Loads the config from `config_dir`, falling back to defaults when the file is missing.
    async fn load_config(config_dir: &Path) -> Result<Self> {
        let file_path = Self::path_in(config_dir);
        let file_path_str = file_path.to_string_lossy().into_owned();

        if !file_path.exists() {
            warn!("Config file not found at {:?}, using default.", file_path_str);
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(&file_path)
            .await
            .with_context(|| format!("reading {}", file_path_str))?;
        let config: Self = serde_json::from_str(&config_json)
            .with_context(|| format!("parsing {}", file_path_str))?;

        info!("Config loaded from {:?}", file_path_str);
        Ok(config)
    }

    /// Saves the config into `config_dir`, creating the directory if needed.
    async fn save_config(&self, config_dir: &Path) -> Result<()> {
        ensure_directory_exists(config_dir).await?;

        let file_path = Self::path_in(config_dir);
        let file_path_str = file_path.to_string_lossy().into_owned();

        let config_json = match serde_json::to_string_pretty(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize {} to JSON: {}", Self::FILE_NAME, e);
                return Err(e.into());
            }
        };

        fs::write(&file_path, config_json).await?;
        info!("Config saved to {:?}", file_path_str);
        Ok(())
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// One of error, warn, info, debug, trace.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

impl LogConfig {
    pub fn level_filter(&self) -> log::LevelFilter {
        self.level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub heading: HeadingConfig,
    pub drone: DroneConfig,
    pub log: LogConfig,
}

impl ConfigFile for AppConfig {
    const FILE_NAME: &'static str = "config.json";
}
