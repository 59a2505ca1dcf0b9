pub mod control_config;
pub mod scan_config;

use std::path::Path;

use anyhow::Result;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::config::control_config::ControlConfig;
use crate::config::scan_config::ScanConfig;

pub const CONFIG_FILE_NAME: &str = "ble_remote_control.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scan: ScanConfig,
    pub control: ControlConfig,
    /// One of error, warn, info, debug, trace
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            scan: ScanConfig::default(),
            control: ControlConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Loads the config from `file_path`, falling back to defaults when it is missing.
    pub async fn load_config(file_path: &Path) -> Result<Self> {
        if !file_path.exists() {
            warn!("Config file not found at {:?}, using default.", file_path);
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(file_path).await?;
        let config: Self = serde_json::from_str(&config_json)?;

        info!("Config loaded from {:?}", file_path);
        Ok(config)
    }

    /// Saves the current config to `file_path`.
    pub async fn save_config(&self, file_path: &Path) -> Result<()> {
        if let Some(config_dir) = file_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if !config_dir.exists() {
                fs::create_dir_all(config_dir).await?;
                info!("Created config directory {:?}", config_dir);
            }
        }

        let config_json = match serde_json::to_string_pretty(&self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize config to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(file_path, config_json).await?;

        info!("Config saved to {:?}.", file_path);
        Ok(())
    }

    pub fn log_level(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("ble-remote-control-{}-{}", name, std::process::id()))
            .join(CONFIG_FILE_NAME)
    }

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let config = AppConfig::load_config(&temp_path("missing")).await.unwrap();
        assert_eq!(config.scan.window_ms, 2000);
        assert!(!config.scan.include_unnamed);
        assert_eq!(config.control.offset_steps, vec![-30, -15, 0, 15, 30]);
        assert_eq!(config.log_level(), log::LevelFilter::Info);
    }

    #[tokio::test]
    async fn save_then_load() {
        let path = temp_path("roundtrip");
        let mut config = AppConfig::default();
        config.scan.window_ms = 5000;
        config.scan.include_unnamed = true;
        config.log_level = "debug".to_string();

        config.save_config(&path).await.unwrap();
        let loaded = AppConfig::load_config(&path).await.unwrap();

        assert_eq!(loaded.scan.window_ms, 5000);
        assert!(loaded.scan.include_unnamed);
        assert_eq!(loaded.log_level(), log::LevelFilter::Debug);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{"scan":{"window_ms":750}}"#).unwrap();
        assert_eq!(config.scan.window_ms, 750);
        assert!(!config.scan.include_unnamed);
        assert_eq!(config.control.offset_steps.len(), 5);
    }
}
