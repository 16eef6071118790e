// Host configuration
// Read from $FINSAATHI_CONFIG, else ~/.config/finsaathi-host/config.json

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use finsaathi_channel::ChannelConfig;

/// Environment variable pointing at an explicit config file.
pub const CONFIG_ENV: &str = "FINSAATHI_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub channel: ChannelConfig,
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Readiness reported by the default sign-in probe.
    pub sign_in_ready: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            log_filter: "info".to_string(),
            sign_in_ready: true,
        }
    }
}

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("com", "finsaathi", "finsaathi-host")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    Ok(dirs.config_dir().to_path_buf())
}

/// Resolve which config file to read: the env override wins.
pub fn config_path() -> Result<PathBuf> {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
        _ => Ok(config_dir()?.join("config.json")),
    }
}

/// Load config from a specific path; a missing file means defaults.
pub fn load_config_from(path: &Path) -> Result<HostConfig> {
    if path.exists() {
        let data = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&data)
            .map_err(|e| anyhow::anyhow!("Invalid config {}: {}", path.display(), e))?;
        Ok(config)
    } else {
        Ok(HostConfig::default())
    }
}

/// Load the host config from its resolved location
pub fn load_config() -> Result<HostConfig> {
    load_config_from(&config_path()?)
}
