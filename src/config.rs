use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::gocd::HISTORY_DEPTH;

/// Configuration file structure for the monitor.
///
/// Every value can also be given on the command line or through the
/// environment, which take precedence over the file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub gocd: GoCdConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GoCdConfig {
    /// GoCD server base URL (e.g., <https://gocd.example.com>)
    pub url: Option<String>,

    /// Basic-auth user name
    pub user: Option<String>,

    /// Basic-auth password
    pub password: Option<String>,

    /// Seconds between refresh cycles
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Runs fetched per pipeline (1-5)
    #[serde(default = "default_history_depth")]
    pub history_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    /// Address subscribers connect to
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Settings document store
    pub settings_file: Option<PathBuf>,
}

impl Default for GoCdConfig {
    fn default() -> Self {
        Self {
            url: None,
            user: None,
            password: None,
            poll_interval: default_poll_interval(),
            history_depth: default_history_depth(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            settings_file: None,
        }
    }
}

fn default_poll_interval() -> u64 {
    10
}

fn default_history_depth() -> usize {
    HISTORY_DEPTH
}

fn default_listen() -> String {
    "127.0.0.1:3000".to_string()
}

/// Platform data directory, e.g. `~/.local/share/gocd-monitor/settings.db`.
pub fn default_settings_file() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().context("No data directory found for the settings store")?;
    Ok(data_dir.join("gocd-monitor").join("settings.db"))
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./gocd-monitor.toml
    /// 3. ./gocd-monitor.json
    /// 4. ./gocd-monitor.yaml
    /// 5. ./gocd-monitor.yml
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let candidates = [
            "gocd-monitor.toml",
            "gocd-monitor.json",
            "gocd-monitor.yaml",
            "gocd-monitor.yml",
        ];

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }
}
