//! crawld configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::scheduler::SchedulerConfig;

/// Main crawld configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scheduler loop configuration
    pub scheduler: SchedulerConfig,

    /// Compute cluster configuration
    pub cluster: ClusterConfig,

    /// Completion notification configuration
    pub notify: NotifyConfig,

    /// Storage configuration
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .crawld.yml
        let local_config = PathBuf::from(".crawld.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/crawld/crawld.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("crawld").join("crawld.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Compute cluster configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Cluster API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Environment variable containing the cluster auth token
    #[serde(rename = "auth-token-env")]
    pub auth_token_env: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8301".to_string(),
            auth_token_env: "CRAWLD_CLUSTER_TOKEN".to_string(),
            timeout_ms: 30_000,
        }
    }
}

impl ClusterConfig {
    /// Read the auth token, if the configured environment variable is set
    pub fn auth_token(&self) -> Option<String> {
        std::env::var(&self.auth_token_env).ok()
    }
}

/// Completion notification configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Webhook URL to POST completion events to (unset = log only)
    #[serde(rename = "webhook-url")]
    pub webhook_url: Option<String>,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms", default = "default_notify_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_notify_timeout_ms() -> u64 {
    10_000
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for the record store
    #[serde(rename = "store-dir")]
    pub store_dir: String,

    /// Key prefix workers write crawl output under
    #[serde(rename = "data-prefix")]
    pub data_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // Use XDG data directory (~/.local/share/crawld on Linux)
        let store_dir = dirs::data_dir()
            .map(|d| d.join("crawld"))
            .unwrap_or_else(|| PathBuf::from(".crawld"))
            .to_string_lossy()
            .into_owned();

        Self {
            store_dir,
            data_prefix: "crawl-data/".to_string(),
        }
    }
}
