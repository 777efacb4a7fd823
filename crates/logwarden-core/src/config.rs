//! Daemon settings and TOML configuration parsing.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Top-level logwarden configuration, loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogwardenConfig {
    /// API server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Record store and retention settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Analysis snapshot and summary settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

/// API server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP/WebSocket API binds to.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Records returned by a query when no limit is given.
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    /// Hard cap on records returned by a single query.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

/// Record store and retention settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Records older than this many days are removed by the sweep.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Seconds between retention sweeps; 0 disables the background sweep.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

/// Analysis snapshot and summary settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Default lookback window for the analysis entry point.
    #[serde(default = "default_lookback_minutes")]
    pub lookback_minutes: u32,
    /// Most records pulled into one analysis snapshot.
    #[serde(default = "default_analysis_max_records")]
    pub max_records: usize,
    /// Seconds between periodic summary publishes; 0 disables them.
    #[serde(default = "default_summary_interval")]
    pub summary_interval_secs: u64,
}

impl LogwardenConfig {
    /// Load configuration from a TOML file at the given path.
    ///
    /// If the file does not exist, returns the default configuration.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: LogwardenConfig = toml::from_str(&contents)?;
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            retention_days: default_retention_days(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            lookback_minutes: default_lookback_minutes(),
            max_records: default_analysis_max_records(),
            summary_interval_secs: default_summary_interval(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:8420".to_string()
}

fn default_page_size() -> usize {
    200
}

fn default_max_page_size() -> usize {
    1000
}

fn default_store_path() -> PathBuf {
    PathBuf::from("logwarden.db")
}

fn default_retention_days() -> u32 {
    30
}

fn default_sweep_interval() -> u64 {
    3600
}

fn default_lookback_minutes() -> u32 {
    60
}

fn default_analysis_max_records() -> usize {
    1000
}

fn default_summary_interval() -> u64 {
    300
}
