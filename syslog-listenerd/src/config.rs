use std::path::{Path, PathBuf};
use serde::Deserialize;
use anyhow::{Context, Result};
use shared::protocol::{DEFAULT_SYSLOG_PORT, MAX_UDP_PAYLOAD};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListenerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Receive buffer size. The default holds any UDP payload; a smaller value
    /// truncates longer datagrams (logged as a warning)
    #[serde(default = "default_max_datagram_size")]
    pub max_datagram_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,
    #[serde(default = "default_api_listen")]
    pub listen: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Fallback filter level when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_listen() -> String {
    format!("0.0.0.0:{}", DEFAULT_SYSLOG_PORT)
}

fn default_max_datagram_size() -> usize {
    MAX_UDP_PAYLOAD
}

fn default_db_path() -> PathBuf {
    PathBuf::from("/var/lib/syslog-listener/logs.db")
}

fn default_api_enabled() -> bool {
    true
}

fn default_api_listen() -> String {
    "127.0.0.1:8054".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_datagram_size: default_max_datagram_size(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_api_enabled(),
            listen: default_api_listen(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        anyhow::ensure!(
            config.listener.max_datagram_size > 0,
            "listener.max_datagram_size must be positive"
        );
        Ok(config)
    }
}
