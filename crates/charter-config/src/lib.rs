//! Configuration management for charter.
//!
//! Loads configuration from TOML files. Every section and field has a
//! default, so a partial file (or none at all) is valid. The backend URLs
//! can be overridden with `CHART_API_URL` and `CHART_WS_URL`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding `api.base_url`.
pub const API_URL_ENV: &str = "CHART_API_URL";
/// Environment variable overriding `api.ws_url`.
pub const WS_URL_ENV: &str = "CHART_WS_URL";

/// Shortest reconnect delay accepted from a config file.
pub const MIN_RECONNECT_DELAY: Duration = Duration::from_millis(100);

const DEFAULT_RECONNECT_DELAY_SECS: f64 = 5.0;
const DEFAULT_MAX_RECONNECT_DELAY_SECS: f64 = 60.0;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub api: ApiConfig,
    pub history: HistoryConfig,
    pub stream: StreamConfig,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from default locations.
    ///
    /// Searches in order:
    /// 1. `./config.toml`
    /// 2. `~/.config/charter/config.toml`
    ///
    /// Returns default config if no file found. A file that exists but
    /// fails to parse is reported and skipped.
    pub fn load_default() -> Self {
        for path in Self::search_paths() {
            if !path.exists() {
                continue;
            }
            match Self::load(&path) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    return config;
                }
                Err(e) => log::warn!("Ignoring {}: {}", path.display(), e),
            }
        }

        log::debug!("No config file found, using defaults");
        Self::default()
    }

    /// Candidate config file locations, in search order.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![Self::default_path()];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("charter").join("config.toml"));
        }
        paths
    }

    /// Save configuration to a file path.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    /// Apply `CHART_API_URL` / `CHART_WS_URL` from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply URL overrides from an arbitrary variable lookup. Empty values
    /// are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = present(API_URL_ENV) {
            log::debug!("{} overrides api.base_url", API_URL_ENV);
            self.api.base_url = url;
        }
        if let Some(url) = present(WS_URL_ENV) {
            log::debug!("{} overrides api.ws_url", WS_URL_ENV);
            self.api.ws_url = url;
        }
        self
    }
}

/// General application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Instrument selected on startup.
    pub default_symbol: String,
    /// Timeframe label selected on startup.
    pub default_timeframe: String,
    /// Instruments offered for selection.
    pub symbols: Vec<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_symbol: "BTC/USD".to_string(),
            default_timeframe: "1m".to_string(),
            symbols: ["BTC/USD", "SPY", "QQQ", "DIA"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Backend API configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// REST base URL.
    pub base_url: String,
    /// Live stream URL.
    pub ws_url: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Retries after a failed request.
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds. Doubles per retry.
    pub retry_backoff_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            ws_url: "ws://localhost:8080/ws".to_string(),
            request_timeout_secs: 30,
            max_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// History paging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Bars requested per page (at most 1000).
    pub page_size: u32,
    /// Backfill when the viewport is within this many bars of the oldest bar.
    pub backfill_threshold: i64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            page_size: 1000,
            backfill_threshold: 20,
        }
    }
}

/// Live stream configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Delay before the first reconnect attempt.
    pub reconnect_delay_secs: f64,
    /// Growth per consecutive failed attempt. 1.0 keeps the delay fixed.
    pub backoff_multiplier: f64,
    /// Upper bound for the reconnect delay.
    pub max_reconnect_delay_secs: f64,
    /// Give up after this many consecutive attempts. Unset retries forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_reconnect_attempts: Option<u32>,
    /// Keepalive ping interval.
    pub ping_interval_secs: u64,
    /// Buffered events per channel.
    pub channel_buffer_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: DEFAULT_RECONNECT_DELAY_SECS,
            backoff_multiplier: 1.0,
            max_reconnect_delay_secs: DEFAULT_MAX_RECONNECT_DELAY_SECS,
            max_reconnect_attempts: None,
            ping_interval_secs: 30,
            channel_buffer_size: 1000,
        }
    }
}

impl StreamConfig {
    pub fn reconnect_delay(&self) -> Duration {
        reconnect_secs(
            "reconnect_delay_secs",
            self.reconnect_delay_secs,
            DEFAULT_RECONNECT_DELAY_SECS,
        )
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        reconnect_secs(
            "max_reconnect_delay_secs",
            self.max_reconnect_delay_secs,
            DEFAULT_MAX_RECONNECT_DELAY_SECS,
        )
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }
}

/// Non-finite or negative values fall back to `default`. Anything shorter
/// than `MIN_RECONNECT_DELAY` is raised to it.
fn reconnect_secs(field: &str, value: f64, default: f64) -> Duration {
    let delay = Duration::try_from_secs_f64(value).unwrap_or_else(|_| {
        log::warn!("Invalid stream.{} {}, using {}", field, value, default);
        Duration::from_secs_f64(default)
    });
    delay.max(MIN_RECONNECT_DELAY)
}
