//! Configuration management for crash-monitor

use crate::error::{DashboardError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment override for `source.url`
pub const URL_ENV: &str = "CRASH_MONITOR_URL";
/// Environment override for `source.api_key`
pub const KEY_ENV: &str = "CRASH_MONITOR_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Record store connection
    pub source: SourceConfig,
    /// Buffer, polling and presentation tuning
    pub dashboard: DashboardConfig,
    /// CSV export
    pub export: ExportConfig,
}

/// Which hosted backend to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Supabase,
    Firebase,
}

impl Backend {
    /// Whether new-record toasts are shown when the config leaves it unset.
    /// Only the streaming feed announces inserts by default.
    pub fn default_notifications(self) -> bool {
        matches!(self, Backend::Firebase)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub backend: Backend,
    /// Project URL, e.g. `https://<ref>.supabase.co` or `https://<db>.firebaseio.com`
    pub url: String,
    /// Anon key (Supabase) or database secret / ID token (Firebase)
    pub api_key: String,
    /// Table name (Supabase) or child path (Firebase)
    pub table: String,
    /// HTTP request timeout in seconds
    pub timeout_secs: u64,
    /// Delay before the live feed reconnects
    pub reconnect_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Maximum records held in memory
    pub buffer_capacity: usize,
    /// Fallback poll interval in seconds
    pub poll_interval_secs: u64,
    /// Records fetched per fallback poll
    pub poll_limit: usize,
    /// Rows shown in the table
    pub table_rows: usize,
    /// How long a freshly ingested row stays highlighted
    pub highlight_ms: u64,
    /// How long a new-record toast stays up
    pub toast_ms: u64,
    /// Show a toast per live record (unset = backend default)
    pub notify_new_records: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory CSV files are written to
    pub directory: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Supabase,
            url: String::new(),
            api_key: String::new(),
            table: "crash_values".to_string(),
            timeout_secs: 15,
            reconnect_delay_secs: 3,
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 1000,
            poll_interval_secs: 5,
            poll_limit: 10,
            table_rows: 50,
            highlight_ms: 2000,
            toast_ms: 3000,
            notify_new_records: None,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
        }
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

impl DashboardConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

impl Config {
    /// Get default configuration file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("crash-monitor")
            .join("config.toml")
    }

    /// Default log file for the interactive dashboard
    pub fn log_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("crash-monitor")
            .join("crash-monitor.log")
    }

    /// Load configuration from file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(PathBuf::from).unwrap_or_else(Self::default_path);

        let mut config = if path.exists() {
            debug!("Loading config from {}", path.display());
            let content = std::fs::read_to_string(&path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(URL_ENV) {
            debug!("Using source url from {}", URL_ENV);
            self.source.url = url;
        }
        if let Ok(key) = std::env::var(KEY_ENV) {
            debug!("Using api key from {}", KEY_ENV);
            self.source.api_key = key;
        }
    }

    /// Check the fields the record sources cannot work without
    pub fn validate(&self) -> Result<()> {
        if self.source.url.trim().is_empty() {
            return Err(DashboardError::Config(format!(
                "source.url is not set (config file or {})",
                URL_ENV
            )));
        }
        if !self.source.url.starts_with("http://") && !self.source.url.starts_with("https://") {
            return Err(DashboardError::Config(format!(
                "source.url must be an http(s) URL, got {}",
                self.source.url
            )));
        }
        if self.source.table.trim().is_empty() {
            return Err(DashboardError::Config("source.table is empty".to_string()));
        }
        if self.dashboard.buffer_capacity == 0 {
            return Err(DashboardError::Config(
                "dashboard.buffer_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether live inserts raise a toast
    pub fn notify_new_records(&self) -> bool {
        self.dashboard
            .notify_new_records
            .unwrap_or_else(|| self.source.backend.default_notifications())
    }

    /// Render as TOML for `crash-monitor config`
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| DashboardError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.source.backend, Backend::Supabase);
        assert_eq!(config.source.table, "crash_values");
        assert_eq!(config.dashboard.buffer_capacity, 1000);
        assert_eq!(config.dashboard.poll_interval_secs, 5);
        assert_eq!(config.dashboard.poll_limit, 10);
        assert_eq!(config.dashboard.table_rows, 50);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [source]
            backend = "firebase"
            url = "https://demo.firebaseio.com"
            "#,
        )
        .unwrap();
        assert_eq!(config.source.backend, Backend::Firebase);
        assert_eq!(config.source.table, "crash_values");
        assert_eq!(config.dashboard.toast_ms, 3000);
    }

    #[test]
    fn test_notification_default_follows_backend() {
        let mut config = Config::default();
        assert!(!config.notify_new_records());
        config.source.backend = Backend::Firebase;
        assert!(config.notify_new_records());
        config.dashboard.notify_new_records = Some(false);
        assert!(!config.notify_new_records());
    }

    #[test]
    fn test_validate_rejects_missing_url() {
        let config = Config::default();
        assert!(matches!(config.validate(), Err(DashboardError::Config(_))));

        let mut config = Config::default();
        config.source.url = "ftp://nope".to_string();
        assert!(config.validate().is_err());

        config.source.url = "https://demo.supabase.co".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let text = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.dashboard.highlight_ms, config.dashboard.highlight_ms);
    }
}
