//! Configuration for the reminder daemon.
//!
//! Loaded from a TOML file; every section and field falls back to a
//! sensible default so a missing or partial file still yields a working
//! daemon.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ReminderError, Result};

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Public base URL used to build nudge/confirm action links.
    pub base_url: BaseUrl,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Global default webhook endpoints.
    pub webhooks: WebhookConfig,
    /// Periodic job cadences.
    pub scheduler: SchedulerConfig,
    /// Archived-reminder retention.
    pub retention: RetentionConfig,
}

/// Newtype so the base URL gets a default without a custom top-level impl.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BaseUrl(pub String);

impl Default for BaseUrl {
    fn default() -> Self {
        Self("http://localhost:8080".to_owned())
    }
}

/// Storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database file (None = platform data dir).
    pub db_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { db_path: None }
    }
}

impl StorageConfig {
    /// Resolve the database path, creating a platform default when unset.
    pub fn resolved_db_path(&self) -> PathBuf {
        if let Some(path) = &self.db_path {
            return path.clone();
        }
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("remindd")
            .join("reminders.db")
    }
}

/// Global default webhook endpoints. An empty URL disables that service;
/// per-reminder overrides take precedence over these.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Home Assistant webhook URL.
    pub home_assistant: String,
    /// ntfy topic URL.
    pub ntfy: String,
    /// Gotify message URL.
    pub gotify: String,
    /// Per-request delivery timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            home_assistant: String::new(),
            ntfy: String::new(),
            gotify: String::new(),
            timeout_secs: 10,
        }
    }
}

/// Cadences for the three periodic jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between alert-check ticks.
    pub alert_tick_secs: u64,
    /// Seconds between auto-archive sweeps.
    pub archive_sweep_secs: u64,
    /// UTC hour (0-23) at which the daily history purge runs.
    pub purge_hour_utc: u8,
    /// Delay before the initial alert check + sweep after startup.
    pub startup_delay_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            alert_tick_secs: 60,
            archive_sweep_secs: 3600,
            purge_hour_utc: 3,
            startup_delay_secs: 5,
        }
    }
}

/// Archived-reminder retention settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Process-level default retention window: `"<n>m"`, `"<n>y"`, or
    /// `"off"`. Overridden by the `history_cleanup_interval` setting in
    /// the settings store.
    pub default_window: String,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            default_window: "6m".to_owned(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file yields the defaults; a malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        toml::from_str(&contents)
            .map_err(|e| ReminderError::Config(format!("cannot parse {}: {e}", path.display())))
    }

    /// Default config file path (`~/.config/remindd/config.toml`).
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("remindd")
            .join("config.toml")
    }
}
