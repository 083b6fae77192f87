//! Form persistence configuration
//!
//! `FormConfig` carries the options a caller hands to the persistence layer
//! when a form session opens. It can be built in code through
//! [`FormConfig::builder`] or read from TOML, where durations are spelled as
//! millisecond integers:
//!
//! ```toml
//! form_id = "onboarding-individual"
//! owner_id = "42"
//! auto_save_interval_ms = 20000
//! ttl_ms = 86400000
//! sync_endpoint = "https://deals.example.com/api/forms/sync"
//! auto_sync_on_reconnect = true
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

/// Default autosave interval
pub const DEFAULT_AUTO_SAVE_INTERVAL: Duration = Duration::from_secs(20);

/// Default record time-to-live
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Consecutive storage failures after which autosave suspends itself
pub const DEFAULT_MAX_CONSECUTIVE_SAVE_FAILURES: u32 = 3;

/// Environment variable overriding the local database path
pub const DB_PATH_ENV: &str = "FORMSTASH_DB_PATH";

/// Environment variable overriding the sync endpoint
pub const SYNC_URL_ENV: &str = "FORMSTASH_SYNC_URL";

/// Per-form configuration
#[derive(Debug, Clone, PartialEq)]
pub struct FormConfig {
    /// Form identifier, half of the record key
    pub form_id: String,
    /// Owner identity, the other half of the record key
    pub owner_id: String,
    /// Whether the autosave scheduler runs
    pub auto_save: bool,
    /// Autosave tick interval
    pub auto_save_interval: Duration,
    /// Lifetime of a persisted record
    pub ttl: Duration,
    /// Remote endpoint; `None` disables sync
    pub sync_endpoint: Option<String>,
    /// Attempt one sync when connectivity returns
    pub auto_sync_on_reconnect: bool,
    /// Autosave suspends after this many storage failures in a row
    pub max_consecutive_save_failures: u32,
}

impl FormConfig {
    /// Create a new FormConfigBuilder
    pub fn builder(form_id: impl Into<String>, owner_id: impl Into<String>) -> FormConfigBuilder {
        FormConfigBuilder {
            form_id: form_id.into(),
            owner_id: owner_id.into(),
            ..FormConfigBuilder::default()
        }
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let file: FormConfigFile =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        file.into_builder().build()
    }

    /// Read and parse a TOML configuration file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Apply `FORMSTASH_SYNC_URL` if set
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(url) = std::env::var(SYNC_URL_ENV) {
            validate_endpoint(&url)?;
            self.sync_endpoint = Some(url);
        }
        Ok(self)
    }

    /// Whether a sync endpoint is configured
    pub fn sync_enabled(&self) -> bool {
        self.sync_endpoint.is_some()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.form_id.trim().is_empty() {
            return Err(ConfigError::MissingValue("form_id"));
        }
        if self.owner_id.trim().is_empty() {
            return Err(ConfigError::MissingValue("owner_id"));
        }
        if self.auto_save_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "auto_save_interval",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.ttl.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "ttl",
                reason: "must be greater than zero".to_string(),
            });
        }
        if let Some(endpoint) = &self.sync_endpoint {
            validate_endpoint(endpoint)?;
        }
        Ok(())
    }
}

fn validate_endpoint(endpoint: &str) -> Result<(), ConfigError> {
    let url = Url::parse(endpoint).map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", endpoint, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidUrl(format!("unsupported scheme '{}'", other))),
    }
}

/// Builder for FormConfig
#[derive(Debug)]
pub struct FormConfigBuilder {
    form_id: String,
    owner_id: String,
    auto_save: bool,
    auto_save_interval: Duration,
    ttl: Duration,
    sync_endpoint: Option<String>,
    auto_sync_on_reconnect: bool,
    max_consecutive_save_failures: u32,
}

impl Default for FormConfigBuilder {
    fn default() -> Self {
        Self {
            form_id: String::new(),
            owner_id: String::new(),
            auto_save: true,
            auto_save_interval: DEFAULT_AUTO_SAVE_INTERVAL,
            ttl: DEFAULT_TTL,
            sync_endpoint: None,
            auto_sync_on_reconnect: true,
            max_consecutive_save_failures: DEFAULT_MAX_CONSECUTIVE_SAVE_FAILURES,
        }
    }
}

impl FormConfigBuilder {
    /// Enable or disable autosave
    pub fn auto_save(mut self, enabled: bool) -> Self {
        self.auto_save = enabled;
        self
    }

    /// Set the autosave interval
    pub fn auto_save_interval(mut self, interval: Duration) -> Self {
        self.auto_save_interval = interval;
        self
    }

    /// Set the record time-to-live
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the sync endpoint
    pub fn sync_endpoint(mut self, url: impl Into<String>) -> Self {
        self.sync_endpoint = Some(url.into());
        self
    }

    /// Enable or disable the reconnect sync attempt
    pub fn auto_sync_on_reconnect(mut self, enabled: bool) -> Self {
        self.auto_sync_on_reconnect = enabled;
        self
    }

    /// Set how many storage failures in a row suspend autosave
    pub fn max_consecutive_save_failures(mut self, failures: u32) -> Self {
        self.max_consecutive_save_failures = failures;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<FormConfig, ConfigError> {
        let config = FormConfig {
            form_id: self.form_id,
            owner_id: self.owner_id,
            auto_save: self.auto_save,
            auto_save_interval: self.auto_save_interval,
            ttl: self.ttl,
            sync_endpoint: self.sync_endpoint,
            auto_sync_on_reconnect: self.auto_sync_on_reconnect,
            max_consecutive_save_failures: self.max_consecutive_save_failures,
        };
        config.validate()?;
        Ok(config)
    }
}

/// On-disk shape of a form configuration
#[derive(Debug, Deserialize)]
struct FormConfigFile {
    form_id: String,
    owner_id: String,
    auto_save: Option<bool>,
    auto_save_interval_ms: Option<u64>,
    ttl_ms: Option<u64>,
    sync_endpoint: Option<String>,
    auto_sync_on_reconnect: Option<bool>,
    max_consecutive_save_failures: Option<u32>,
}

impl FormConfigFile {
    fn into_builder(self) -> FormConfigBuilder {
        let mut builder = FormConfig::builder(self.form_id, self.owner_id);
        if let Some(enabled) = self.auto_save {
            builder = builder.auto_save(enabled);
        }
        if let Some(ms) = self.auto_save_interval_ms {
            builder = builder.auto_save_interval(Duration::from_millis(ms));
        }
        if let Some(ms) = self.ttl_ms {
            builder = builder.ttl(Duration::from_millis(ms));
        }
        if let Some(url) = self.sync_endpoint {
            builder = builder.sync_endpoint(url);
        }
        if let Some(enabled) = self.auto_sync_on_reconnect {
            builder = builder.auto_sync_on_reconnect(enabled);
        }
        if let Some(failures) = self.max_consecutive_save_failures {
            builder = builder.max_consecutive_save_failures(failures);
        }
        builder
    }
}

/// Where the local SQLite store lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Database file path
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let db_path = std::env::var(DB_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::platform_db_path());
        Self { db_path }
    }
}

impl StoreConfig {
    /// Store at an explicit path
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { db_path: path.into() }
    }

    /// Platform data directory, falling back to the temp dir
    fn platform_db_path() -> PathBuf {
        let mut path = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
        path.push("formstash");
        path.push("forms.db");
        path
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("failed to read config: {0}")]
    Io(String),
}
