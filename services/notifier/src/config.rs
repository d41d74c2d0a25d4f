//! Configuration for the storage notifier.
//!
//! Resolved once at startup from defaults, `config/notifier.*`,
//! `/etc/feed-digest/notifier.*` and `NOTIFIER__*` environment variables.

use chrono::{FixedOffset, Offset, Utc};
use digest_store::{S3Config, MAX_LINK_EXPIRY};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to load configuration: {0}")]
    LoadError(String),
}

/// Main configuration for the storage notifier
#[derive(Debug, Clone, Deserialize, Default)]
pub struct NotifierConfig {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Filtering, signing and delivery
    #[serde(default)]
    pub notifier: NotifierSettings,
    /// S3 configuration
    #[serde(default)]
    pub storage: S3Config,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Messaging webhook URL.
///
/// The URL itself is the credential, so it never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct WebhookUrl(String);

impl WebhookUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn expose(&self) -> &str {
        self.0.trim()
    }

    fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for WebhookUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WebhookUrl(***)")
    }
}

/// Filtering, signing and delivery settings
#[derive(Debug, Clone, Deserialize)]
pub struct NotifierSettings {
    /// Only objects under this prefix are announced
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Webhook to post to; delivery is disabled when unset
    #[serde(default)]
    pub webhook_url: Option<WebhookUrl>,
    /// Signed link lifetime in seconds
    #[serde(default = "default_link_expiry_secs")]
    pub link_expiry_secs: u64,
    /// Webhook request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// UTC offset, in hours, for times shown in messages
    #[serde(default)]
    pub display_utc_offset_hours: i32,
    /// Wall-clock ceiling for one invocation, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

// Default value functions
fn default_service_name() -> String {
    "storage-notifier".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_key_prefix() -> String {
    "reports/".to_string()
}

fn default_link_expiry_secs() -> u64 {
    86400 // 24 hours
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            webhook_url: None,
            link_expiry_secs: default_link_expiry_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            display_utc_offset_hours: 0,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl NotifierSettings {
    /// Configured webhook, treating an empty value as unset.
    pub fn webhook_url(&self) -> Option<&WebhookUrl> {
        self.webhook_url.as_ref().filter(|u| !u.is_blank())
    }

    pub fn link_expiry(&self) -> Duration {
        Duration::from_secs(self.link_expiry_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn display_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.display_utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix())
    }
}

impl NotifierConfig {
    /// Load configuration from config files and environment
    pub fn load() -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/notifier").required(false))
            .add_source(config::File::with_name("/etc/feed-digest/notifier").required(false))
            .add_source(
                config::Environment::with_prefix("NOTIFIER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::LoadError(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| ConfigError::LoadError(e.to_string()))
    }

    /// Parse configuration from a TOML document
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ConfigError::LoadError(e.to_string()))
    }

    /// Validate configuration. Messages never echo the webhook URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let settings = &self.notifier;

        if settings.link_expiry_secs == 0 || settings.link_expiry() > MAX_LINK_EXPIRY {
            return Err(ConfigError::InvalidValue {
                key: "notifier.link_expiry_secs".to_string(),
                message: format!("must be between 1 and {}", MAX_LINK_EXPIRY.as_secs()),
            });
        }

        if let Some(url) = settings.webhook_url() {
            let scheme_ok = reqwest::Url::parse(url.expose())
                .map(|u| matches!(u.scheme(), "https" | "http"))
                .unwrap_or(false);
            if !scheme_ok {
                return Err(ConfigError::InvalidValue {
                    key: "notifier.webhook_url".to_string(),
                    message: "must be an absolute http(s) URL".to_string(),
                });
            }
        }

        if !(-23..=23).contains(&settings.display_utc_offset_hours) {
            return Err(ConfigError::InvalidValue {
                key: "notifier.display_utc_offset_hours".to_string(),
                message: "must be between -23 and 23".to_string(),
            });
        }

        if settings.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "notifier.timeout_secs".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}
