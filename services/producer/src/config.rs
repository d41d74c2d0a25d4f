//! Configuration for the report producer.
//!
//! Values are resolved once at startup from, in increasing precedence:
//! built-in defaults, `config/producer.*`, `/etc/feed-digest/producer.*`, and
//! `PRODUCER__*` environment variables (`PRODUCER__STORAGE__BUCKET` maps to
//! `storage.bucket`).

use crate::renderer::ReportFormat;
use crate::schedule::Cadence;
use chrono::{FixedOffset, Offset, Utc};
use digest_store::S3Config;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors that can occur during configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to load configuration: {0}")]
    LoadError(String),
}

/// Main configuration for the report producer
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProducerConfig {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Feed source configuration
    #[serde(default)]
    pub feed: FeedConfig,
    /// Translation service configuration
    #[serde(default)]
    pub translation: TranslationConfig,
    /// Report rendering and naming
    #[serde(default)]
    pub report: ReportConfig,
    /// Reporting cadence
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// S3 configuration
    #[serde(default)]
    pub storage: S3Config,
    /// Per-run limits
    #[serde(default)]
    pub run: RunConfig,
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

/// Feed source configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Syndication feed URL
    #[serde(default = "default_feed_url")]
    pub url: String,
    /// User agent sent with the feed request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Request timeout in seconds
    #[serde(default = "default_feed_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Largest accepted feed body in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Accept plain `http://` feed URLs (local testing only)
    #[serde(default)]
    pub allow_insecure_http: bool,
}

/// Translation service configuration
#[derive(Clone, Deserialize)]
pub struct TranslationConfig {
    /// Translation endpoint; translation is disabled when unset
    #[serde(default)]
    pub endpoint: Option<String>,
    /// API key sent with each request
    #[serde(default)]
    pub api_key: Option<String>,
    /// Source language code; the service detects it when unset
    #[serde(default = "default_source_language")]
    pub source_language: Option<String>,
    /// Target language code
    #[serde(default = "default_target_language")]
    pub target_language: String,
    /// Longest text sent in one request, in characters
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    /// Entries translated concurrently
    #[serde(default = "default_translation_concurrency")]
    pub concurrency: usize,
    /// Request timeout in seconds
    #[serde(default = "default_translation_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Time allowed for translating one report, in seconds; fields still
    /// pending afterwards keep their source text
    #[serde(default = "default_translation_budget_secs")]
    pub budget_secs: u64,
}

/// Report rendering and naming
#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    /// Key prefix reports are written under
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Report heading
    #[serde(default = "default_report_title")]
    pub title: String,
    /// Output format (html or markdown)
    #[serde(default)]
    pub format: ReportFormat,
    /// UTC offset, in hours, used for dates, periods and key stamps
    #[serde(default)]
    pub display_utc_offset_hours: i32,
}

/// Reporting cadence
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ScheduleConfig {
    /// How often the substrate triggers a run (daily or weekly)
    #[serde(default)]
    pub cadence: Cadence,
}

/// Per-run limits
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Wall-clock ceiling for one run, in seconds
    #[serde(default = "default_run_timeout_secs")]
    pub timeout_secs: u64,
}

// Default value functions
fn default_service_name() -> String {
    "report-producer".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_feed_url() -> String {
    "https://aws.amazon.com/new/feed/".to_string()
}

fn default_user_agent() -> String {
    "feed-digest/0.1".to_string()
}

fn default_feed_timeout_secs() -> u64 {
    20
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024 // 10MB
}

fn default_source_language() -> Option<String> {
    Some("en".to_string())
}

fn default_target_language() -> String {
    "ja".to_string()
}

fn default_max_chars() -> usize {
    5000
}

fn default_translation_concurrency() -> usize {
    4
}

fn default_translation_timeout_secs() -> u64 {
    10
}

fn default_translation_budget_secs() -> u64 {
    30
}

fn default_key_prefix() -> String {
    "reports/".to_string()
}

fn default_report_title() -> String {
    "Feed digest".to_string()
}

fn default_run_timeout_secs() -> u64 {
    60
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: default_feed_url(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_feed_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
            allow_insecure_http: false,
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            source_language: default_source_language(),
            target_language: default_target_language(),
            max_chars: default_max_chars(),
            concurrency: default_translation_concurrency(),
            request_timeout_secs: default_translation_timeout_secs(),
            budget_secs: default_translation_budget_secs(),
        }
    }
}

impl fmt::Debug for TranslationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslationConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("source_language", &self.source_language)
            .field("target_language", &self.target_language)
            .field("max_chars", &self.max_chars)
            .field("concurrency", &self.concurrency)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("budget_secs", &self.budget_secs)
            .finish()
    }
}

impl TranslationConfig {
    /// Configured endpoint, treating an empty value as unset.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref().map(str::trim).filter(|e| !e.is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn budget(&self) -> Duration {
        Duration::from_secs(self.budget_secs)
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            title: default_report_title(),
            format: ReportFormat::default(),
            display_utc_offset_hours: 0,
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_run_timeout_secs(),
        }
    }
}

impl ProducerConfig {
    /// Load configuration from config files and environment
    pub fn load() -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/producer").required(false))
            .add_source(config::File::with_name("/etc/feed-digest/producer").required(false))
            .add_source(
                config::Environment::with_prefix("PRODUCER")
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

    /// Reject settings that would only fail later, after external calls.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let feed_url = self.feed.url.trim();
        if feed_url.is_empty() {
            return Err(ConfigError::MissingRequired("feed.url".to_string()));
        }
        let parsed = Url::parse(feed_url).map_err(|e| ConfigError::InvalidValue {
            key: "feed.url".to_string(),
            message: e.to_string(),
        })?;
        match parsed.scheme() {
            "https" => {}
            "http" if self.feed.allow_insecure_http => {}
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "feed.url".to_string(),
                    message: format!("scheme {} is not allowed, use https", other),
                })
            }
        }

        if self.storage.bucket().is_none() {
            return Err(ConfigError::MissingRequired("storage.bucket".to_string()));
        }

        if let Some(endpoint) = self.translation.endpoint() {
            Url::parse(endpoint).map_err(|e| ConfigError::InvalidValue {
                key: "translation.endpoint".to_string(),
                message: e.to_string(),
            })?;
        }
        if self.translation.target_language.trim().is_empty() {
            return Err(ConfigError::MissingRequired(
                "translation.target_language".to_string(),
            ));
        }
        if self.translation.max_chars == 0 {
            return Err(ConfigError::InvalidValue {
                key: "translation.max_chars".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if self.translation.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "translation.concurrency".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        if !(-23..=23).contains(&self.report.display_utc_offset_hours) {
            return Err(ConfigError::InvalidValue {
                key: "report.display_utc_offset_hours".to_string(),
                message: "must be between -23 and 23".to_string(),
            });
        }

        if self.run.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "run.timeout_secs".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if self.translation.budget_secs == 0
            || self.translation.budget_secs >= self.run.timeout_secs
        {
            return Err(ConfigError::InvalidValue {
                key: "translation.budget_secs".to_string(),
                message: "must be greater than 0 and less than run.timeout_secs".to_string(),
            });
        }

        Ok(())
    }

    /// Get the run ceiling as Duration
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run.timeout_secs)
    }

    /// Offset used for report dates and key stamps
    pub fn display_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.report.display_utc_offset_hours * 3600)
            .unwrap_or_else(|| Utc.fix())
    }
}
