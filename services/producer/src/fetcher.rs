//! Feed retrieval and parsing.
//!
//! Supports RSS 2.0 and Atom documents. Entry titles and summaries are
//! reduced to plain text so downstream stages never see feed markup.

use crate::config::FeedConfig;
use crate::entry::FeedEntry;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};
use url::Url;

/// Errors that can occur while fetching the feed
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid feed URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("Feed request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("Feed request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Feed body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("Failed to parse feed: {0}")]
    Parse(String),

    #[error("Feed contains no entries")]
    NoEntries,
}

/// Something that yields the current feed entries
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_entries(&self) -> Result<Vec<FeedEntry>, FetchError>;

    /// Where the entries come from, for logs
    fn describe(&self) -> String;
}

/// Fetches the feed over HTTPS
pub struct FeedFetcher {
    client: Client,
    url: Url,
    max_body_bytes: usize,
}

impl FeedFetcher {
    pub fn new(config: &FeedConfig) -> Result<Self, FetchError> {
        let url = parse_feed_url(&config.url, config.allow_insecure_http)?;
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            client,
            url,
            max_body_bytes: config.max_body_bytes,
        })
    }
}

#[async_trait]
impl FeedSource for FeedFetcher {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch_entries(&self) -> Result<Vec<FeedEntry>, FetchError> {
        let url = self.url.to_string();

        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| FetchError::Request {
                url: url.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }

        if let Some(length) = response.content_length() {
            if length > self.max_body_bytes as u64 {
                return Err(FetchError::TooLarge {
                    limit: self.max_body_bytes,
                });
            }
        }

        let body = response.bytes().await.map_err(|e| FetchError::Request {
            url: url.clone(),
            message: e.to_string(),
        })?;
        if body.len() > self.max_body_bytes {
            return Err(FetchError::TooLarge {
                limit: self.max_body_bytes,
            });
        }

        debug!(size_bytes = body.len(), "Feed downloaded");

        let entries = parse_feed(&body)?;
        info!(entries = entries.len(), "Feed fetched");
        Ok(entries)
    }

    fn describe(&self) -> String {
        self.url.to_string()
    }
}

/// A feed document held in memory, for fixtures and local runs
pub struct StaticFeed {
    document: String,
}

impl StaticFeed {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
        }
    }
}

#[async_trait]
impl FeedSource for StaticFeed {
    async fn fetch_entries(&self) -> Result<Vec<FeedEntry>, FetchError> {
        parse_feed(self.document.as_bytes())
    }

    fn describe(&self) -> String {
        "static feed".to_string()
    }
}

fn parse_feed_url(raw: &str, allow_insecure_http: bool) -> Result<Url, FetchError> {
    let url = Url::parse(raw.trim()).map_err(|e| FetchError::InvalidUrl {
        url: raw.to_string(),
        message: e.to_string(),
    })?;

    match url.scheme() {
        "https" => Ok(url),
        "http" if allow_insecure_http => Ok(url),
        other => Err(FetchError::InvalidUrl {
            url: raw.to_string(),
            message: format!("scheme {} is not allowed", other),
        }),
    }
}

/// Parse an RSS or Atom document into entries, preserving feed order.
pub fn parse_feed(document: &[u8]) -> Result<Vec<FeedEntry>, FetchError> {
    let feed = feed_rs::parser::parse(document).map_err(|e| FetchError::Parse(e.to_string()))?;

    if feed.entries.is_empty() {
        return Err(FetchError::NoEntries);
    }

    Ok(feed.entries.into_iter().map(entry_from_model).collect())
}

fn entry_from_model(entry: feed_rs::model::Entry) -> FeedEntry {
    let title = entry
        .title
        .map(|t| plain_text(&t.content))
        .unwrap_or_default();

    let link = entry
        .links
        .first()
        .map(|l| l.href.trim().to_string())
        .filter(|href| !href.is_empty());

    let summary_raw = entry
        .summary
        .map(|s| s.content)
        .or_else(|| entry.content.and_then(|c| c.body))
        .map(|s| plain_text(&s))
        .filter(|s| !s.is_empty());

    FeedEntry {
        title,
        link,
        published_at: entry.published.or(entry.updated),
        summary_raw,
    }
}

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Strip tags, decode entities and collapse whitespace.
pub fn plain_text(s: &str) -> String {
    // Tags go first so escaped markup in the text survives as text
    let stripped = RE_TAGS.replace_all(s, " ");
    let decoded = html_escape::decode_html_entities(&stripped);
    RE_WS.replace_all(&decoded, " ").trim().to_string()
}
