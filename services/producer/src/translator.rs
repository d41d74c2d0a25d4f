//! Entry translation.
//!
//! Each entry's title and summary are sent to a machine-translation service.
//! A failure affects only the field it happened on: that field keeps its
//! source text and the entry is flagged as untranslated in the report.
//! Translation of a whole report shares one time budget; fields still
//! pending when it runs out fall back the same way.

use crate::config::TranslationConfig;
use crate::entry::{DigestEntry, EntryTranslation, FeedEntry, TranslationOutcome};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use metrics::counter;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

/// Fallback reason for fields cut off by the translation budget
pub const DEADLINE_REASON: &str = "translation budget exhausted";

/// Errors returned by a translation service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslationError {
    #[error("Invalid translation endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Translation request failed: {0}")]
    Request(String),

    #[error("Translation service returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Translation service error: {0}")]
    Service(String),

    #[error("Malformed translation response: {0}")]
    Malformed(String),
}

/// One text to translate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRequest {
    pub text: String,
    /// `None` lets the service detect the language
    pub source_language: Option<String>,
    pub target_language: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, request: &TranslationRequest) -> Result<String, TranslationError>;
}

#[derive(Serialize)]
struct TranslateBody<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText", default)]
    translated_text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for a LibreTranslate-compatible `/translate` endpoint
pub struct HttpTranslator {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpTranslator {
    pub fn new(endpoint: &str, config: &TranslationConfig) -> Result<Self, TranslationError> {
        let endpoint =
            Url::parse(endpoint).map_err(|e| TranslationError::InvalidEndpoint(e.to_string()))?;
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| TranslationError::Request(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
        })
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(&self, request: &TranslationRequest) -> Result<String, TranslationError> {
        let body = TranslateBody {
            q: &request.text,
            source: request.source_language.as_deref().unwrap_or("auto"),
            target: &request.target_language,
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| TranslationError::Request(e.without_url().to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TranslationError::Request(e.without_url().to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<TranslateResponse>(&text)
                .ok()
                .and_then(|r| r.error)
                .unwrap_or_else(|| text.chars().take(200).collect());
            return Err(TranslationError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: TranslateResponse = serde_json::from_str(&text)
            .map_err(|e| TranslationError::Malformed(e.to_string()))?;

        if let Some(error) = parsed.error {
            return Err(TranslationError::Service(error));
        }

        parsed
            .translated_text
            .ok_or_else(|| TranslationError::Malformed("missing translatedText".to_string()))
    }
}

/// Translates feed entries with bounded concurrency
pub struct EntryTranslator {
    translator: Option<Arc<dyn Translator>>,
    source_language: Option<String>,
    target_language: String,
    max_chars: usize,
    concurrency: usize,
    budget: Duration,
}

impl EntryTranslator {
    pub fn new(translator: Arc<dyn Translator>, config: &TranslationConfig) -> Self {
        Self {
            translator: Some(translator),
            source_language: config
                .source_language
                .clone()
                .filter(|l| !l.trim().is_empty()),
            target_language: config.target_language.clone(),
            max_chars: config.max_chars.max(1),
            concurrency: config.concurrency.max(1),
            budget: config.budget(),
        }
    }

    /// Pass-through translator; every field is reported as skipped.
    pub fn disabled() -> Self {
        Self {
            translator: None,
            source_language: None,
            target_language: String::new(),
            max_chars: 1,
            concurrency: 1,
            budget: Duration::ZERO,
        }
    }

    /// HTTP translator when an endpoint is configured, otherwise disabled.
    pub fn from_config(config: &TranslationConfig) -> Result<Self, TranslationError> {
        match config.endpoint() {
            Some(endpoint) => {
                let translator = HttpTranslator::new(endpoint, config)?;
                Ok(Self::new(Arc::new(translator), config))
            }
            None => {
                info!("No translation endpoint configured; reports keep source text");
                Ok(Self::disabled())
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.translator.is_some()
    }

    /// Translate entries, returning them in input order.
    pub async fn translate_entries(&self, entries: Vec<FeedEntry>) -> Vec<DigestEntry> {
        let Some(translator) = self.translator.as_deref() else {
            return entries.into_iter().map(DigestEntry::untranslated).collect();
        };

        let deadline = Instant::now() + self.budget;
        let mut translated: Vec<(usize, DigestEntry)> =
            stream::iter(entries.into_iter().enumerate())
                .map(|(index, entry)| async move {
                    let entry = self.translate_entry(translator, entry, deadline).await;
                    (index, entry)
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

        translated.sort_by_key(|(index, _)| *index);

        let fallbacks = translated.iter().filter(|(_, e)| e.is_untranslated()).count();
        let cut_off = translated
            .iter()
            .filter(|(_, e)| e.translation.has_fallback_reason(DEADLINE_REASON))
            .count();
        if cut_off > 0 {
            warn!(
                entries = cut_off,
                budget = ?self.budget,
                "Translation budget exhausted; remaining entries keep source text"
            );
        }
        debug!(entries = translated.len(), fallbacks, "Translation finished");

        translated.into_iter().map(|(_, entry)| entry).collect()
    }

    async fn translate_entry(
        &self,
        translator: &dyn Translator,
        entry: FeedEntry,
        deadline: Instant,
    ) -> DigestEntry {
        let title = self
            .translate_field(translator, Some(entry.title.as_str()), "title", deadline)
            .await;
        let summary = self
            .translate_field(translator, entry.summary_raw.as_deref(), "summary", deadline)
            .await;

        DigestEntry {
            entry,
            translation: EntryTranslation { title, summary },
        }
    }

    async fn translate_field(
        &self,
        translator: &dyn Translator,
        text: Option<&str>,
        field: &'static str,
        deadline: Instant,
    ) -> TranslationOutcome {
        let Some(text) = text.filter(|t| !t.trim().is_empty()) else {
            return TranslationOutcome::Skipped;
        };

        let result = if Instant::now() < deadline {
            tokio::time::timeout_at(deadline, self.translate_text(translator, text))
                .await
                .ok()
        } else {
            None
        };

        let reason = match result {
            Some(Ok(text)) => return TranslationOutcome::Translated { text },
            Some(Err(e)) => {
                warn!(error = %e, field, "Translation failed; keeping source text");
                e.to_string()
            }
            None => {
                debug!(field, "Translation budget exhausted; keeping source text");
                DEADLINE_REASON.to_string()
            }
        };

        counter!("producer.translation.fallbacks").increment(1);
        TranslationOutcome::Fallback { reason }
    }

    /// Translate `text` piecewise so no request exceeds `max_chars`.
    async fn translate_text(
        &self,
        translator: &dyn Translator,
        text: &str,
    ) -> Result<String, TranslationError> {
        let mut parts = Vec::new();
        for chunk in chunk_text(text, self.max_chars) {
            let request = TranslationRequest {
                text: chunk.to_string(),
                source_language: self.source_language.clone(),
                target_language: self.target_language.clone(),
            };
            parts.push(translator.translate(&request).await?.trim().to_string());
        }
        Ok(parts.join(" "))
    }
}

/// Split `text` into pieces of at most `max_chars` characters, breaking at
/// whitespace where possible.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<&str> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest = text.trim();

    while !rest.is_empty() {
        let Some((limit, _)) = rest.char_indices().nth(max_chars) else {
            chunks.push(rest);
            break;
        };

        let split = if rest[limit..].starts_with(char::is_whitespace) {
            limit
        } else {
            rest[..limit]
                .rfind(char::is_whitespace)
                .filter(|&i| i > 0)
                .unwrap_or(limit)
        };
        let (chunk, tail) = rest.split_at(split);
        chunks.push(chunk.trim_end());
        rest = tail.trim_start();
    }

    chunks
}
