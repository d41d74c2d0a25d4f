use chrono::{DateTime, Utc};
use serde::Serialize;

/// One item of the syndication feed, with markup already stripped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedEntry {
    /// Entry title; empty when the feed has none
    pub title: String,
    /// Link to the full announcement
    pub link: Option<String>,
    /// Publication time (falls back to the update time)
    pub published_at: Option<DateTime<Utc>>,
    /// Summary text in the source language
    pub summary_raw: Option<String>,
}

/// Result of translating one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TranslationOutcome {
    /// Text was translated
    Translated { text: String },
    /// Translation failed; the source text is used instead
    Fallback { reason: String },
    /// Nothing was sent (empty field or translation disabled)
    Skipped,
}

impl TranslationOutcome {
    pub fn translated(&self) -> Option<&str> {
        match self {
            TranslationOutcome::Translated { text } => Some(text),
            _ => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, TranslationOutcome::Fallback { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryTranslation {
    pub title: TranslationOutcome,
    pub summary: TranslationOutcome,
}

impl EntryTranslation {
    pub fn skipped() -> Self {
        Self {
            title: TranslationOutcome::Skipped,
            summary: TranslationOutcome::Skipped,
        }
    }

    /// Whether either field fell back for `reason`.
    pub fn has_fallback_reason(&self, reason: &str) -> bool {
        [&self.title, &self.summary].into_iter().any(|outcome| {
            matches!(outcome, TranslationOutcome::Fallback { reason: r } if r == reason)
        })
    }
}

/// A feed entry together with its translation outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestEntry {
    pub entry: FeedEntry,
    pub translation: EntryTranslation,
}

impl DigestEntry {
    pub fn untranslated(entry: FeedEntry) -> Self {
        Self {
            entry,
            translation: EntryTranslation::skipped(),
        }
    }

    /// Translated title, or the source title.
    pub fn display_title(&self) -> &str {
        self.translation
            .title
            .translated()
            .unwrap_or(&self.entry.title)
    }

    /// Translated summary, or the source summary.
    pub fn display_summary(&self) -> Option<&str> {
        self.translation
            .summary
            .translated()
            .or(self.entry.summary_raw.as_deref())
    }

    pub fn summary_translated(&self) -> Option<&str> {
        self.translation.summary.translated()
    }

    /// Whether any field fell back to source text after a failed translation.
    pub fn is_untranslated(&self) -> bool {
        self.translation.title.is_fallback() || self.translation.summary.is_fallback()
    }
}
