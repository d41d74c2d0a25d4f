//! Feed Digest Producer
//!
//! Scheduled job that turns a syndication feed into a translated report and
//! writes it to object storage. Each invocation is independent and produces
//! at most one report.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Feed         │────▶│ Translator   │────▶│ Renderer     │────▶│ Publisher    │
//! │ Fetcher      │     │ (per entry)  │     │ (html / md)  │     │ (S3 put)     │
//! └──────────────┘     └──────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! ## Components
//!
//! - **Fetcher**: Retrieves and parses the RSS/Atom feed
//! - **Translator**: Translates titles and summaries, falling back per field
//! - **Renderer**: Builds the report document for the period
//! - **Publisher**: Writes the report under a key derived from the run date

pub mod config;
pub mod entry;
pub mod fetcher;
pub mod job;
pub mod publisher;
pub mod renderer;
pub mod schedule;
pub mod translator;

pub use config::{ConfigError, ProducerConfig};
pub use entry::{DigestEntry, EntryTranslation, FeedEntry, TranslationOutcome};
pub use fetcher::{parse_feed, FeedFetcher, FeedSource, FetchError, StaticFeed};
pub use job::{ReportJob, RunError, RunOutcome};
pub use publisher::{PublishError, ReportPublisher};
pub use renderer::{Report, ReportFormat, ReportRenderer};
pub use schedule::{Cadence, ReportPeriod};
pub use translator::{
    EntryTranslator, HttpTranslator, TranslationError, TranslationRequest, Translator,
};
