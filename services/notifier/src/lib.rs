//! Feed Digest Notifier
//!
//! Runs when the object store reports a newly written object. Objects under
//! the report prefix are announced on a messaging webhook with a
//! time-limited download link; everything else is skipped.
//!
//! ## Components
//!
//! - **Notifier**: Filters events, signs links and drives delivery
//! - **Message**: Builds the webhook payload from the event and link
//! - **Webhook**: Posts the payload without ever exposing its URL

pub mod config;
pub mod message;
pub mod notifier;
pub mod webhook;

pub use config::{ConfigError, NotifierConfig, WebhookUrl};
pub use message::{link_message, link_unavailable_message, WebhookMessage};
pub use notifier::{NotifierError, NotifyOutcome, SkipReason, StorageNotifier};
pub use webhook::{DeliveryError, MessageSink, SlackWebhook};
