//! Storage notifier.
//!
//! Each storage-create event is filtered by key prefix (and bucket, when one
//! is configured), turned into a signed link and announced on the webhook.
//! The notifier never reads the object; everything it reports comes from
//! the event itself.

use crate::config::NotifierConfig;
use crate::message::{link_message, link_unavailable_message};
use crate::webhook::{DeliveryError, MessageSink, SlackWebhook};
use chrono::FixedOffset;
use digest_store::{
    matches_prefix, parse_notification, Clock, EventError, LinkSigner, SignedAccessLink,
    StorageEvent,
};
use metrics::counter;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, info_span, instrument, warn, Instrument};
use uuid::Uuid;

/// Errors that fail a notifier invocation
#[derive(Error, Debug)]
pub enum NotifierError {
    #[error(transparent)]
    Event(#[from] EventError),

    #[error("Webhook delivery failed for {key}: {source}")]
    Delivery {
        key: String,
        #[source]
        source: DeliveryError,
    },

    #[error("Notification exceeded its {0:?} time limit")]
    Timeout(Duration),
}

/// Why an event was not announced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The key is outside the configured prefix
    PrefixMismatch,
    /// The event names a bucket other than the configured one
    ForeignBucket,
}

/// Terminal state of one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Skipped { reason: SkipReason },
    /// No webhook is configured; nothing was signed or sent
    DeliveryDisabled,
    /// Message delivered; `link` is `None` when signing failed
    Notified { link: Option<SignedAccessLink> },
}

pub struct StorageNotifier {
    key_prefix: String,
    bucket: Option<String>,
    signer: Arc<dyn LinkSigner>,
    sink: Option<Arc<dyn MessageSink>>,
    clock: Arc<dyn Clock>,
    link_expiry: Duration,
    offset: FixedOffset,
    timeout: Duration,
    delivery_attempts: AtomicUsize,
}

impl StorageNotifier {
    pub fn new(
        config: &NotifierConfig,
        signer: Arc<dyn LinkSigner>,
        sink: Option<Arc<dyn MessageSink>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            key_prefix: config.notifier.key_prefix.trim().to_string(),
            bucket: config.storage.bucket().map(str::to_string),
            signer,
            sink,
            clock,
            link_expiry: config.notifier.link_expiry(),
            offset: config.notifier.display_offset(),
            timeout: config.notifier.timeout(),
            delivery_attempts: AtomicUsize::new(0),
        }
    }

    /// Notifier posting to the configured webhook, if any.
    pub fn from_config(
        config: &NotifierConfig,
        signer: Arc<dyn LinkSigner>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, DeliveryError> {
        let sink = match config.notifier.webhook_url() {
            Some(url) => Some(Arc::new(SlackWebhook::new(
                url.clone(),
                config.notifier.request_timeout(),
            )?) as Arc<dyn MessageSink>),
            None => None,
        };

        Ok(Self::new(config, signer, sink, clock))
    }

    /// Webhook posts attempted so far.
    pub fn delivery_attempts(&self) -> usize {
        self.delivery_attempts.load(Ordering::SeqCst)
    }

    fn skip_reason(&self, event: &StorageEvent) -> Option<SkipReason> {
        if let Some(ref bucket) = self.bucket {
            if &event.bucket != bucket {
                return Some(SkipReason::ForeignBucket);
            }
        }
        if !matches_prefix(&event.object_key, &self.key_prefix) {
            return Some(SkipReason::PrefixMismatch);
        }
        None
    }

    /// Process one storage-create event.
    #[instrument(skip(self, event), fields(bucket = %event.bucket, s3_key = %event.object_key))]
    pub async fn handle(&self, event: &StorageEvent) -> Result<NotifyOutcome, NotifierError> {
        if let Some(reason) = self.skip_reason(event) {
            info!(?reason, prefix = %self.key_prefix, "Skipping storage event");
            counter!("notifier.events.skipped").increment(1);
            return Ok(NotifyOutcome::Skipped { reason });
        }

        let Some(sink) = self.sink.as_ref() else {
            info!("No webhook configured; notification disabled");
            return Ok(NotifyOutcome::DeliveryDisabled);
        };

        let issued_at = self.clock.now();
        let (message, link) = match self
            .signer
            .sign(&event.bucket, &event.object_key, self.link_expiry, issued_at)
            .await
        {
            Ok(link) => (
                link_message(event, &link, self.link_expiry, self.offset),
                Some(link),
            ),
            Err(e) => {
                warn!(error = %e, "Failed to sign access link; sending notice without link");
                (link_unavailable_message(event, self.offset), None)
            }
        };

        self.delivery_attempts.fetch_add(1, Ordering::SeqCst);
        counter!("notifier.deliveries").increment(1);

        if let Err(source) = sink.deliver(&message).await {
            counter!("notifier.deliveries.failed").increment(1);
            return Err(NotifierError::Delivery {
                key: event.object_key.clone(),
                source,
            });
        }

        info!(
            expires_at = ?link.as_ref().map(|l| l.expires_at),
            "Notification delivered"
        );

        Ok(NotifyOutcome::Notified { link })
    }

    /// Process every event, then fail if any delivery failed.
    pub async fn handle_batch(
        &self,
        events: &[StorageEvent],
    ) -> Result<Vec<NotifyOutcome>, NotifierError> {
        let mut outcomes = Vec::with_capacity(events.len());
        let mut first_error = None;
        let mut failed = 0usize;

        for event in events {
            match self.handle(event).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!(error = %e, s3_key = %event.object_key, "Notification failed");
                    failed += 1;
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => {
                warn!(failed, total = events.len(), "Some notifications failed");
                Err(e)
            }
            None => Ok(outcomes),
        }
    }

    /// Process a raw S3 event notification within the invocation time limit.
    pub async fn handle_notification(
        &self,
        payload: &[u8],
    ) -> Result<Vec<NotifyOutcome>, NotifierError> {
        let invocation_id = Uuid::new_v4();
        let span = info_span!("notification", %invocation_id);
        let received_at = self.clock.now();

        let work = async {
            let events = parse_notification(payload, received_at)?;
            if events.is_empty() {
                info!("Payload has no storage-create records");
            }
            self.handle_batch(&events).await
        };

        match tokio::time::timeout(self.timeout, work).instrument(span).await {
            Ok(result) => result,
            Err(_) => Err(NotifierError::Timeout(self.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebhookUrl;
    use crate::message::WebhookMessage;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use digest_store::{ManualClock, S3Config, S3LinkSigner, StoreError};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        messages: Mutex<Vec<WebhookMessage>>,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        async fn deliver(&self, message: &WebhookMessage) -> Result<(), DeliveryError> {
            if let Some(marker) = self.fail_on {
                if message.text.contains(marker) {
                    return Err(DeliveryError::Rejected { status: 500 });
                }
            }
            self.messages.lock().push(message.clone());
            Ok(())
        }
    }

    struct FailingSigner;

    #[async_trait]
    impl LinkSigner for FailingSigner {
        async fn sign(
            &self,
            bucket: &str,
            key: &str,
            _expires_in: Duration,
            _issued_at: DateTime<Utc>,
        ) -> Result<SignedAccessLink, StoreError> {
            Err(StoreError::SignFailed {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: "no credentials".to_string(),
            })
        }
    }

    struct StalledSink;

    #[async_trait]
    impl MessageSink for StalledSink {
        async fn deliver(&self, _message: &WebhookMessage) -> Result<(), DeliveryError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 5).unwrap()
    }

    fn signer() -> Arc<dyn LinkSigner> {
        Arc::new(S3LinkSigner::from_static_credentials(
            &S3Config::default(),
            "AKIDEXAMPLE",
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
        ))
    }

    fn event(bucket: &str, key: &str) -> StorageEvent {
        StorageEvent {
            bucket: bucket.to_string(),
            object_key: key.to_string(),
            event_time: now(),
            size: Some(4096),
            etag: None,
        }
    }

    fn notifier(config: &NotifierConfig, sink: Option<Arc<dyn MessageSink>>) -> StorageNotifier {
        StorageNotifier::new(config, signer(), sink, Arc::new(ManualClock::new(now())))
    }

    #[tokio::test]
    async fn test_prefix_filter() {
        let sink = Arc::new(RecordingSink::default());
        let notifier = notifier(&NotifierConfig::default(), Some(sink.clone()));

        let skipped = notifier
            .handle(&event("reports-bucket", "other/file.txt"))
            .await
            .unwrap();
        assert_eq!(
            skipped,
            NotifyOutcome::Skipped {
                reason: SkipReason::PrefixMismatch
            }
        );
        assert_eq!(notifier.delivery_attempts(), 0);

        let notified = notifier
            .handle(&event("reports-bucket", "reports/2024-01-01.html"))
            .await
            .unwrap();
        assert!(matches!(notified, NotifyOutcome::Notified { link: Some(_) }));
        assert_eq!(notifier.delivery_attempts(), 1);
        assert_eq!(sink.messages.lock().len(), 1);

        let mut config = NotifierConfig::default();
        config.notifier.key_prefix = "reports/weekly-".to_string();
        let weekly = StorageNotifier::new(
            &config,
            signer(),
            Some(sink.clone()),
            Arc::new(ManualClock::new(now())),
        );
        let notified = weekly
            .handle(&event("reports-bucket", "reports/weekly-2024-06-03.html"))
            .await
            .unwrap();
        assert!(matches!(notified, NotifyOutcome::Notified { .. }));
    }

    #[tokio::test]
    async fn test_link_expires_after_configured_expiry() {
        let mut config = NotifierConfig::default();
        config.notifier.link_expiry_secs = 3600;
        let clock = Arc::new(ManualClock::new(now()));
        let notifier = StorageNotifier::new(
            &config,
            signer(),
            Some(Arc::new(RecordingSink::default())),
            clock.clone(),
        );

        let outcome = notifier
            .handle(&event("reports-bucket", "reports/a.html"))
            .await
            .unwrap();
        let NotifyOutcome::Notified { link: Some(link) } = outcome else {
            panic!("expected a signed link");
        };

        assert!(link.url.contains("X-Amz-Expires=3600"));
        assert!(!link.is_expired(clock.as_ref()));
        clock.advance(chrono::Duration::seconds(3600));
        assert!(link.is_expired(clock.as_ref()));
    }

    #[tokio::test]
    async fn test_missing_webhook_disables_delivery() {
        let notifier = notifier(&NotifierConfig::default(), None);

        let outcome = notifier
            .handle(&event("reports-bucket", "reports/a.html"))
            .await
            .unwrap();

        assert_eq!(outcome, NotifyOutcome::DeliveryDisabled);
        assert_eq!(notifier.delivery_attempts(), 0);
    }

    #[tokio::test]
    async fn test_blank_webhook_from_config_disables_delivery() {
        let mut config = NotifierConfig::default();
        config.notifier.webhook_url = Some(WebhookUrl::new("  "));
        let notifier =
            StorageNotifier::from_config(&config, signer(), Arc::new(ManualClock::new(now())))
                .unwrap();

        let outcome = notifier
            .handle(&event("reports-bucket", "reports/a.html"))
            .await
            .unwrap();
        assert_eq!(outcome, NotifyOutcome::DeliveryDisabled);
    }

    #[tokio::test]
    async fn test_foreign_bucket_is_skipped() {
        let mut config = NotifierConfig::default();
        config.storage.bucket = Some("reports-bucket".to_string());
        let sink = Arc::new(RecordingSink::default());
        let notifier = notifier(&config, Some(sink.clone()));

        let outcome = notifier
            .handle(&event("someone-elses-bucket", "reports/a.html"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            NotifyOutcome::Skipped {
                reason: SkipReason::ForeignBucket
            }
        );
        assert!(sink.messages.lock().is_empty());
    }

    #[tokio::test]
    async fn test_signing_failure_still_notifies() {
        let sink = Arc::new(RecordingSink::default());
        let notifier = StorageNotifier::new(
            &NotifierConfig::default(),
            Arc::new(FailingSigner),
            Some(sink.clone()),
            Arc::new(ManualClock::new(now())),
        );

        let outcome = notifier
            .handle(&event("reports-bucket", "reports/a.html"))
            .await
            .unwrap();

        assert_eq!(outcome, NotifyOutcome::Notified { link: None });
        let messages = sink.messages.lock();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].text.contains("could not be generated"));
    }

    #[tokio::test]
    async fn test_batch_processes_every_record_before_failing() {
        let sink = Arc::new(RecordingSink {
            fail_on: Some("first.html"),
            ..RecordingSink::default()
        });
        let notifier = notifier(&NotifierConfig::default(), Some(sink.clone()));

        let events = vec![
            event("reports-bucket", "reports/first.html"),
            event("reports-bucket", "reports/second.html"),
        ];
        let result = notifier.handle_batch(&events).await;

        assert!(matches!(
            result,
            Err(NotifierError::Delivery { ref key, .. }) if key == "reports/first.html"
        ));
        assert_eq!(notifier.delivery_attempts(), 2);
        assert_eq!(sink.messages.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_handle_notification_payload() {
        let sink = Arc::new(RecordingSink::default());
        let notifier = notifier(&NotifierConfig::default(), Some(sink.clone()));
        let payload = r#"{"Records":[
            {"eventName":"ObjectCreated:Put","eventTime":"2024-06-03T00:00:05Z",
             "s3":{"bucket":{"name":"reports-bucket"},"object":{"key":"reports/2024-06-03T00%3A00%3A00.html","size":10}}},
            {"eventName":"ObjectCreated:Put","eventTime":"2024-06-03T00:00:05Z",
             "s3":{"bucket":{"name":"reports-bucket"},"object":{"key":"logs/run.txt","size":10}}}
        ]}"#;

        let outcomes = notifier.handle_notification(payload.as_bytes()).await.unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes[0], NotifyOutcome::Notified { .. }));
        assert!(matches!(outcomes[1], NotifyOutcome::Skipped { .. }));
        assert!(sink.messages.lock()[0]
            .text
            .contains("2024-06-03T00:00:00.html"));
    }

    #[tokio::test]
    async fn test_malformed_payload_fails() {
        let notifier = notifier(&NotifierConfig::default(), None);
        assert!(matches!(
            notifier.handle_notification(b"{").await,
            Err(NotifierError::Event(_))
        ));
    }

    #[tokio::test]
    async fn test_invocation_time_limit() {
        let mut config = NotifierConfig::default();
        config.notifier.timeout_secs = 1;
        let notifier = notifier(&config, Some(Arc::new(StalledSink)));
        let payload = r#"{"Records":[{"eventName":"ObjectCreated:Put",
            "s3":{"bucket":{"name":"b"},"object":{"key":"reports/a.html"}}}]}"#;

        assert!(matches!(
            notifier.handle_notification(payload.as_bytes()).await,
            Err(NotifierError::Timeout(_))
        ));
    }
}
