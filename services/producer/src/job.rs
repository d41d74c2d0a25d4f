//! One report run: fetch, filter to the period, translate, render, publish.
//!
//! Nothing is written unless every earlier stage completed, and a run that
//! hits its time ceiling is abandoned before anything reaches storage.

use crate::config::ProducerConfig;
use crate::entry::FeedEntry;
use crate::fetcher::{FeedSource, FetchError};
use crate::publisher::{PublishError, ReportPublisher};
use crate::renderer::ReportRenderer;
use crate::schedule::{local_date, Cadence, ReportPeriod};
use crate::translator::EntryTranslator;
use chrono::FixedOffset;
use digest_store::{Clock, ObjectStore, PutReceipt};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// Errors that end a run without a report
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Feed fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Report publish failed: {0}")]
    Publish(#[from] PublishError),

    #[error("Report run exceeded its {0:?} time limit")]
    Timeout(Duration),
}

/// What a successful run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// A report was written
    Published {
        receipt: PutReceipt,
        period: ReportPeriod,
        entries: usize,
        untranslated: usize,
    },
    /// No entry fell inside the period; nothing was written
    NothingToReport { period: ReportPeriod, fetched: usize },
}

pub struct ReportJob {
    source: Arc<dyn FeedSource>,
    translator: EntryTranslator,
    renderer: ReportRenderer,
    publisher: ReportPublisher,
    clock: Arc<dyn Clock>,
    cadence: Cadence,
    offset: FixedOffset,
    timeout: Duration,
}

impl ReportJob {
    pub fn from_config(
        config: &ProducerConfig,
        source: Arc<dyn FeedSource>,
        translator: EntryTranslator,
        store: Arc<dyn ObjectStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let offset = config.display_offset();
        let renderer = ReportRenderer::new(
            config.report.format,
            config.report.title.clone(),
            config.translation.target_language.clone(),
            offset,
        );
        let publisher = ReportPublisher::new(store, config.report.key_prefix.clone(), offset);

        Self {
            source,
            translator,
            renderer,
            publisher,
            clock,
            cadence: config.schedule.cadence,
            offset,
            timeout: config.run_timeout(),
        }
    }

    /// Run once. Each call is an independent invocation.
    pub async fn run(&self) -> Result<RunOutcome, RunError> {
        let invocation_id = Uuid::new_v4();
        let span = info_span!("report_run", %invocation_id);
        counter!("producer.runs").increment(1);

        let result = match tokio::time::timeout(self.timeout, self.execute())
            .instrument(span.clone())
            .await
        {
            Ok(result) => result,
            Err(_) => Err(RunError::Timeout(self.timeout)),
        };

        if let Err(ref e) = result {
            span.in_scope(|| error!(error = %e, "Report run failed"));
            counter!("producer.runs.failed").increment(1);
        }

        result
    }

    async fn execute(&self) -> Result<RunOutcome, RunError> {
        let generated_at = self.clock.now();
        let run_date = local_date(generated_at, self.offset);
        let period = ReportPeriod::preceding(self.cadence, run_date);

        info!(source = %self.source.describe(), %period, "Fetching feed");
        let fetched = self.source.fetch_entries().await?;
        let fetched_count = fetched.len();

        let in_period: Vec<FeedEntry> = fetched
            .into_iter()
            .filter(|entry| {
                entry
                    .published_at
                    .map(|at| period.contains(local_date(at, self.offset)))
                    .unwrap_or(true)
            })
            .collect();

        info!(
            fetched = fetched_count,
            in_period = in_period.len(),
            excluded = fetched_count - in_period.len(),
            "Entries selected for report period"
        );

        if in_period.is_empty() {
            info!(%period, "No entries in report period; nothing published");
            return Ok(RunOutcome::NothingToReport {
                period,
                fetched: fetched_count,
            });
        }

        let entries = self.translator.translate_entries(in_period).await;
        let report = self.renderer.render(generated_at, period, entries);
        let untranslated = report.untranslated_count();
        let receipt = self.publisher.publish(&report).await?;

        info!(
            s3_key = %receipt.key,
            entries = report.entries.len(),
            untranslated,
            "Report run complete"
        );

        Ok(RunOutcome::Published {
            receipt,
            period,
            entries: report.entries.len(),
            untranslated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::StaticFeed;
    use crate::test_support::RSS_FIXTURE;
    use crate::translator::{MockTranslator, TranslationError, TranslationRequest, Translator};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use digest_store::{ManualClock, MemoryObjectStore};

    const KEY: &str = "reports/2024-06-03T00:00:00.html";

    fn config() -> ProducerConfig {
        let mut config = ProducerConfig::default();
        config.storage.bucket = Some("reports-bucket".to_string());
        config
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap()))
    }

    fn job(
        config: &ProducerConfig,
        source: Arc<dyn FeedSource>,
        translator: EntryTranslator,
        store: Arc<MemoryObjectStore>,
    ) -> ReportJob {
        ReportJob::from_config(config, source, translator, store, clock())
    }

    fn body(store: &MemoryObjectStore) -> String {
        String::from_utf8(store.get(KEY).unwrap().body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_run_publishes_entries_in_period() {
        let store = Arc::new(MemoryObjectStore::new("reports-bucket"));
        let job = job(
            &config(),
            Arc::new(StaticFeed::new(RSS_FIXTURE)),
            EntryTranslator::disabled(),
            store.clone(),
        );

        let outcome = job.run().await.unwrap();

        match outcome {
            RunOutcome::Published {
                receipt,
                period,
                entries,
                untranslated,
            } => {
                assert_eq!(receipt.key, KEY);
                assert_eq!(period.to_string(), "2024-05-27 to 2024-06-02");
                assert_eq!(entries, 2);
                assert_eq!(untranslated, 0);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let html = body(&store);
        assert_eq!(html.matches("<li class=\"entry").count(), 2);
        assert!(html.contains("Amazon S3 adds conditional writes"));
        assert!(!html.contains("old instance family"));
        assert_eq!(store.take_events().len(), 1);
    }

    #[tokio::test]
    async fn test_translation_failure_on_one_entry_still_publishes() {
        let mut mock = MockTranslator::new();
        mock.expect_translate().returning(|request| {
            if request.text.contains("Lambda") {
                Err(TranslationError::Request("connection reset".to_string()))
            } else {
                Ok(format!("訳 {}", request.text))
            }
        });
        let config = config();
        let translator = EntryTranslator::new(Arc::new(mock), &config.translation);
        let store = Arc::new(MemoryObjectStore::new("reports-bucket"));
        let job = job(&config, Arc::new(StaticFeed::new(RSS_FIXTURE)), translator, store.clone());

        let outcome = job.run().await.unwrap();
        assert!(matches!(outcome, RunOutcome::Published { untranslated: 1, .. }));

        let html = body(&store);
        assert_eq!(html.matches("<li class=\"entry").count(), 2);
        assert_eq!(html.matches("(untranslated)").count(), 1);
        assert!(html.contains("訳 Amazon S3 adds conditional writes"));
        assert!(html.contains("AWS Lambda supports a new runtime"));
    }

    #[tokio::test]
    async fn test_empty_period_publishes_nothing() {
        let store = Arc::new(MemoryObjectStore::new("reports-bucket"));
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap()));
        let job = ReportJob::from_config(
            &config(),
            Arc::new(StaticFeed::new(RSS_FIXTURE)),
            EntryTranslator::disabled(),
            store.clone(),
            clock,
        );

        let outcome = job.run().await.unwrap();
        assert!(matches!(outcome, RunOutcome::NothingToReport { fetched: 3, .. }));
        assert_eq!(store.put_calls(), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_writes_nothing() {
        let store = Arc::new(MemoryObjectStore::new("reports-bucket"));
        let job = job(
            &config(),
            Arc::new(StaticFeed::new("<rss><channel>")),
            EntryTranslator::disabled(),
            store.clone(),
        );

        assert!(matches!(job.run().await, Err(RunError::Fetch(_))));
        assert_eq!(store.put_calls(), 0);
    }

    #[tokio::test]
    async fn test_publish_failure_is_fatal() {
        let store = Arc::new(MemoryObjectStore::new("reports-bucket"));
        store.set_fail_puts(true);
        let job = job(
            &config(),
            Arc::new(StaticFeed::new(RSS_FIXTURE)),
            EntryTranslator::disabled(),
            store.clone(),
        );

        assert!(matches!(job.run().await, Err(RunError::Publish(_))));
        assert!(store.is_empty());
        assert!(store.take_events().is_empty());
    }

    #[tokio::test]
    async fn test_rerun_same_day_overwrites() {
        let store = Arc::new(MemoryObjectStore::new("reports-bucket"));
        let job = job(
            &config(),
            Arc::new(StaticFeed::new(RSS_FIXTURE)),
            EntryTranslator::disabled(),
            store.clone(),
        );

        job.run().await.unwrap();
        job.run().await.unwrap();

        assert_eq!(store.keys(), vec![KEY.to_string()]);
        assert_eq!(store.put_calls(), 2);
    }

    struct StalledFeed;

    #[async_trait]
    impl FeedSource for StalledFeed {
        async fn fetch_entries(&self) -> Result<Vec<FeedEntry>, FetchError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        }

        fn describe(&self) -> String {
            "stalled".to_string()
        }
    }

    struct ManyEntriesFeed(usize);

    #[async_trait]
    impl FeedSource for ManyEntriesFeed {
        async fn fetch_entries(&self) -> Result<Vec<FeedEntry>, FetchError> {
            Ok((0..self.0)
                .map(|i| FeedEntry {
                    title: format!("Announcement {}", i),
                    link: None,
                    published_at: None,
                    summary_raw: Some("Details".to_string()),
                })
                .collect())
        }

        fn describe(&self) -> String {
            "many".to_string()
        }
    }

    struct TimingOutTranslator;

    #[async_trait]
    impl Translator for TimingOutTranslator {
        async fn translate(&self, _: &TranslationRequest) -> Result<String, TranslationError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Err(TranslationError::Request("operation timed out".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_degraded_translation_still_publishes() {
        let config = config();
        let translator = EntryTranslator::new(Arc::new(TimingOutTranslator), &config.translation);
        let store = Arc::new(MemoryObjectStore::new("reports-bucket"));
        let job = job(&config, Arc::new(ManyEntriesFeed(30)), translator, store.clone());

        let outcome = job.run().await.unwrap();

        assert!(matches!(
            outcome,
            RunOutcome::Published {
                entries: 30,
                untranslated: 30,
                ..
            }
        ));
        assert_eq!(store.put_calls(), 1);
        assert_eq!(body(&store).matches("(untranslated)").count(), 30);
    }

    #[tokio::test]
    async fn test_run_is_abandoned_at_time_limit() {
        let store = Arc::new(MemoryObjectStore::new("reports-bucket"));
        let mut job = job(
            &config(),
            Arc::new(StalledFeed),
            EntryTranslator::disabled(),
            store.clone(),
        );
        job.timeout = Duration::from_millis(50);

        assert!(matches!(job.run().await, Err(RunError::Timeout(_))));
        assert_eq!(store.put_calls(), 0);
    }
}
