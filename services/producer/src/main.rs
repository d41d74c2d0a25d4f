use anyhow::{Context, Result};
use digest_producer::{EntryTranslator, FeedFetcher, ProducerConfig, ReportJob, RunOutcome};
use digest_store::{build_client, S3ObjectStore, SystemClock};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = ProducerConfig::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    config.validate().context("Invalid configuration")?;

    info!(
        service = %config.service.name,
        feed = %config.feed.url,
        cadence = ?config.schedule.cadence,
        "Starting report producer"
    );

    let bucket = config
        .storage
        .bucket()
        .context("storage.bucket is not set")?
        .to_string();
    let client = build_client(&config.storage).await;
    let store = Arc::new(S3ObjectStore::new(client, bucket));

    let source =
        Arc::new(FeedFetcher::new(&config.feed).context("Failed to initialize feed fetcher")?);
    let translator = EntryTranslator::from_config(&config.translation)
        .context("Failed to initialize translator")?;
    info!(
        enabled = translator.is_enabled(),
        target_language = %config.translation.target_language,
        budget_secs = config.translation.budget_secs,
        "Translation configured"
    );

    let job = ReportJob::from_config(&config, source, translator, store, Arc::new(SystemClock));

    match job.run().await.context("Report run failed")? {
        RunOutcome::Published {
            receipt,
            entries,
            untranslated,
            ..
        } => {
            info!(
                bucket = %receipt.bucket,
                s3_key = %receipt.key,
                entries,
                untranslated,
                "Report producer finished"
            );
        }
        RunOutcome::NothingToReport { period, fetched } => {
            info!(%period, fetched, "Report producer finished without a report");
        }
    }

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}
