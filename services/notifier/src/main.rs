use anyhow::{Context, Result};
use digest_notifier::{NotifierConfig, NotifyOutcome, StorageNotifier};
use digest_store::{build_client, S3LinkSigner, SystemClock};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = NotifierConfig::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    config.validate().context("Invalid configuration")?;

    info!(
        service = %config.service.name,
        key_prefix = %config.notifier.key_prefix,
        webhook_configured = config.notifier.webhook_url().is_some(),
        "Starting storage notifier"
    );

    let payload = read_event().await?;

    let client = build_client(&config.storage).await;
    let signer = Arc::new(S3LinkSigner::new(client));
    let notifier = StorageNotifier::from_config(&config, signer, Arc::new(SystemClock))
        .context("Failed to initialize webhook client")?;

    let outcomes = notifier
        .handle_notification(&payload)
        .await
        .context("Notification failed")?;

    let notified = outcomes
        .iter()
        .filter(|o| matches!(o, NotifyOutcome::Notified { .. }))
        .count();
    info!(
        records = outcomes.len(),
        notified,
        delivery_attempts = notifier.delivery_attempts(),
        "Storage notifier finished"
    );

    Ok(())
}

/// Read the event payload from the file named by the first argument, or
/// from stdin when no argument is given.
async fn read_event() -> Result<Vec<u8>> {
    match std::env::args().nth(1) {
        Some(path) => tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read event file {}", path)),
        None => {
            let mut payload = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut payload)
                .await
                .context("Failed to read event from stdin")?;
            Ok(payload)
        }
    }
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
