use crate::config::WebhookUrl;
use crate::message::WebhookMessage;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors that can occur while delivering a message.
///
/// None of the variants carry the webhook URL.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Failed to build webhook client: {0}")]
    Client(String),

    #[error("Webhook request failed: {0}")]
    Request(String),

    #[error("Webhook rejected the message with HTTP {status}")]
    Rejected { status: u16 },
}

/// Destination for notification messages
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn deliver(&self, message: &WebhookMessage) -> Result<(), DeliveryError>;
}

/// Incoming-webhook client (Slack or any endpoint accepting `{"text": ...}`)
pub struct SlackWebhook {
    client: Client,
    url: WebhookUrl,
}

impl SlackWebhook {
    pub fn new(url: WebhookUrl, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Client(e.without_url().to_string()))?;

        Ok(Self { client, url })
    }
}

#[async_trait]
impl MessageSink for SlackWebhook {
    #[instrument(skip_all)]
    async fn deliver(&self, message: &WebhookMessage) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.url.expose())
            .json(message)
            .send()
            .await
            .map_err(|e| DeliveryError::Request(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
            });
        }

        debug!(status = status.as_u16(), "Webhook accepted message");
        Ok(())
    }
}
