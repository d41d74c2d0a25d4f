//! Webhook message composition.
//!
//! Messages use Slack Block Kit with a plain `text` fallback, which is also
//! what generic webhook receivers read.

use chrono::FixedOffset;
use digest_store::{SignedAccessLink, StorageEvent};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

/// Body posted to the webhook
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookMessage {
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<Value>,
}

/// Message announcing a new object with a signed download link.
pub fn link_message(
    event: &StorageEvent,
    link: &SignedAccessLink,
    valid_for: Duration,
    offset: FixedOffset,
) -> WebhookMessage {
    let name = file_name(&event.object_key);
    let validity = describe_validity(valid_for);

    let mut blocks = vec![
        json!({
            "type": "header",
            "text": { "type": "plain_text", "text": format!("New report: {}", name) }
        }),
        details_block(event, offset),
        json!({
            "type": "actions",
            "elements": [{
                "type": "button",
                "text": { "type": "plain_text", "text": "Download" },
                "url": link.url,
                "style": "primary"
            }]
        }),
    ];

    if is_image(&event.object_key) {
        blocks.push(json!({
            "type": "image",
            "image_url": link.url,
            "alt_text": name
        }));
    }

    blocks.push(json!({
        "type": "context",
        "elements": [{
            "type": "mrkdwn",
            "text": format!(
                "Link valid for {} (until {})",
                validity,
                link.expires_at.with_timezone(&offset).format("%Y-%m-%d %H:%M %:z")
            )
        }]
    }));

    WebhookMessage {
        text: format!(
            "New report available: {}\n{}\nLink valid for {}.",
            name, link.url, validity
        ),
        blocks,
    }
}

/// Message sent when no link could be signed for the object.
pub fn link_unavailable_message(event: &StorageEvent, offset: FixedOffset) -> WebhookMessage {
    let name = file_name(&event.object_key);

    WebhookMessage {
        text: format!(
            "New report available: {} (s3://{}/{}). A download link could not be generated.",
            name, event.bucket, event.object_key
        ),
        blocks: vec![
            json!({
                "type": "header",
                "text": { "type": "plain_text", "text": format!("New report: {}", name) }
            }),
            details_block(event, offset),
            json!({
                "type": "context",
                "elements": [{
                    "type": "mrkdwn",
                    "text": "A download link could not be generated."
                }]
            }),
        ],
    }
}

fn details_block(event: &StorageEvent, offset: FixedOffset) -> Value {
    json!({
        "type": "section",
        "fields": [
            { "type": "mrkdwn", "text": format!("*File*\n{}", file_name(&event.object_key)) },
            { "type": "mrkdwn", "text": format!("*Location*\ns3://{}/{}", event.bucket, event.object_key) },
            { "type": "mrkdwn", "text": format!("*Size*\n{}", describe_size(event.size)) },
            {
                "type": "mrkdwn",
                "text": format!(
                    "*Created*\n{}",
                    event.event_time.with_timezone(&offset).format("%Y-%m-%d %H:%M:%S %:z")
                )
            }
        ]
    })
}

fn file_name(key: &str) -> &str {
    key.rsplit('/').next().filter(|n| !n.is_empty()).unwrap_or(key)
}

fn is_image(key: &str) -> bool {
    key.rsplit_once('.')
        .map(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn describe_size(size: Option<u64>) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;

    match size {
        None => "unknown".to_string(),
        Some(bytes) if (bytes as f64) < KB => format!("{} B", bytes),
        Some(bytes) if (bytes as f64) < MB => format!("{:.1} KB", bytes as f64 / KB),
        Some(bytes) => format!("{:.1} MB", bytes as f64 / MB),
    }
}

fn describe_validity(valid_for: Duration) -> String {
    let secs = valid_for.as_secs();
    let (count, unit) = if secs >= 3600 && secs % 3600 == 0 {
        (secs / 3600, "hour")
    } else if secs >= 60 {
        (secs / 60, "minute")
    } else {
        (secs, "second")
    };

    if count == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", count, unit)
    }
}
