//! Storage-create events.
//!
//! The deployment substrate delivers S3 event notifications. Only the bucket,
//! key, time, size and entity tag are kept; everything else in the envelope
//! is ignored.

use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur while reading an event payload
#[derive(Error, Debug)]
pub enum EventError {
    #[error("Failed to deserialize storage event: {0}")]
    Deserialization(String),
}

/// A newly created object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEvent {
    /// Bucket the object was written to
    pub bucket: String,
    /// Decoded object key
    pub object_key: String,
    /// When the store emitted the event
    pub event_time: DateTime<Utc>,
    /// Object size in bytes, when the store reports it
    #[serde(default)]
    pub size: Option<u64>,
    /// Entity tag, when the store reports it
    #[serde(default)]
    pub etag: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Notification {
    #[serde(rename = "Records", default)]
    records: Vec<Record>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Record {
    #[serde(default)]
    event_time: Option<DateTime<Utc>>,
    #[serde(default)]
    event_name: Option<String>,
    #[serde(default)]
    s3: Option<S3Entity>,
}

#[derive(Debug, Deserialize)]
struct S3Entity {
    #[serde(default)]
    bucket: Option<BucketEntity>,
    #[serde(default)]
    object: Option<ObjectEntity>,
}

#[derive(Debug, Deserialize)]
struct BucketEntity {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectEntity {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(rename = "eTag", default)]
    e_tag: Option<String>,
}

/// Decode a key as it appears in S3 notifications: `+` stands for a space,
/// everything else is percent-encoded.
pub fn decode_object_key(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

/// Parse an S3 event notification into storage events.
///
/// Records without a bucket or key are skipped with a warning; records that
/// are not object-created events are ignored. `received_at` stands in for a
/// missing `eventTime`.
pub fn parse_notification(
    payload: &[u8],
    received_at: DateTime<Utc>,
) -> Result<Vec<StorageEvent>, EventError> {
    let notification: Notification = serde_json::from_slice(payload)
        .map_err(|e| EventError::Deserialization(e.to_string()))?;

    let mut events = Vec::with_capacity(notification.records.len());

    for record in notification.records {
        if let Some(ref name) = record.event_name {
            if !name.starts_with("ObjectCreated") {
                debug!(event_name = %name, "Ignoring non-create storage event");
                continue;
            }
        }

        let (bucket, object) = match record.s3 {
            Some(s3) => (s3.bucket.and_then(|b| b.name), s3.object),
            None => (None, None),
        };

        let (Some(bucket), Some(object)) = (bucket, object) else {
            warn!("Bucket name or object key not found in storage event record");
            continue;
        };
        let Some(raw_key) = object.key else {
            warn!(bucket = %bucket, "Object key not found in storage event record");
            continue;
        };

        events.push(StorageEvent {
            bucket,
            object_key: decode_object_key(&raw_key),
            event_time: record.event_time.unwrap_or(received_at),
            size: object.size,
            etag: object.e_tag,
        });
    }

    Ok(events)
}
