use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur while talking to the object store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to put s3://{bucket}/{key}: {message}")]
    PutFailed {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("Failed to sign link for s3://{bucket}/{key}: {message}")]
    SignFailed {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("Invalid link expiry: {0}")]
    InvalidExpiry(String),
}

/// Acknowledgement of a completed put
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutReceipt {
    pub bucket: String,
    pub key: String,
    /// Body size in bytes
    pub size: u64,
    /// Entity tag reported by the store, without surrounding quotes
    pub etag: Option<String>,
}

/// Write side of the object store.
///
/// `put` must be atomic per key: readers see either the previous object or
/// the complete new one, never a partial body.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket this store writes to
    fn bucket(&self) -> &str;

    /// Store `body` under `key`, replacing any existing object
    async fn put(&self, key: &str, body: Bytes, content_type: &str)
        -> Result<PutReceipt, StoreError>;
}

/// Strip the quotes S3 wraps around entity tags.
pub(crate) fn clean_etag(raw: &str) -> String {
    raw.trim_matches('"').to_string()
}
