use crate::clock::Clock;
use crate::object_store::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Longest expiry SigV4 presigning accepts (7 days)
pub const MAX_LINK_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Time-limited read link for a stored object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedAccessLink {
    /// The presigned URL
    pub url: String,
    /// URL expiration time
    pub expires_at: DateTime<Utc>,
}

impl SignedAccessLink {
    /// Whether the link still grants access at `at`.
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        at < self.expires_at
    }

    pub fn is_expired(&self, clock: &dyn Clock) -> bool {
        !self.is_valid_at(clock.now())
    }
}

/// Derives signed links from object identity.
///
/// Signing has no side effects on the store, so deriving a link twice for
/// the same object is always safe.
#[async_trait]
pub trait LinkSigner: Send + Sync {
    async fn sign(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
        issued_at: DateTime<Utc>,
    ) -> Result<SignedAccessLink, StoreError>;
}

/// Check an expiry against the presigning limits and return the matching
/// expiration instant.
pub(crate) fn expiry_instant(
    issued_at: DateTime<Utc>,
    expires_in: Duration,
) -> Result<DateTime<Utc>, StoreError> {
    if expires_in.is_zero() {
        return Err(StoreError::InvalidExpiry("expiry must be positive".to_string()));
    }
    if expires_in > MAX_LINK_EXPIRY {
        return Err(StoreError::InvalidExpiry(format!(
            "{}s exceeds the {}s maximum",
            expires_in.as_secs(),
            MAX_LINK_EXPIRY.as_secs()
        )));
    }
    let delta = chrono::Duration::from_std(expires_in)
        .map_err(|e| StoreError::InvalidExpiry(e.to_string()))?;
    Ok(issued_at + delta)
}
