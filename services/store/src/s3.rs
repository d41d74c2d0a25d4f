use crate::config::S3Config;
use crate::object_store::{clean_etag, ObjectStore, PutReceipt, StoreError};
use crate::presign::{expiry_instant, LinkSigner, SignedAccessLink};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, instrument};

/// Build an S3 client from the ambient AWS credentials chain.
pub async fn build_client(config: &S3Config) -> S3Client {
    let aws_config = aws_config::defaults(BehaviorVersion::latest())
        .region(aws_config::Region::new(config.region.clone()))
        .load()
        .await;

    let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

    // Configure custom endpoint for MinIO/LocalStack
    if let Some(ref endpoint_url) = config.endpoint_url {
        s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
    }

    // Force path-style access for MinIO compatibility
    if config.force_path_style {
        s3_config_builder = s3_config_builder.force_path_style(true);
    }

    info!(
        region = %config.region,
        endpoint = ?config.endpoint_url,
        "S3 client initialized"
    );

    S3Client::from_conf(s3_config_builder.build())
}

/// Report writer backed by S3 `PutObject`
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Single-part put. S3 makes the object visible only once the whole
    /// body is stored, which is what keeps partial reports unobservable.
    #[instrument(skip(self, body), fields(bucket = %self.bucket, size_bytes = body.len()))]
    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<PutReceipt, StoreError> {
        let size = body.len() as u64;

        debug!(s3_key = %key, "Uploading object to S3");

        let output = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StoreError::PutFailed {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        Ok(PutReceipt {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            size,
            etag: output.e_tag().map(clean_etag),
        })
    }
}

/// SigV4 presigner for `GetObject` links.
///
/// Presigning is computed locally from the client's credentials; no request
/// reaches S3 and the object body is never read.
pub struct S3LinkSigner {
    client: S3Client,
}

impl S3LinkSigner {
    pub fn new(client: S3Client) -> Self {
        Self { client }
    }

    /// Signer with fixed credentials, for local stores such as MinIO and
    /// for offline signing.
    pub fn from_static_credentials(
        config: &S3Config,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        let credentials = Credentials::new(
            access_key_id,
            secret_access_key,
            None,
            None,
            "digest-static",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials);

        if let Some(ref endpoint_url) = config.endpoint_url {
            builder = builder.endpoint_url(endpoint_url);
        }
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }

        Self::new(S3Client::from_conf(builder.build()))
    }
}

#[async_trait]
impl LinkSigner for S3LinkSigner {
    #[instrument(skip(self))]
    async fn sign(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
        issued_at: DateTime<Utc>,
    ) -> Result<SignedAccessLink, StoreError> {
        let expires_at = expiry_instant(issued_at, expires_in)?;

        let presigning_config = PresigningConfig::builder()
            .start_time(SystemTime::from(issued_at))
            .expires_in(expires_in)
            .build()
            .map_err(|e| StoreError::InvalidExpiry(e.to_string()))?;

        let presigned = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .map_err(|e| StoreError::SignFailed {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        Ok(SignedAccessLink {
            url: presigned.uri().to_string(),
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn signer() -> S3LinkSigner {
        S3LinkSigner::from_static_credentials(
            &S3Config::default(),
            "AKIDEXAMPLE",
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
        )
    }

    #[tokio::test]
    async fn test_presigned_url_names_object_and_expiry() {
        let issued_at = Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap();
        let link = signer()
            .sign(
                "reports-bucket",
                "reports/weekly.html",
                Duration::from_secs(3600),
                issued_at,
            )
            .await
            .unwrap();

        assert!(link.url.contains("reports/weekly.html"));
        assert!(link.url.contains("X-Amz-Expires=3600"));
        assert!(link.url.contains("X-Amz-Signature="));
        assert_eq!(link.expires_at, issued_at + chrono::Duration::hours(1));
    }

    #[tokio::test]
    async fn test_signing_is_repeatable() {
        let issued_at = Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap();
        let signer = signer();
        let first = signer
            .sign("b", "reports/a.html", Duration::from_secs(60), issued_at)
            .await
            .unwrap();
        let second = signer
            .sign("b", "reports/a.html", Duration::from_secs(60), issued_at)
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_rejects_expiry_beyond_limit() {
        let result = signer()
            .sign(
                "b",
                "reports/a.html",
                Duration::from_secs(8 * 24 * 60 * 60),
                Utc::now(),
            )
            .await;
        assert!(matches!(result, Err(StoreError::InvalidExpiry(_))));
    }
}
