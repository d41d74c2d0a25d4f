use crate::renderer::Report;
use crate::schedule::local_date;
use chrono::FixedOffset;
use digest_store::{ObjectStore, PutReceipt, StorageObjectKey, StoreError};
use metrics::counter;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument};

/// Errors that can occur while publishing a report
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Failed to publish report to {key}: {source}")]
    Store {
        key: String,
        #[source]
        source: StoreError,
    },
}

/// Writes rendered reports to the object store.
///
/// The key is derived from the run date alone, so rerunning on the same day
/// replaces the earlier report instead of adding a second one.
pub struct ReportPublisher {
    store: Arc<dyn ObjectStore>,
    key_prefix: String,
    offset: FixedOffset,
}

impl ReportPublisher {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        key_prefix: impl Into<String>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
            offset,
        }
    }

    pub fn object_key(&self, report: &Report) -> StorageObjectKey {
        StorageObjectKey::for_report(
            &self.key_prefix,
            local_date(report.generated_at, self.offset),
            report.format.extension(),
        )
    }

    #[instrument(skip(self, report), fields(bucket = %self.store.bucket()))]
    pub async fn publish(&self, report: &Report) -> Result<PutReceipt, PublishError> {
        let key = self.object_key(report);

        let receipt = self
            .store
            .put(
                key.as_str(),
                report.rendered_bytes.clone(),
                report.content_type(),
            )
            .await
            .map_err(|source| PublishError::Store {
                key: key.to_string(),
                source,
            })?;

        info!(
            s3_key = %key,
            size_bytes = receipt.size,
            entries = report.entries.len(),
            "Report published"
        );
        counter!("producer.reports.published").increment(1);

        Ok(receipt)
    }
}
