//! In-process object store.
//!
//! Behaves like a bucket with create notifications turned on: every
//! successful put is recorded and queued as a [`StorageEvent`], which a test
//! harness (standing in for the deployment substrate) drains and hands to
//! the notifier.

use crate::clock::{Clock, SystemClock};
use crate::event::StorageEvent;
use crate::object_store::{ObjectStore, PutReceipt, StoreError};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Object held by [`MemoryObjectStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: String,
    pub etag: String,
    pub last_modified: DateTime<Utc>,
}

pub struct MemoryObjectStore {
    bucket: String,
    clock: Arc<dyn Clock>,
    objects: Mutex<BTreeMap<String, StoredObject>>,
    events: Mutex<Vec<StorageEvent>>,
    fail_puts: AtomicBool,
    put_calls: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self::with_clock(bucket, Arc::new(SystemClock))
    }

    pub fn with_clock(bucket: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            bucket: bucket.into(),
            clock,
            objects: Mutex::new(BTreeMap::new()),
            events: Mutex::new(Vec::new()),
            fail_puts: AtomicBool::new(false),
            put_calls: AtomicUsize::new(0),
        }
    }

    /// Make subsequent puts fail as if the bucket denied writes.
    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }

    /// Number of put attempts, successful or not.
    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    /// Remove and return the queued storage-create events.
    pub fn take_events(&self) -> Vec<StorageEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

fn content_etag(body: &[u8]) -> String {
    let digest = Sha256::digest(body);
    hex::encode(&digest[..16])
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<PutReceipt, StoreError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StoreError::PutFailed {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                message: "access denied".to_string(),
            });
        }

        let now = self.clock.now();
        let etag = content_etag(&body);
        let size = body.len() as u64;

        self.objects.lock().insert(
            key.to_string(),
            StoredObject {
                body,
                content_type: content_type.to_string(),
                etag: etag.clone(),
                last_modified: now,
            },
        );

        self.events.lock().push(StorageEvent {
            bucket: self.bucket.clone(),
            object_key: key.to_string(),
            event_time: now,
            size: Some(size),
            etag: Some(etag.clone()),
        });

        Ok(PutReceipt {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            size,
            etag: Some(etag),
        })
    }
}
