//! Feed Digest Store
//!
//! Storage plumbing shared by the two pipeline stages. The producer writes
//! rendered reports through an [`ObjectStore`]; the object store emits a
//! storage-create event; the notifier turns that event into a
//! [`SignedAccessLink`] through a [`LinkSigner`]. The stages never talk to
//! each other directly, only through the types defined here.
//!
//! ## Architecture
//!
//! ```text
//! report-producer           S3 Bucket                 storage-notifier
//! ┌──────────────┐         ┌──────────────┐         ┌──────────────┐
//! │ Publisher    │──put───▶│ reports/     │──event─▶│ Prefix       │
//! └──────────────┘         │   {stamp}.*  │         │ Filter       │
//!                          └──────────────┘         └──────────────┘
//!                                                          │
//!                                                          ▼
//!                                                   ┌──────────────┐
//!                                                   │ Link Signer  │
//!                                                   └──────────────┘
//! ```

pub mod clock;
pub mod config;
pub mod event;
pub mod key;
pub mod memory;
pub mod object_store;
pub mod presign;
pub mod s3;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::S3Config;
pub use event::{decode_object_key, parse_notification, EventError, StorageEvent};
pub use key::{matches_prefix, StorageObjectKey};
pub use memory::{MemoryObjectStore, StoredObject};
pub use object_store::{ObjectStore, PutReceipt, StoreError};
pub use presign::{LinkSigner, SignedAccessLink, MAX_LINK_EXPIRY};
pub use s3::{build_client, S3LinkSigner, S3ObjectStore};
