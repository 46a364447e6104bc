//! Remote object store abstraction
//!
//! The engine only needs four calls from a store: paginated listing, head,
//! put and batch delete. [`S3Store`] talks to S3-compatible services;
//! [`MemoryStore`] keeps everything in process.

mod memory;
#[cfg(feature = "cloud")]
mod s3;

pub use memory::MemoryStore;
#[cfg(feature = "cloud")]
pub use s3::S3Store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::RemoteObject;

/// Largest page a listing call may return (S3's own cap)
pub const MAX_LIST_KEYS: usize = 1000;

/// Largest number of keys one batch delete may carry
pub const MAX_DELETE_KEYS: usize = 1000;

/// One page of a listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<RemoteObject>,
    /// Token to pass back for the next page
    pub next_token: Option<String>,
    /// More pages remain
    pub is_truncated: bool,
}

/// Object metadata returned by a head call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub fingerprint: Option<String>,
}

/// Result for one key of a batch delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub key: String,
    /// `None` when the key was removed
    pub error: Option<String>,
}

impl DeleteOutcome {
    pub fn deleted(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            error: None,
        }
    }

    pub fn failed(key: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            error: Some(error.into()),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.error.is_none()
    }
}

/// Object store capability shared by all workers of a run
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List one page of keys under `prefix`, resuming from `continuation_token`
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage>;

    /// Fetch metadata for a single key
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMeta>;

    /// Store `data` at `key`, returning the new fingerprint if the store reports one
    async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<Option<String>>;

    /// Remove up to [`MAX_DELETE_KEYS`] keys in one call.
    ///
    /// A transport failure fails the whole call; per-key failures are
    /// reported in the returned outcomes.
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<Vec<DeleteOutcome>>;
}

/// MD5-based fingerprint in the quoted form S3 uses for single-part uploads
pub fn md5_fingerprint(data: &[u8]) -> String {
    use md5::{Digest, Md5};
    format!("\"{}\"", hex::encode(Md5::digest(data)))
}
