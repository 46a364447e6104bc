//! In-process object store

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{md5_fingerprint, DeleteOutcome, ListPage, ObjectMeta, ObjectStore, MAX_LIST_KEYS};
use crate::error::{Result, SyncError};
use crate::types::RemoteObject;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    last_modified: DateTime<Utc>,
    fingerprint: String,
}

/// Object store kept in memory.
///
/// Supports failure injection per key, a configurable page size and
/// per-call latency, and counts every mutating call.
#[derive(Debug)]
pub struct MemoryStore {
    buckets: Mutex<BTreeMap<String, BTreeMap<String, StoredObject>>>,
    page_size: usize,
    latency: Option<Duration>,
    failing_puts: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<String>>,
    list_calls: AtomicUsize,
    put_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(BTreeMap::new()),
            page_size: MAX_LIST_KEYS,
            latency: None,
            failing_puts: Mutex::new(HashSet::new()),
            failing_deletes: Mutex::new(HashSet::new()),
            list_calls: AtomicUsize::new(0),
            put_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Cap listing pages below the caller's `max_keys`
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Sleep this long inside every put and delete
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Seed an object with an explicit modification time
    pub fn insert(&self, bucket: &str, key: &str, data: &[u8], last_modified: DateTime<Utc>) {
        self.buckets.lock().entry(bucket.to_string()).or_default().insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                last_modified,
                fingerprint: md5_fingerprint(data),
            },
        );
    }

    /// Make every put to `key` fail
    pub fn fail_put(&self, key: &str) {
        self.failing_puts.lock().insert(key.to_string());
    }

    /// Make every delete of `key` fail
    pub fn fail_delete(&self, key: &str) {
        self.failing_deletes.lock().insert(key.to_string());
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.buckets
            .lock()
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|obj| obj.data.clone())
    }

    /// All keys in `bucket`, sorted
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .lock()
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Highest number of puts/deletes observed running at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> InFlightGuard<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        InFlightGuard(&self.in_flight)
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let limit = max_keys.min(self.page_size).max(1);

        let buckets = self.buckets.lock();
        let Some(objects) = buckets.get(bucket) else {
            return Ok(ListPage::default());
        };

        let mut matching = objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| continuation_token.map_or(true, |token| key.as_str() > token));

        let page: Vec<RemoteObject> = matching
            .by_ref()
            .take(limit)
            .map(|(key, obj)| {
                RemoteObject::new(
                    key.clone(),
                    obj.data.len() as u64,
                    obj.last_modified,
                    Some(obj.fingerprint.clone()),
                )
            })
            .collect();
        let is_truncated = matching.next().is_some();

        Ok(ListPage {
            next_token: if is_truncated {
                page.last().map(|obj| obj.key.clone())
            } else {
                None
            },
            objects: page,
            is_truncated,
        })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMeta> {
        self.buckets
            .lock()
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|obj| ObjectMeta {
                size: obj.data.len() as u64,
                last_modified: obj.last_modified,
                fingerprint: Some(obj.fingerprint.clone()),
            })
            .ok_or_else(|| SyncError::CloudStorage(format!("no such key: {}/{}", bucket, key)))
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<Option<String>> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.enter().await;

        if self.failing_puts.lock().contains(key) {
            return Err(SyncError::CloudStorage(format!(
                "injected put failure for {}",
                key
            )));
        }

        let fingerprint = md5_fingerprint(&data);
        self.buckets.lock().entry(bucket.to_string()).or_default().insert(
            key.to_string(),
            StoredObject {
                data,
                last_modified: Utc::now(),
                fingerprint: fingerprint.clone(),
            },
        );
        Ok(Some(fingerprint))
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<Vec<DeleteOutcome>> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.enter().await;

        let failing = self.failing_deletes.lock().clone();
        let mut buckets = self.buckets.lock();
        let objects = buckets.entry(bucket.to_string()).or_default();

        Ok(keys
            .iter()
            .map(|key| {
                if failing.contains(key) {
                    DeleteOutcome::failed(key.clone(), "injected delete failure")
                } else {
                    // Deleting a missing key succeeds, as in S3.
                    objects.remove(key);
                    DeleteOutcome::deleted(key.clone())
                }
            })
            .collect())
    }
}
