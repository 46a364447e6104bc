//! S3-compatible object store (AWS S3, R2, MinIO)

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::{ByteStream, DateTime as S3DateTime};
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client as S3Client;
use chrono::{DateTime, Utc};

use super::{DeleteOutcome, ListPage, ObjectMeta, ObjectStore, MAX_DELETE_KEYS, MAX_LIST_KEYS};
use crate::error::{Result, SyncError};
use crate::types::RemoteObject;

/// S3 client wrapper
#[derive(Debug, Clone)]
pub struct S3Store {
    client: S3Client,
}

impl S3Store {
    /// Build a client from the environment (credentials, region, profile).
    ///
    /// `endpoint_url` points the client at an S3-compatible service and
    /// switches to path-style addressing.
    pub async fn from_env(endpoint_url: Option<&str>) -> Result<Self> {
        let shared = aws_config::defaults(BehaviorVersion::latest()).load().await;

        let client = match endpoint_url {
            Some(url) => {
                let config = aws_sdk_s3::config::Builder::from(&shared)
                    .endpoint_url(url)
                    .force_path_style(true)
                    .build();
                S3Client::from_conf(config)
            }
            None => S3Client::new(&shared),
        };

        tracing::debug!("S3 client ready (endpoint: {})", endpoint_url.unwrap_or("default"));
        Ok(Self { client })
    }

    /// Wrap an already configured client
    pub fn from_client(client: S3Client) -> Self {
        Self { client }
    }
}

fn to_chrono(dt: Option<&S3DateTime>) -> DateTime<Utc> {
    dt.and_then(|dt| DateTime::from_timestamp(dt.secs(), dt.subsec_nanos()))
        .unwrap_or_default()
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage> {
        let max_keys = max_keys.clamp(1, MAX_LIST_KEYS) as i32;

        let response = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .max_keys(max_keys)
            .set_continuation_token(continuation_token.map(String::from))
            .send()
            .await
            .map_err(|e| SyncError::CloudStorage(e.into_service_error().to_string()))?;

        let objects = response
            .contents()
            .iter()
            .filter_map(|obj| {
                let key = obj.key()?;
                Some(RemoteObject::new(
                    key,
                    obj.size().unwrap_or(0).max(0) as u64,
                    to_chrono(obj.last_modified()),
                    obj.e_tag().map(String::from),
                ))
            })
            .collect();

        Ok(ListPage {
            objects,
            next_token: response.next_continuation_token().map(String::from),
            is_truncated: response.is_truncated().unwrap_or(false),
        })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMeta> {
        let response = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| SyncError::CloudStorage(e.into_service_error().to_string()))?;

        Ok(ObjectMeta {
            size: response.content_length().unwrap_or(0).max(0) as u64,
            last_modified: to_chrono(response.last_modified()),
            fingerprint: response.e_tag().map(String::from),
        })
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<Option<String>> {
        let size = data.len();

        let response = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| SyncError::CloudStorage(e.into_service_error().to_string()))?;

        tracing::debug!("Uploaded {} bytes to s3://{}/{}", size, bucket, key);
        Ok(response.e_tag().map(String::from))
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<Vec<DeleteOutcome>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        if keys.len() > MAX_DELETE_KEYS {
            return Err(SyncError::Internal(format!(
                "batch of {} keys exceeds the {} key delete limit",
                keys.len(),
                MAX_DELETE_KEYS
            )));
        }

        let identifiers = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SyncError::Internal(e.to_string()))?;

        let delete = Delete::builder()
            .set_objects(Some(identifiers))
            .quiet(false)
            .build()
            .map_err(|e| SyncError::Internal(e.to_string()))?;

        let response = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| SyncError::CloudStorage(e.into_service_error().to_string()))?;

        let mut outcomes: Vec<DeleteOutcome> = response
            .deleted()
            .iter()
            .filter_map(|d| d.key().map(DeleteOutcome::deleted))
            .collect();

        for err in response.errors() {
            if let Some(key) = err.key() {
                outcomes.push(DeleteOutcome::failed(
                    key,
                    format!(
                        "{}: {}",
                        err.code().unwrap_or("Unknown"),
                        err.message().unwrap_or("delete failed")
                    ),
                ));
            }
        }

        // Keys the service did not mention at all count as failures.
        for key in keys {
            if !outcomes.iter().any(|o| &o.key == key) {
                outcomes.push(DeleteOutcome::failed(
                    key.clone(),
                    "missing from delete response",
                ));
            }
        }

        Ok(outcomes)
    }
}
