//! Inventory scanning for both sides of a sync run
//!
//! Local files come from a [`FileSystem`] walk, remote objects from a
//! paginated [`ObjectStore`] listing. Both sides honor the run's
//! cancellation token and never hand back a partial inventory.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{Result, SyncError};
use crate::filter::PathFilter;
use crate::fs::FileSystem;
use crate::store::{ObjectStore, MAX_LIST_KEYS};
use crate::types::{LocalFile, RemoteObject};

/// Builds local and remote inventories
pub struct Scanner {
    fs: Arc<dyn FileSystem>,
    store: Arc<dyn ObjectStore>,
    cancel: CancellationToken,
    follow_links: bool,
}

impl Scanner {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        store: Arc<dyn ObjectStore>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            fs,
            store,
            cancel,
            follow_links: false,
        }
    }

    /// Descend through symbolic links during local scans
    pub fn follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    /// Walk `root` and return every file that passes the filters
    pub async fn scan_local(
        &self,
        root: &Path,
        includes: &[String],
        excludes: &[String],
    ) -> Result<Vec<LocalFile>> {
        let fs = self.fs.clone();
        let cancel = self.cancel.clone();
        let root = root.to_path_buf();
        let filter = PathFilter::new(includes, excludes);
        let follow_links = self.follow_links;

        let files = tokio::task::spawn_blocking(move || {
            walk_local(fs.as_ref(), &root, follow_links, &filter, &cancel)
        })
        .await??;

        tracing::info!("Found {} local file(s)", files.len());
        Ok(files)
    }

    /// List every object whose key starts with `prefix`
    pub async fn scan_remote(&self, bucket: &str, prefix: &str) -> Result<Vec<RemoteObject>> {
        let mut objects = Vec::new();
        let mut token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(SyncError::Cancelled),
                page = self.store.list_objects(bucket, prefix, token.as_deref(), MAX_LIST_KEYS) => page?,
            };
            pages += 1;

            for object in page.objects {
                if self.cancel.is_cancelled() {
                    return Err(SyncError::Cancelled);
                }
                if !object.key.starts_with(prefix) {
                    tracing::warn!(
                        "Dropping {} from listing: outside prefix {:?}",
                        object.key,
                        prefix
                    );
                    continue;
                }
                if object.key.ends_with('/') && object.size == 0 {
                    tracing::debug!("Ignoring folder marker {}", object.key);
                    continue;
                }
                objects.push(object);
            }

            if !page.is_truncated {
                break;
            }
            match page.next_token {
                Some(next) if token.as_deref() != Some(next.as_str()) => token = Some(next),
                _ => {
                    return Err(SyncError::CloudStorage(
                        "listing is truncated but has no new continuation token".to_string(),
                    ))
                }
            }
        }

        tracing::info!(
            "Found {} remote object(s) under s3://{}/{} in {} page(s)",
            objects.len(),
            bucket,
            prefix,
            pages
        );
        Ok(objects)
    }

    /// [`Scanner::scan_remote`] plus the include/exclude filters, applied to
    /// the key with `prefix` stripped
    pub async fn scan_remote_with_pattern(
        &self,
        bucket: &str,
        prefix: &str,
        includes: &[String],
        excludes: &[String],
    ) -> Result<Vec<RemoteObject>> {
        let filter = PathFilter::new(includes, excludes);
        let objects = self.scan_remote(bucket, prefix).await?;
        let total = objects.len();

        let kept: Vec<RemoteObject> = objects
            .into_iter()
            .filter(|obj| {
                obj.relative_key(prefix)
                    .is_some_and(|rel| filter.should_include(rel))
            })
            .collect();

        tracing::debug!("Filters kept {} of {} remote object(s)", kept.len(), total);
        Ok(kept)
    }
}

/// Blocking local walk; runs on the blocking pool
pub fn walk_local(
    fs: &dyn FileSystem,
    root: &Path,
    follow_links: bool,
    filter: &PathFilter,
    cancel: &CancellationToken,
) -> Result<Vec<LocalFile>> {
    let mut files = Vec::new();

    fs.walk(root, follow_links, &mut |entry| {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        if entry.is_dir {
            return Ok(());
        }

        let file = LocalFile::new(entry.path, entry.size, entry.modified);
        match file.relative_to(root) {
            Some(rel) if filter.should_include(&rel) => files.push(file),
            Some(_) => {}
            None => tracing::warn!("Skipping {} outside {}", file.path.display(), root.display()),
        }
        Ok(())
    })?;

    Ok(files)
}
