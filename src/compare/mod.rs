//! Change detection between a local file and its remote copy
//!
//! Three strategies share the [`Comparator`] trait:
//! - [`SizeTimeComparator`]: size, then modification time (no I/O)
//! - [`ChecksumComparator`]: size, then MD5 of the local file against the ETag
//! - [`SmartComparator`]: size, then time, hashing only when the local copy
//!   is newer than the remote one
//!
//! Multipart ETags (`"<hex>-<parts>"`) and missing fingerprints cannot be
//! compared with a plain MD5; the hashing strategies fall back to size and
//! modification time for those objects.

mod checksum;

pub use checksum::{local_md5, ChecksumComparator, SmartComparator};

use std::sync::Arc;

use chrono::Duration;

use crate::config::ComparatorKind;
use crate::error::Result;
use crate::fs::FileSystem;
use crate::types::{LocalFile, RemoteObject};

/// Decides whether a shared path needs re-uploading
pub trait Comparator: Send + Sync {
    /// `true` when `local` and `remote` hold different content
    fn has_changed(&self, local: &LocalFile, remote: &RemoteObject) -> Result<bool>;

    /// Strategy name for logs
    fn name(&self) -> &str;
}

/// Cheap comparison on size and modification time
#[derive(Debug, Clone)]
pub struct SizeTimeComparator {
    tolerance: Duration,
}

impl Default for SizeTimeComparator {
    fn default() -> Self {
        Self::new(Duration::seconds(1))
    }
}

impl SizeTimeComparator {
    pub fn new(tolerance: Duration) -> Self {
        Self { tolerance }
    }

    /// Local copy was modified after the remote one, beyond the tolerance
    pub fn local_is_newer(&self, local: &LocalFile, remote: &RemoteObject) -> bool {
        // Past the end of time nothing can be newer.
        match remote.last_modified.checked_add_signed(self.tolerance) {
            Some(cutoff) => local.modified > cutoff,
            None => false,
        }
    }
}

impl Comparator for SizeTimeComparator {
    fn has_changed(&self, local: &LocalFile, remote: &RemoteObject) -> Result<bool> {
        if local.size != remote.size {
            return Ok(true);
        }
        Ok(self.local_is_newer(local, remote))
    }

    fn name(&self) -> &str {
        "size-time"
    }
}

/// Plain MD5 hex digest carried by a fingerprint, if it has one.
///
/// Returns `None` for multipart ETags and anything that is not 32 hex digits.
pub fn comparable_md5(fingerprint: Option<&str>) -> Option<String> {
    let value = fingerprint?.trim().trim_matches('"');
    if value.len() == 32 && value.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(value.to_ascii_lowercase())
    } else {
        None
    }
}

/// Create the comparator selected by `kind`
pub fn create_comparator(
    kind: ComparatorKind,
    fs: Arc<dyn FileSystem>,
    tolerance: Duration,
) -> Arc<dyn Comparator> {
    match kind {
        ComparatorKind::SizeTime => Arc::new(SizeTimeComparator::new(tolerance)),
        ComparatorKind::Checksum => Arc::new(ChecksumComparator::new(fs, tolerance)),
        ComparatorKind::Smart => Arc::new(SmartComparator::new(fs, tolerance)),
    }
}
