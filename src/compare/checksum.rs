//! Comparators that hash local content

use std::io::Read;
use std::sync::Arc;

use chrono::Duration;
use md5::{Digest, Md5};

use super::{comparable_md5, Comparator, SizeTimeComparator};
use crate::error::{Result, SyncError};
use crate::fs::FileSystem;
use crate::types::{LocalFile, RemoteObject};

const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Hex MD5 of a local file, streamed through `fs`
pub fn local_md5(fs: &dyn FileSystem, local: &LocalFile) -> Result<String> {
    let comparison_error = |message: String| SyncError::Comparison {
        path: local.path.display().to_string(),
        message,
    };

    let mut reader = fs
        .open(&local.path)
        .map_err(|e| comparison_error(e.to_string()))?;
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let read = reader
            .read(&mut buffer)
            .map_err(|e| comparison_error(e.to_string()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Verifies content with MD5 whenever the remote fingerprint allows it
pub struct ChecksumComparator {
    fs: Arc<dyn FileSystem>,
    fallback: SizeTimeComparator,
}

impl ChecksumComparator {
    pub fn new(fs: Arc<dyn FileSystem>, tolerance: Duration) -> Self {
        Self {
            fs,
            fallback: SizeTimeComparator::new(tolerance),
        }
    }
}

impl Comparator for ChecksumComparator {
    fn has_changed(&self, local: &LocalFile, remote: &RemoteObject) -> Result<bool> {
        if local.size != remote.size {
            return Ok(true);
        }

        match comparable_md5(remote.fingerprint.as_deref()) {
            Some(remote_md5) => Ok(local_md5(self.fs.as_ref(), local)? != remote_md5),
            None => {
                tracing::debug!(
                    "Fingerprint of {} is not a plain MD5, comparing by time",
                    remote.key
                );
                self.fallback.has_changed(local, remote)
            }
        }
    }

    fn name(&self) -> &str {
        "checksum"
    }
}

/// Size first, then time; hashes only files that look newer locally
pub struct SmartComparator {
    fs: Arc<dyn FileSystem>,
    time: SizeTimeComparator,
}

impl SmartComparator {
    pub fn new(fs: Arc<dyn FileSystem>, tolerance: Duration) -> Self {
        Self {
            fs,
            time: SizeTimeComparator::new(tolerance),
        }
    }
}

impl Comparator for SmartComparator {
    fn has_changed(&self, local: &LocalFile, remote: &RemoteObject) -> Result<bool> {
        if local.size != remote.size {
            return Ok(true);
        }

        if !self.time.local_is_newer(local, remote) {
            return Ok(false);
        }

        // Touched but possibly identical; let the content decide when we can.
        match comparable_md5(remote.fingerprint.as_deref()) {
            Some(remote_md5) => Ok(local_md5(self.fs.as_ref(), local)? != remote_md5),
            None => Ok(true),
        }
    }

    fn name(&self) -> &str {
        "smart"
    }
}
