//! Core types for Stratasync

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Priority given to every delete, below all upload buckets
pub const DELETE_PRIORITY: u8 = 5;

/// Priority given to every skip, the lowest of all
pub const SKIP_PRIORITY: u8 = 10;

const MIB: u64 = 1024 * 1024;

/// A file found on the local side of a sync run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalFile {
    /// Absolute path on disk
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: DateTime<Utc>,
}

impl LocalFile {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            size,
            modified,
        }
    }

    /// Path relative to `root`, with `/` separators.
    ///
    /// Returns `None` when the file does not live under `root`.
    pub fn relative_to(&self, root: &Path) -> Option<String> {
        let relative = self.path.strip_prefix(root).ok()?;
        let normalized = to_slash(relative);
        if normalized.is_empty() {
            None
        } else {
            Some(normalized)
        }
    }
}

/// An object found under the sync prefix in the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    /// Full object key, prefix included
    pub key: String,
    /// Size in bytes
    pub size: u64,
    /// Last modification time as reported by the store
    pub last_modified: DateTime<Utc>,
    /// Store-supplied fingerprint (usually a quoted ETag)
    pub fingerprint: Option<String>,
}

impl RemoteObject {
    pub fn new(
        key: impl Into<String>,
        size: u64,
        last_modified: DateTime<Utc>,
        fingerprint: Option<String>,
    ) -> Self {
        Self {
            key: key.into(),
            size,
            last_modified,
            fingerprint,
        }
    }

    /// Key with the sync prefix and at most one leading slash stripped.
    ///
    /// Returns `None` when the key is outside `prefix`.
    pub fn relative_key(&self, prefix: &str) -> Option<&str> {
        let rest = self.key.strip_prefix(prefix)?;
        let rest = rest.strip_prefix('/').unwrap_or(rest);
        if rest.is_empty() {
            None
        } else {
            Some(rest)
        }
    }
}

/// Join a relative path onto the sync prefix to form an object key
pub fn remote_key(prefix: &str, relative: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        format!("{}{}", prefix, relative)
    } else {
        format!("{}/{}", prefix, relative)
    }
}

/// Render a relative path with `/` separators regardless of platform
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Kind of planned operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Upload,
    Delete,
    Skip,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Upload => "upload",
            OperationKind::Delete => "delete",
            OperationKind::Skip => "skip",
        }
    }

    /// Tie-break order within one priority level
    pub fn order(&self) -> u8 {
        match self {
            OperationKind::Upload => 0,
            OperationKind::Delete => 1,
            OperationKind::Skip => 2,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "upload" => Ok(OperationKind::Upload),
            "delete" => Ok(OperationKind::Delete),
            "skip" => Ok(OperationKind::Skip),
            _ => Err(format!("Unknown operation kind: {}", s)),
        }
    }
}

/// Priority bucket for an upload of `size` bytes.
///
/// Small files come first so progress shows up early.
pub fn upload_priority(size: u64) -> u8 {
    if size < MIB {
        1
    } else if size < 10 * MIB {
        2
    } else if size < 100 * MIB {
        3
    } else {
        4
    }
}

/// A single planned unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub kind: OperationKind,
    /// Source file, set for uploads
    pub local_path: Option<PathBuf>,
    /// Target object key
    pub remote_key: String,
    /// Bytes involved (local size for uploads and skips, remote size for deletes)
    pub size: u64,
    /// Human-readable reason ("new file", "modified", ...)
    pub reason: String,
    /// Lower runs first
    pub priority: u8,
}

impl Operation {
    pub fn upload(
        local_path: impl Into<PathBuf>,
        remote_key: impl Into<String>,
        size: u64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            kind: OperationKind::Upload,
            local_path: Some(local_path.into()),
            remote_key: remote_key.into(),
            size,
            reason: reason.into(),
            priority: upload_priority(size),
        }
    }

    pub fn delete(remote_key: impl Into<String>, size: u64, reason: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Delete,
            local_path: None,
            remote_key: remote_key.into(),
            size,
            reason: reason.into(),
            priority: DELETE_PRIORITY,
        }
    }

    pub fn skip(
        local_path: impl Into<PathBuf>,
        remote_key: impl Into<String>,
        size: u64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            kind: OperationKind::Skip,
            local_path: Some(local_path.into()),
            remote_key: remote_key.into(),
            size,
            reason: reason.into(),
            priority: SKIP_PRIORITY,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<6} {} ({}, {} bytes)",
            self.kind, self.remote_key, self.reason, self.size
        )
    }
}

/// Count and byte total for one operation kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindStats {
    pub count: usize,
    pub bytes: u64,
}

/// Aggregate view over a plan, recomputed on demand
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationStats {
    pub uploads: KindStats,
    pub deletes: KindStats,
    pub skips: KindStats,
}

impl OperationStats {
    pub fn from_operations(operations: &[Operation]) -> Self {
        let mut stats = Self::default();
        for op in operations {
            let bucket = match op.kind {
                OperationKind::Upload => &mut stats.uploads,
                OperationKind::Delete => &mut stats.deletes,
                OperationKind::Skip => &mut stats.skips,
            };
            bucket.count += 1;
            bucket.bytes += op.size;
        }
        stats
    }

    pub fn total_count(&self) -> usize {
        self.uploads.count + self.deletes.count + self.skips.count
    }

    /// Operations that would touch the remote store
    pub fn actionable_count(&self) -> usize {
        self.uploads.count + self.deletes.count
    }
}

/// A failed operation together with its cause
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    pub operation: Operation,
    pub error: String,
}

/// Outcome of one sync run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub files_uploaded: usize,
    pub files_deleted: usize,
    pub bytes_uploaded: u64,
    /// Full plan, present in dry-run too
    pub operations: Vec<Operation>,
    pub errors: Vec<OperationError>,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn stats(&self) -> OperationStats {
        OperationStats::from_operations(&self.operations)
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// One-line human summary
    pub fn summary(&self) -> String {
        let stats = self.stats();
        let elapsed = self.completed_at - self.started_at;
        if self.dry_run {
            format!(
                "dry run: would upload {} file(s) ({} bytes), delete {}, skip {}",
                stats.uploads.count, stats.uploads.bytes, stats.deletes.count, stats.skips.count
            )
        } else {
            format!(
                "uploaded {} file(s) ({} bytes), deleted {}, skipped {}, {} error(s) in {}ms",
                self.files_uploaded,
                self.bytes_uploaded,
                self.files_deleted,
                stats.skips.count,
                self.errors.len(),
                elapsed.num_milliseconds()
            )
        }
    }
}
