//! Sync run configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Default number of concurrent transfers
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Largest accepted timestamp slack (one day)
pub const MAX_TIME_TOLERANCE_SECS: u64 = 86_400;

/// Which comparator decides whether a shared path changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ComparatorKind {
    /// Size first, then time, hashing only when the local copy looks newer
    #[default]
    Smart,
    /// Size and modification time only
    SizeTime,
    /// Size, then MD5 against the remote fingerprint
    Checksum,
}

impl ComparatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparatorKind::Smart => "smart",
            ComparatorKind::SizeTime => "size-time",
            ComparatorKind::Checksum => "checksum",
        }
    }
}

impl std::str::FromStr for ComparatorKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "smart" => Ok(ComparatorKind::Smart),
            "size-time" | "size_time" | "sizetime" => Ok(ComparatorKind::SizeTime),
            "checksum" | "md5" => Ok(ComparatorKind::Checksum),
            _ => Err(format!("Unknown comparator: {}", s)),
        }
    }
}

/// Configuration for one sync run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Local directory to mirror
    pub local_root: PathBuf,
    /// Target bucket
    pub bucket: String,
    /// Key prefix inside the bucket (may be empty)
    #[serde(default)]
    pub prefix: String,
    /// Delete remote objects with no local counterpart
    #[serde(default)]
    pub delete_extra: bool,
    /// Plan only, touch nothing
    #[serde(default)]
    pub dry_run: bool,
    /// Maximum in-flight transfers
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Include patterns, in order
    #[serde(default)]
    pub include_patterns: Vec<String>,
    /// Exclude patterns, in order; these win over includes
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    /// Change detection strategy
    #[serde(default)]
    pub comparator: ComparatorKind,
    /// Follow symbolic links while walking the local tree
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Slack allowed between local and remote timestamps
    #[serde(default = "default_time_tolerance")]
    pub time_tolerance_secs: u64,
    /// Cancel the whole run after this many seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_time_tolerance() -> u64 {
    1
}

impl SyncConfig {
    /// Create a config with defaults for everything but the endpoints
    pub fn new(
        local_root: impl Into<PathBuf>,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            local_root: local_root.into(),
            bucket: bucket.into(),
            prefix: prefix.into(),
            delete_extra: false,
            dry_run: false,
            concurrency: DEFAULT_CONCURRENCY,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            comparator: ComparatorKind::default(),
            follow_symlinks: false,
            time_tolerance_secs: default_time_tolerance(),
            timeout_secs: None,
        }
    }

    /// Load from a TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn with_delete_extra(mut self, delete_extra: bool) -> Self {
        self.delete_extra = delete_extra;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_comparator(mut self, comparator: ComparatorKind) -> Self {
        self.comparator = comparator;
        self
    }

    pub fn with_patterns(mut self, includes: Vec<String>, excludes: Vec<String>) -> Self {
        self.include_patterns = includes;
        self.exclude_patterns = excludes;
        self
    }

    /// Prefix used for object keys.
    ///
    /// A non-empty prefix always ends in `/`, so `site` never picks up
    /// keys from a sibling such as `site2/`.
    pub fn key_prefix(&self) -> String {
        let trimmed = self.prefix.trim_start_matches('/');
        if trimmed.is_empty() || trimmed.ends_with('/') {
            trimmed.to_string()
        } else {
            format!("{}/", trimmed)
        }
    }

    /// Timestamp slack as a chrono duration
    pub fn time_tolerance(&self) -> Result<chrono::Duration> {
        i64::try_from(self.time_tolerance_secs)
            .ok()
            .filter(|_| self.time_tolerance_secs <= MAX_TIME_TOLERANCE_SECS)
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| {
                SyncError::Config(format!(
                    "time tolerance must be at most {}s, got {}s",
                    MAX_TIME_TOLERANCE_SECS, self.time_tolerance_secs
                ))
            })
    }

    /// Reject configurations that cannot run
    pub fn validate(&self) -> Result<()> {
        if self.bucket.trim().is_empty() {
            return Err(SyncError::Config("bucket must not be empty".to_string()));
        }
        if self.concurrency == 0 {
            return Err(SyncError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }
        self.time_tolerance()?;
        if !self.local_root.is_dir() {
            return Err(SyncError::Config(format!(
                "local root {} is not a directory",
                self.local_root.display()
            )));
        }
        Ok(())
    }
}

/// Split an `s3://bucket/prefix` URI into bucket and prefix
pub fn parse_remote_uri(uri: &str) -> Result<(String, String)> {
    let rest = uri
        .strip_prefix("s3://")
        .ok_or_else(|| SyncError::Config("URI must start with s3://".to_string()))?;

    let (bucket, prefix) = match rest.split_once('/') {
        Some((bucket, prefix)) => (bucket, prefix),
        None => (rest, ""),
    };

    if bucket.is_empty() {
        return Err(SyncError::Config(
            "URI must be s3://bucket[/prefix]".to_string(),
        ));
    }

    Ok((bucket.to_string(), prefix.to_string()))
}
