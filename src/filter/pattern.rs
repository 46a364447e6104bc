//! Glob pattern compilation and matching
//!
//! Supported syntax:
//! - `*` any run of characters except `/`
//! - `?` one character except `/`
//! - `[abc]`, `[a-z]`, `[!a-z]` character classes
//! - `{a,b}` alternatives
//! - `\x` escapes `x`
//! - trailing `/` scopes the pattern to a directory and everything below it
//! - `**` spans any number of directories, checked as a prefix/suffix pair
//!
//! Patterns without a `/` are matched against the file name, patterns with
//! one against the whole relative path. Matching is case-sensitive.

use globset::{GlobBuilder, GlobMatcher};

use crate::error::{Result, SyncError};

/// One compiled glob; `*`, `?` and classes never cross a `/`
#[derive(Debug, Clone)]
struct Glob {
    raw: String,
    matcher: GlobMatcher,
}

impl Glob {
    fn parse(raw: &str, source: &str) -> Result<Self> {
        let glob = GlobBuilder::new(raw)
            .literal_separator(true)
            .backslash_escape(true)
            .build()
            .map_err(|e| SyncError::InvalidPattern {
                pattern: source.to_string(),
                reason: e.kind().to_string(),
            })?;

        Ok(Self {
            raw: raw.to_string(),
            matcher: glob.compile_matcher(),
        })
    }

    fn with_leading_star(self, source: &str) -> Result<Self> {
        if self.raw.starts_with('*') {
            return Ok(self);
        }
        Self::parse(&format!("*{}", self.raw), source)
    }

    fn with_trailing_star(self, source: &str) -> Result<Self> {
        if self.raw.ends_with('*') {
            return Ok(self);
        }
        Self::parse(&format!("{}*", self.raw), source)
    }

    fn matches(&self, text: &str) -> bool {
        self.matcher.is_match(text)
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    /// Pattern without `/`, tried against the file name
    Name(Glob),
    /// Pattern with `/`, tried against the whole relative path
    Path(Glob),
    /// `name/` matches any directory component called `name`
    AnyDirectory(Glob),
    /// `a/b/` matches paths whose leading components are `a/b`
    AnchoredDirectory(Vec<Glob>),
    /// `head/**/tail`, prefix and suffix only
    Recursive { head: Vec<Glob>, tail: Vec<Glob> },
}

/// A compiled include/exclude pattern
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    matcher: Matcher,
}

impl Pattern {
    /// Compile `raw`, failing on syntax errors
    pub fn new(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(SyncError::InvalidPattern {
                pattern: raw.to_string(),
                reason: "pattern is empty".to_string(),
            });
        }

        let body = raw.strip_prefix('/').unwrap_or(raw);
        let anchored = body.len() != raw.len();
        if body.is_empty() {
            return Err(SyncError::InvalidPattern {
                pattern: raw.to_string(),
                reason: "pattern is only a root anchor".to_string(),
            });
        }

        let matcher = if body.contains("**") {
            Self::compile_recursive(body, raw)?
        } else if let Some(dir) = body.strip_suffix('/') {
            if dir.is_empty() {
                return Err(SyncError::InvalidPattern {
                    pattern: raw.to_string(),
                    reason: "directory pattern has no name".to_string(),
                });
            }
            if anchored || dir.contains('/') {
                Matcher::AnchoredDirectory(Self::compile_segments(dir, raw)?)
            } else {
                Matcher::AnyDirectory(Glob::parse(dir, raw)?)
            }
        } else if anchored || body.contains('/') {
            Matcher::Path(Glob::parse(body, raw)?)
        } else {
            Matcher::Name(Glob::parse(body, raw)?)
        };

        Ok(Self {
            raw: raw.to_string(),
            matcher,
        })
    }

    fn compile_segments(path: &str, source: &str) -> Result<Vec<Glob>> {
        path.split('/')
            .filter(|s| !s.is_empty())
            .map(|s| Glob::parse(s, source))
            .collect()
    }

    fn compile_recursive(body: &str, source: &str) -> Result<Matcher> {
        let parts: Vec<&str> = body.split("**").collect();
        let head_raw = parts.first().copied().unwrap_or_default();
        let tail_raw = parts.last().copied().unwrap_or_default();

        // Middle parts of a multi-`**` pattern are never matched against,
        // but they still have to be valid.
        for middle in &parts[1..parts.len().saturating_sub(1)] {
            Self::compile_segments(middle, source)?;
        }

        let mut head = Self::compile_segments(head_raw, source)?;
        if !head_raw.is_empty() && !head_raw.ends_with('/') {
            if let Some(last) = head.pop() {
                head.push(last.with_trailing_star(source)?);
            }
        }

        let mut tail = Self::compile_segments(tail_raw, source)?;
        if !tail_raw.is_empty() && !tail_raw.starts_with('/') && !tail.is_empty() {
            let first = tail.remove(0);
            tail.insert(0, first.with_leading_star(source)?);
        }

        Ok(Matcher::Recursive { head, tail })
    }

    /// Original pattern text
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Check a slash-separated relative path
    pub fn matches(&self, rel_path: &str) -> bool {
        let rel_path = rel_path.trim_start_matches('/');
        match &self.matcher {
            Matcher::Name(glob) => {
                let name = rel_path.rsplit('/').next().unwrap_or(rel_path);
                glob.matches(name)
            }
            Matcher::Path(glob) => glob.matches(rel_path),
            Matcher::AnyDirectory(glob) => {
                let segments: Vec<&str> = rel_path.split('/').collect();
                segments[..segments.len() - 1]
                    .iter()
                    .any(|segment| glob.matches(segment))
            }
            Matcher::AnchoredDirectory(globs) => {
                let segments: Vec<&str> = rel_path.split('/').collect();
                segments.len() > globs.len()
                    && globs
                        .iter()
                        .zip(&segments)
                        .all(|(glob, segment)| glob.matches(segment))
            }
            Matcher::Recursive { head, tail } => {
                let segments: Vec<&str> = rel_path.split('/').collect();
                if segments.len() < head.len() + tail.len() {
                    return false;
                }
                let head_ok = head
                    .iter()
                    .zip(&segments)
                    .all(|(glob, segment)| glob.matches(segment));
                let tail_ok = tail
                    .iter()
                    .rev()
                    .zip(segments.iter().rev())
                    .all(|(glob, segment)| glob.matches(segment));
                head_ok && tail_ok
            }
        }
    }
}
