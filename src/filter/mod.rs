//! Include/exclude filtering shared by both scan sides
//!
//! Excludes are checked first and always win. When include patterns are
//! given a path must match at least one of them; with no includes every
//! non-excluded path passes.

mod pattern;

pub use pattern::Pattern;

use crate::error::{Result, SyncError};

/// Compiled include/exclude lists
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    includes: Vec<Pattern>,
    excludes: Vec<Pattern>,
    has_includes: bool,
}

impl PathFilter {
    /// Compile both lists.
    ///
    /// Invalid patterns are logged and dropped; an invalid pattern never
    /// matches anything. Use [`validate_patterns`] to surface them.
    pub fn new(includes: &[String], excludes: &[String]) -> Self {
        Self {
            includes: compile_lenient(includes),
            excludes: compile_lenient(excludes),
            has_includes: !includes.is_empty(),
        }
    }

    /// A filter that lets everything through
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn should_include(&self, rel_path: &str) -> bool {
        if self.excludes.iter().any(|p| p.matches(rel_path)) {
            return false;
        }
        if !self.has_includes {
            return true;
        }
        self.includes.iter().any(|p| p.matches(rel_path))
    }
}

fn compile_lenient(patterns: &[String]) -> Vec<Pattern> {
    patterns
        .iter()
        .filter_map(|raw| match Pattern::new(raw) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                tracing::warn!("Ignoring pattern: {}", e);
                None
            }
        })
        .collect()
}

/// Decide whether `rel_path` survives the include/exclude lists
pub fn should_include(rel_path: &str, includes: &[String], excludes: &[String]) -> bool {
    PathFilter::new(includes, excludes).should_include(rel_path)
}

/// Check a single pattern for syntax errors
pub fn validate_pattern(pattern: &str) -> Result<()> {
    Pattern::new(pattern).map(|_| ())
}

/// Check every pattern and collect the failures without stopping early
pub fn validate_patterns(patterns: &[String]) -> Vec<SyncError> {
    patterns
        .iter()
        .filter_map(|p| validate_pattern(p).err())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_no_patterns_includes_everything() {
        assert!(should_include("a/b/c.txt", &[], &[]));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let includes = strings(&["*.md", "*.go"]);
        let excludes = strings(&["*.md"]);
        assert!(!should_include("README.md", &includes, &excludes));
        assert!(should_include("main.go", &includes, &excludes));
        assert!(!should_include("main.rs", &includes, &excludes));
    }

    #[test]
    fn test_includes_restrict() {
        let includes = strings(&["static/", "*.html"]);
        assert!(should_include("static/css/site.css", &includes, &[]));
        assert!(should_include("index.html", &includes, &[]));
        assert!(!should_include("notes.txt", &includes, &[]));
    }

    #[test]
    fn test_invalid_include_matches_nothing() {
        // The only include is broken, so nothing is included.
        let includes = strings(&["[broken"]);
        assert!(!should_include("a.txt", &includes, &[]));

        // A broken exclude does not exclude anything.
        let excludes = strings(&["[broken"]);
        assert!(should_include("a.txt", &[], &excludes));
    }

    #[test]
    fn test_validate_patterns_collects_all() {
        let errors = validate_patterns(&strings(&["*.rs", "[x", "ok/", "bad\\"]));
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|e| matches!(e, SyncError::InvalidPattern { .. })));
        assert!(validate_pattern("**/*.log").is_ok());
    }
}
