//! Property-based tests for stratasync
//!
//! These tests verify invariants that must hold for all inputs:
//! - Pattern compilation and matching never panic
//! - Excludes always win over includes
//! - Plans never upload and delete the same key
//! - Plans account for every path exactly once
//!
//! Run with: cargo test --test property_tests

use proptest::prelude::*;

// ============================================================================
// PATTERN TESTS
// ============================================================================

mod pattern_tests {
    use super::*;
    use stratasync::filter::{should_include, Pattern};

    proptest! {
        /// Invariant: compiling any string never panics
        #[test]
        fn compile_never_panics(s in ".*") {
            let _ = Pattern::new(&s);
        }

        /// Invariant: matching any path against any valid pattern never panics
        #[test]
        fn match_never_panics(p in "[a-z*?/\\[\\]!.-]{1,12}", path in "[a-z/.]{0,24}") {
            if let Ok(pattern) = Pattern::new(&p) {
                let _ = pattern.matches(&path);
            }
        }

        /// Invariant: `*` never crosses a directory boundary
        #[test]
        fn star_stays_in_segment(dir in "[a-z]{1,8}", name in "[a-z]{1,8}") {
            let pattern = Pattern::new("*").unwrap();
            let nested = format!("{}/{}", dir, name);
            // Name patterns look at the last segment only.
            prop_assert!(pattern.matches(&nested));
            let anchored = Pattern::new("/*").unwrap();
            prop_assert!(!anchored.matches(&nested));
            prop_assert!(anchored.matches(&name));
        }

        /// Invariant: a literal name pattern matches that name in any directory
        #[test]
        fn literal_name_matches_anywhere(dirs in prop::collection::vec("[a-z]{1,6}", 0..4), name in "[a-z]{1,8}\\.txt") {
            let mut path = dirs.join("/");
            if !path.is_empty() {
                path.push('/');
            }
            path.push_str(&name);
            prop_assert!(Pattern::new(&name).unwrap().matches(&path));
        }

        /// Invariant: a path matched by an exclude is never included
        #[test]
        fn excludes_take_precedence(
            path in "[a-c]{1,3}(/[a-c]{1,3}){0,2}\\.(md|go|txt)",
            patterns in prop::collection::vec(prop::sample::select(vec![
                "*.md", "*.go", "*.txt", "a*", "b/", "**/c*", "a/**", "?.txt",
            ]), 1..4),
        ) {
            let patterns: Vec<String> = patterns.into_iter().map(String::from).collect();
            // Same list on both sides: anything it matches must be excluded.
            prop_assert!(!should_include(&path, &patterns, &patterns));

            let excluded = patterns.iter().any(|p| Pattern::new(p).unwrap().matches(&path));
            prop_assert_eq!(should_include(&path, &[], &patterns), !excluded);
        }
    }
}

// ============================================================================
// PLANNER TESTS
// ============================================================================

mod planner_tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::collections::{BTreeMap, HashSet};
    use std::path::Path;
    use std::sync::Arc;
    use stratasync::compare::SizeTimeComparator;
    use stratasync::planner::Planner;
    use stratasync::{upload_priority, LocalFile, OperationKind, RemoteObject};

    fn base_time() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    /// Relative path -> (size, age in seconds)
    fn inventory() -> impl Strategy<Value = BTreeMap<String, (u64, i64)>> {
        prop::collection::btree_map(
            "[a-d]{1,2}(/[a-d]{1,2})?\\.txt",
            (0u64..64, 0i64..10),
            0..12,
        )
    }

    fn build(
        root: &Path,
        prefix: &str,
        locals: &BTreeMap<String, (u64, i64)>,
        remotes: &BTreeMap<String, (u64, i64)>,
    ) -> (Vec<LocalFile>, Vec<RemoteObject>) {
        let locals = locals
            .iter()
            .map(|(path, (size, age))| {
                LocalFile::new(root.join(path), *size, base_time() - Duration::seconds(*age))
            })
            .collect();
        let remotes = remotes
            .iter()
            .map(|(path, (size, age))| {
                RemoteObject::new(
                    format!("{}{}", prefix, path),
                    *size,
                    base_time() - Duration::seconds(*age),
                    None,
                )
            })
            .collect();
        (locals, remotes)
    }

    proptest! {
        /// Invariant: no key is both uploaded and deleted
        #[test]
        fn uploads_and_deletes_are_disjoint(locals in inventory(), remotes in inventory()) {
            let root = Path::new("/data");
            let (l, r) = build(root, "p/", &locals, &remotes);
            let plan = Planner::new(Arc::new(SizeTimeComparator::default()))
                .plan(root, &l, &r, "p/", true)
                .unwrap();

            let uploads: HashSet<&str> = plan
                .iter()
                .filter(|op| op.kind == OperationKind::Upload)
                .map(|op| op.remote_key.as_str())
                .collect();
            prop_assert!(plan
                .iter()
                .filter(|op| op.kind == OperationKind::Delete)
                .all(|op| !uploads.contains(op.remote_key.as_str())));
        }

        /// Invariant: every path gets exactly one operation of the right kind
        #[test]
        fn plan_is_complete(locals in inventory(), remotes in inventory(), delete_extra in any::<bool>()) {
            let root = Path::new("/data");
            let (l, r) = build(root, "p/", &locals, &remotes);
            let plan = Planner::new(Arc::new(SizeTimeComparator::default()))
                .plan(root, &l, &r, "p/", delete_extra)
                .unwrap();

            let count = |kind: OperationKind, reason: &str| {
                plan.iter().filter(|op| op.kind == kind && op.reason == reason).count()
            };
            let local_only = locals.keys().filter(|k| !remotes.contains_key(*k)).count();
            let remote_only = remotes.keys().filter(|k| !locals.contains_key(*k)).count();
            let shared = locals.keys().filter(|k| remotes.contains_key(*k)).count();

            prop_assert_eq!(count(OperationKind::Upload, "new file"), local_only);
            prop_assert_eq!(
                count(OperationKind::Delete, "extra remote file"),
                if delete_extra { remote_only } else { 0 }
            );
            prop_assert_eq!(
                count(OperationKind::Upload, "modified") + count(OperationKind::Skip, "unchanged"),
                shared
            );

            let keys: HashSet<&str> = plan.iter().map(|op| op.remote_key.as_str()).collect();
            prop_assert_eq!(keys.len(), plan.len());
        }

        /// Invariant: plans come out ordered by priority
        #[test]
        fn plan_is_sorted(locals in inventory(), remotes in inventory()) {
            let root = Path::new("/data");
            let (l, r) = build(root, "", &locals, &remotes);
            let plan = Planner::new(Arc::new(SizeTimeComparator::default()))
                .plan(root, &l, &r, "", true)
                .unwrap();
            prop_assert!(plan.windows(2).all(|w| w[0].priority <= w[1].priority));
        }

        /// Invariant: larger uploads never get a more urgent priority
        #[test]
        fn upload_priority_is_monotonic(a in any::<u64>(), b in any::<u64>()) {
            let (small, large) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(upload_priority(small) <= upload_priority(large));
            prop_assert!((1..=4).contains(&upload_priority(large)));
        }
    }
}
