//! End-to-end sync runs against the in-memory store
//!
//! Run with: cargo test --test sync_integration

use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;

use stratasync::fs::OsFileSystem;
use stratasync::{ComparatorKind, MemoryStore, OperationKind, SyncConfig, SyncManager};

fn write(root: &Path, rel: &str, data: &[u8]) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, data).unwrap();
}

fn manager(store: &Arc<MemoryStore>) -> SyncManager {
    SyncManager::new(Arc::new(OsFileSystem::new()), store.clone())
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_new_extra_and_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.txt", b"hello");
    write(dir.path(), "b.txt", b"0123456789");

    let store = Arc::new(MemoryStore::new());
    let later = Utc::now() + Duration::hours(1);
    store.insert("bucket", "site/b.txt", b"0123456789", later);
    store.insert("bucket", "site/c.txt", b"old", later);

    let config = SyncConfig::new(dir.path(), "bucket", "site/").with_delete_extra(true);
    let result = manager(&store).sync(&config).await.unwrap();

    let plan: Vec<(OperationKind, &str, &str)> = result
        .operations
        .iter()
        .map(|op| (op.kind, op.remote_key.as_str(), op.reason.as_str()))
        .collect();
    assert_eq!(
        plan,
        vec![
            (OperationKind::Upload, "site/a.txt", "new file"),
            (OperationKind::Delete, "site/c.txt", "extra remote file"),
            (OperationKind::Skip, "site/b.txt", "unchanged"),
        ]
    );
    assert_eq!(result.files_uploaded, 1);
    assert_eq!(result.files_deleted, 1);
    assert_eq!(result.bytes_uploaded, 5);
    assert!(result.is_success());
    assert_eq!(store.keys("bucket"), vec!["site/a.txt", "site/b.txt"]);
    assert_eq!(store.get("bucket", "site/a.txt").unwrap(), b"hello".to_vec());
}

#[tokio::test]
async fn test_second_run_is_all_skips() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "index.html", b"<html></html>");
    write(dir.path(), "css/site.css", b"body {}");
    write(dir.path(), "img/logo.svg", b"<svg/>");

    let store = Arc::new(MemoryStore::new());
    store.insert("bucket", "www/stale.txt", b"gone", Utc::now());
    let config = SyncConfig::new(dir.path(), "bucket", "www").with_delete_extra(true);
    let m = manager(&store);

    let first = m.sync(&config).await.unwrap();
    assert_eq!(first.files_uploaded, 3);
    assert_eq!(first.files_deleted, 1);

    let puts = store.put_calls();
    let second = m.sync(&config).await.unwrap();
    assert_eq!(second.operations.len(), 3);
    assert!(second
        .operations
        .iter()
        .all(|op| op.kind == OperationKind::Skip));
    assert_eq!(second.files_uploaded, 0);
    assert_eq!(store.put_calls(), puts);
    assert_eq!(
        store.keys("bucket"),
        vec!["www/css/site.css", "www/img/logo.svg", "www/index.html"]
    );
}

#[tokio::test]
async fn test_dry_run_touches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.txt", b"a");
    write(dir.path(), "nested/b.txt", b"b");

    let store = Arc::new(MemoryStore::new());
    store.insert("bucket", "extra.txt", b"x", Utc::now());
    let config = SyncConfig::new(dir.path(), "bucket", "")
        .with_delete_extra(true)
        .with_dry_run(true);

    let result = manager(&store).sync(&config).await.unwrap();

    assert!(result.dry_run);
    assert_eq!(result.operations.len(), 3);
    assert_eq!(result.files_uploaded, 0);
    assert_eq!(result.files_deleted, 0);
    assert_eq!(store.put_calls(), 0);
    assert_eq!(store.delete_calls(), 0);
    assert_eq!(store.keys("bucket"), vec!["extra.txt"]);
    assert!(result.summary().starts_with("dry run"));
}

#[tokio::test]
async fn test_one_failed_upload_does_not_stop_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..5 {
        write(dir.path(), &format!("f{}.txt", i), b"payload");
    }

    let store = Arc::new(MemoryStore::new());
    store.fail_put("site/f2.txt");
    let config = SyncConfig::new(dir.path(), "bucket", "site").with_concurrency(2);

    let result = manager(&store).sync(&config).await.unwrap();

    assert_eq!(result.files_uploaded, 4);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].operation.remote_key, "site/f2.txt");
    assert!(!result.is_success());
    assert_eq!(store.keys("bucket").len(), 4);
}

#[tokio::test]
async fn test_excludes_win_on_both_sides() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "README.md", b"# readme");
    write(dir.path(), "main.go", b"package main");
    write(dir.path(), "notes.txt", b"notes");

    let store = Arc::new(MemoryStore::new());
    // Excluded on the remote side too, so it must survive delete-extra.
    store.insert("bucket", "src/CHANGELOG.md", b"log", Utc::now());
    store.insert("bucket", "src/old.go", b"package old", Utc::now());

    let config = SyncConfig::new(dir.path(), "bucket", "src")
        .with_delete_extra(true)
        .with_patterns(strings(&["*.md", "*.go"]), strings(&["*.md"]));

    let result = manager(&store).sync(&config).await.unwrap();

    assert_eq!(result.files_uploaded, 1);
    assert_eq!(result.files_deleted, 1);
    assert_eq!(store.keys("bucket"), vec!["src/CHANGELOG.md", "src/main.go"]);
}

#[tokio::test]
async fn test_checksum_catches_same_size_edit() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "config.json", b"{\"v\":2}");

    let store = Arc::new(MemoryStore::new());
    // Same size, newer remote, different bytes.
    store.insert(
        "bucket",
        "config.json",
        b"{\"v\":1}",
        Utc::now() + Duration::hours(1),
    );

    let size_time = SyncConfig::new(dir.path(), "bucket", "")
        .with_comparator(ComparatorKind::SizeTime)
        .with_dry_run(true);
    let result = manager(&store).sync(&size_time).await.unwrap();
    assert_eq!(result.operations[0].kind, OperationKind::Skip);

    let checksum =
        SyncConfig::new(dir.path(), "bucket", "").with_comparator(ComparatorKind::Checksum);
    let result = manager(&store).sync(&checksum).await.unwrap();
    assert_eq!(result.operations[0].kind, OperationKind::Upload);
    assert_eq!(result.operations[0].reason, "modified");
    assert_eq!(store.get("bucket", "config.json").unwrap(), b"{\"v\":2}".to_vec());
}

#[tokio::test]
async fn test_large_listing_is_fully_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new().with_page_size(2));
    for i in 0..7 {
        store.insert("bucket", &format!("old/{}.txt", i), b"x", Utc::now());
    }
    store.insert("bucket", "other/keep.txt", b"x", Utc::now());

    let config = SyncConfig::new(dir.path(), "bucket", "old").with_delete_extra(true);
    let result = manager(&store).sync(&config).await.unwrap();

    assert_eq!(result.files_deleted, 7);
    assert_eq!(store.delete_calls(), 1);
    assert_eq!(store.keys("bucket"), vec!["other/keep.txt"]);
}

#[tokio::test]
async fn test_cancelled_run_returns_cancellation() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.txt", b"a");

    let store = Arc::new(MemoryStore::new());
    let m = manager(&store);
    m.cancellation_token().cancel();

    let err = m
        .sync(&SyncConfig::new(dir.path(), "bucket", ""))
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(store.keys("bucket").is_empty());
}

#[tokio::test]
async fn test_missing_root_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = SyncConfig::new(dir.path().join("nope"), "bucket", "");
    let err = manager(&Arc::new(MemoryStore::new()))
        .sync(&config)
        .await
        .unwrap_err();
    assert!(matches!(err, stratasync::SyncError::Config(_)));
}

#[tokio::test]
async fn test_config_from_toml_drives_a_run() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "keep.txt", b"keep");
    write(dir.path(), "skip.log", b"log");

    let toml = format!(
        r#"
local_root = {:?}
bucket = "bucket"
prefix = "mirror"
exclude_patterns = ["*.log"]
comparator = "size-time"
"#,
        dir.path().display().to_string()
    );
    let config = SyncConfig::from_toml_str(&toml).unwrap();

    let store = Arc::new(MemoryStore::new());
    let result = manager(&store).sync(&config).await.unwrap();

    assert_eq!(result.files_uploaded, 1);
    assert_eq!(store.keys("bucket"), vec!["mirror/keep.txt"]);
}

#[cfg(unix)]
#[tokio::test]
async fn test_follow_symlinks_uploads_link_targets() {
    let dir = tempfile::tempdir().unwrap();
    let outside = tempfile::tempdir().unwrap();
    write(outside.path(), "real.txt", b"linked content");
    std::os::unix::fs::symlink(outside.path().join("real.txt"), dir.path().join("link.txt"))
        .unwrap();

    let store = Arc::new(MemoryStore::new());
    let config = SyncConfig::new(dir.path(), "bucket", "site");
    let result = manager(&store).sync(&config).await.unwrap();
    assert_eq!(result.files_uploaded, 0);
    assert!(store.keys("bucket").is_empty());

    let mut config = config;
    config.follow_symlinks = true;
    let result = manager(&store).sync(&config).await.unwrap();
    assert_eq!(result.files_uploaded, 1);
    assert_eq!(store.keys("bucket"), vec!["site/link.txt"]);
    assert_eq!(
        store.get("bucket", "site/link.txt").unwrap(),
        b"linked content".to_vec()
    );
}
