//! Read-only filesystem access used by the scanner, comparators and executor

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use crate::error::{Result, SyncError};

/// Metadata for one filesystem entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub is_dir: bool,
}

/// Read-only filesystem capability.
///
/// Implementations are shared across tasks, so methods take `&self`.
pub trait FileSystem: Send + Sync {
    /// Visit every entry below `root` (directories included), descending
    /// through symbolic links when `follow_links` is set.
    ///
    /// Returning an error from `visitor` stops the walk and is passed back
    /// to the caller unchanged.
    fn walk(
        &self,
        root: &Path,
        follow_links: bool,
        visitor: &mut dyn FnMut(FileEntry) -> Result<()>,
    ) -> Result<()>;

    /// Metadata for a single path
    fn stat(&self, path: &Path) -> Result<FileEntry>;

    /// Read a whole file
    fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Open a file for streaming reads
    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>>;
}

/// The real filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl OsFileSystem {
    pub fn new() -> Self {
        Self
    }
}

fn entry_from_metadata(path: PathBuf, metadata: &std::fs::Metadata) -> Result<FileEntry> {
    let modified: DateTime<Utc> = metadata.modified()?.into();
    Ok(FileEntry {
        path,
        size: metadata.len(),
        modified,
        is_dir: metadata.is_dir(),
    })
}

impl FileSystem for OsFileSystem {
    fn walk(
        &self,
        root: &Path,
        follow_links: bool,
        visitor: &mut dyn FnMut(FileEntry) -> Result<()>,
    ) -> Result<()> {
        if !root.is_dir() {
            return Err(SyncError::Walk(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        for entry in WalkDir::new(root).follow_links(follow_links) {
            let entry = entry.map_err(|e| SyncError::Walk(e.to_string()))?;
            let file_type = entry.file_type();
            // Unfollowed symlinks, sockets and the like are neither
            // files nor directories we can mirror.
            if !file_type.is_file() && !file_type.is_dir() {
                tracing::debug!("Skipping special file {}", entry.path().display());
                continue;
            }
            let metadata = entry
                .metadata()
                .map_err(|e| SyncError::Walk(e.to_string()))?;
            visitor(entry_from_metadata(entry.into_path(), &metadata)?)?;
        }

        Ok(())
    }

    fn stat(&self, path: &Path) -> Result<FileEntry> {
        let metadata = std::fs::metadata(path)?;
        entry_from_metadata(path.to_path_buf(), &metadata)
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(std::fs::read(path)?)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_visits_files_and_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/b/c.txt"), b"hello").unwrap();
        std::fs::write(dir.path().join("top.txt"), b"x").unwrap();

        let mut files = Vec::new();
        let mut dirs = 0;
        OsFileSystem::new()
            .walk(dir.path(), false, &mut |entry| {
                if entry.is_dir {
                    dirs += 1;
                } else {
                    files.push((entry.path, entry.size));
                }
                Ok(())
            })
            .unwrap();

        files.sort();
        assert_eq!(
            files,
            vec![
                (dir.path().join("a/b/c.txt"), 5),
                (dir.path().join("top.txt"), 1)
            ]
        );
        // root, a, a/b
        assert_eq!(dirs, 3);
    }

    #[test]
    fn test_walk_stops_on_visitor_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.txt"), b"1").unwrap();

        let result = OsFileSystem::new().walk(dir.path(), false, &mut |_| Err(SyncError::Cancelled));
        assert!(matches!(result, Err(SyncError::Cancelled)));
    }

    #[test]
    fn test_walk_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let result = OsFileSystem::new().walk(&dir.path().join("nope"), false, &mut |_| Ok(()));
        assert!(matches!(result, Err(SyncError::Walk(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_follows_links_on_request() {
        let dir = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        std::fs::write(target.path().join("real.txt"), b"data").unwrap();
        std::os::unix::fs::symlink(target.path().join("real.txt"), dir.path().join("link.txt"))
            .unwrap();

        let count_files = |follow: bool| {
            let mut files = 0;
            OsFileSystem::new()
                .walk(dir.path(), follow, &mut |entry| {
                    if !entry.is_dir {
                        files += 1;
                    }
                    Ok(())
                })
                .unwrap();
            files
        };
        assert_eq!(count_files(false), 0);
        assert_eq!(count_files(true), 1);
    }

    #[test]
    fn test_stat_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"abcdef").unwrap();

        let fs = OsFileSystem::new();
        let entry = fs.stat(&path).unwrap();
        assert_eq!(entry.size, 6);
        assert!(!entry.is_dir);
        assert_eq!(fs.read(&path).unwrap(), b"abcdef");

        let mut buf = String::new();
        fs.open(&path).unwrap().read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "abcdef");
    }
}
