//! Filesystem trait — whole-file reads and writes, directory creation and listing.
//!
//! Every operation reports success or failure; there is no partial-write
//! recovery beyond "the write succeeded or it did not".

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::FsError;

/// A directory entry returned by [`Filesystem::list_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

#[async_trait]
pub trait Filesystem: Send + Sync {
    async fn read_to_string(&self, path: &Path) -> Result<String, FsError>;

    /// Write `content`, creating parent directories as needed.
    async fn write(&self, path: &Path, content: &str) -> Result<(), FsError>;

    async fn create_dir_all(&self, path: &Path) -> Result<(), FsError>;

    /// Entries of a directory, sorted by name.
    async fn list_dir(&self, path: &Path) -> Result<Vec<DirEntry>, FsError>;

    async fn exists(&self, path: &Path) -> bool;
}

/// The local disk, via `tokio::fs`.
#[derive(Debug, Clone, Default)]
pub struct LocalFilesystem;

#[async_trait]
impl Filesystem for LocalFilesystem {
    async fn read_to_string(&self, path: &Path) -> Result<String, FsError> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| FsError::from_io(path, e))
    }

    async fn write(&self, path: &Path, content: &str) -> Result<(), FsError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FsError::from_io(parent, e))?;
        }
        tokio::fs::write(path, content)
            .await
            .map_err(|e| FsError::from_io(path, e))
    }

    async fn create_dir_all(&self, path: &Path) -> Result<(), FsError> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| FsError::from_io(path, e))
    }

    async fn list_dir(&self, path: &Path) -> Result<Vec<DirEntry>, FsError> {
        let mut reader = tokio::fs::read_dir(path)
            .await
            .map_err(|e| FsError::from_io(path, e))?;
        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| FsError::from_io(path, e))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }
}

/// Resolve `path` against `root` unless it is already absolute.
pub fn resolve(root: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_creates_parents_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("dir").join("file.txt");
        let fs = LocalFilesystem;

        fs.write(&path, "nested content").await.unwrap();
        assert!(fs.exists(&path).await);
        assert_eq!(fs.read_to_string(&path).await.unwrap(), "nested content");
    }

    #[tokio::test]
    async fn read_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocalFilesystem
            .read_to_string(&dir.path().join("missing.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, FsError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_dir_is_sorted_and_typed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("a_dir")).unwrap();

        let entries = LocalFilesystem.list_dir(dir.path()).await.unwrap();
        assert_eq!(
            entries,
            vec![
                DirEntry { name: "a_dir".into(), is_dir: true },
                DirEntry { name: "b.txt".into(), is_dir: false },
            ]
        );
    }

    #[test]
    fn resolve_keeps_absolute_paths() {
        let root = Path::new("/work");
        assert_eq!(resolve(root, "src/main.rs"), PathBuf::from("/work/src/main.rs"));
        assert_eq!(resolve(root, "/etc/hosts"), PathBuf::from("/etc/hosts"));
    }
}
