//! File cache — last-known full content per path.
//!
//! The cache is rendered into the model's system instruction every turn, so
//! tool results that merely confirm "this file is now cached" become
//! redundant in the conversation history. Those results carry one of the
//! [`MATERIALIZED_MARKERS`] so the context filter can elide them.

use patchloop_core::error::FsError;
use patchloop_core::fs::Filesystem;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Marker in `edit_and_apply` results once the edited content is cached.
pub const MARKER_UPDATED: &str = "File contents updated in system prompt";
/// Marker in `create_file` results.
pub const MARKER_CREATED: &str = "File created and added to system prompt";
/// Marker in `read_file` / `read_multiple_files` results.
pub const MARKER_READ: &str = "has been read and stored in the system prompt";

/// Tool-result markers meaning "the effect is already captured in the cache".
pub const MATERIALIZED_MARKERS: [&str; 3] = [MARKER_UPDATED, MARKER_CREATED, MARKER_READ];

/// Result of a cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Found(String),
    NotFound,
}

/// Path → content cache shared by the file tools and the context filter.
#[derive(Debug, Default)]
pub struct FileCache {
    entries: RwLock<BTreeMap<PathBuf, String>>,
}

impl FileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, path: &Path) -> CacheLookup {
        match self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
        {
            Some(content) => CacheLookup::Found(content.clone()),
            None => CacheLookup::NotFound,
        }
    }

    /// Record the content this process just wrote or read for `path`.
    pub fn insert(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        let path = path.into();
        debug!(path = %path.display(), "Caching file content");
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path, content.into());
    }

    pub fn remove(&self, path: &Path) -> Option<String> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path)
    }

    /// Return cached content, reading it from `fs` into the cache on a miss.
    pub async fn load(&self, fs: &dyn Filesystem, path: &Path) -> Result<String, FsError> {
        if let CacheLookup::Found(content) = self.lookup(path) {
            return Ok(content);
        }
        let content = fs.read_to_string(path).await?;
        self.insert(path, content.clone());
        Ok(content)
    }

    /// Snapshot of every cached file, ordered by path.
    pub fn entries(&self) -> Vec<(PathBuf, String)> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(p, c)| (p.clone(), c.clone()))
            .collect()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
