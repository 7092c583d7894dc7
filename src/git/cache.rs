//! Handle-local caches derived from repository listings.
//!
//! Both caches start stale and only become fresh when the owning
//! [`Repository`](crate::Repository) fills them. Nothing here spawns git;
//! a stale cache answers "unknown" rather than rebuilding itself.

use crate::error::{GitError, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Whether a cache holds usable data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheState<T> {
    Stale,
    Fresh(T),
}

impl<T> Default for CacheState<T> {
    fn default() -> Self {
        CacheState::Stale
    }
}

impl<T> CacheState<T> {
    pub fn is_fresh(&self) -> bool {
        matches!(self, CacheState::Fresh(_))
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            CacheState::Fresh(value) => Some(value),
            CacheState::Stale => None,
        }
    }
}

/// Absolute paths of files the repository knows about, for O(1) membership checks
#[derive(Debug, Clone, Default)]
pub struct RepoContentIndex {
    files: CacheState<HashSet<PathBuf>>,
    include_unadded: bool,
    orig_file_count: usize,
    new_file_count: usize,
}

impl RepoContentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fresh(&self) -> bool {
        self.files.is_fresh()
    }

    /// Whether the last build counted untracked, unignored files as members
    pub fn include_unadded(&self) -> bool {
        self.include_unadded
    }

    /// Replace the contents with a new listing
    pub fn rebuild<I>(&mut self, files: I, include_unadded: bool)
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let files: HashSet<PathBuf> = files.into_iter().collect();
        self.orig_file_count = files.len();
        self.new_file_count = files.len();
        self.include_unadded = include_unadded;
        self.files = CacheState::Fresh(files);
    }

    /// Membership test; `None` while the index is stale
    pub fn contains(&self, path: &Path) -> Option<bool> {
        self.files.get().map(|files| files.contains(path))
    }

    /// Record a fresh file count and report whether it differs from the built size
    pub fn record_count(&mut self, count: usize) -> Result<bool> {
        if !self.is_fresh() {
            return Err(GitError::IndexNotBuilt);
        }
        self.new_file_count = count;
        Ok(self.new_file_count != self.orig_file_count)
    }

    /// Number of files when the index was built
    pub fn orig_file_count(&self) -> usize {
        self.orig_file_count
    }

    /// Number of files at the last drift check
    pub fn new_file_count(&self) -> usize {
        self.new_file_count
    }

    pub fn len(&self) -> usize {
        self.files.get().map_or(0, HashSet::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn invalidate(&mut self) {
        *self = Self::default();
    }
}

/// Absolute paths of ignored files, in the order git listed them
#[derive(Debug, Clone, Default)]
pub struct IgnoredFilesCache {
    files: CacheState<Vec<PathBuf>>,
}

impl IgnoredFilesCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fresh(&self) -> bool {
        self.files.is_fresh()
    }

    pub fn fill(&mut self, files: Vec<PathBuf>) {
        self.files = CacheState::Fresh(files);
    }

    pub fn get(&self) -> Option<&[PathBuf]> {
        self.files.get().map(Vec::as_slice)
    }

    pub fn invalidate(&mut self) {
        self.files = CacheState::Stale;
    }
}
