use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::file::filter::PathFilter;

/// Walks a directory tree (or a single file) and yields the regular files
/// that pass the filter. Symbolic links are never followed nor yielded.
#[derive(Debug)]
pub struct PathSelector {
    root: PathBuf,
    filter: PathFilter,
}

impl PathSelector {
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when `root` does not exist.
    pub fn new(root: impl Into<PathBuf>, filter: PathFilter) -> Result<Self> {
        let root = root.into();
        if std::fs::symlink_metadata(&root).is_err() {
            return Err(Error::config(format!("path not found: {}", root.display())));
        }

        Ok(Self { root, filter })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Selected paths in file-name order within each directory.
    pub fn paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
        WalkDir::new(&self.root)
            .follow_links(false)
            .follow_root_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .filter(|path| self.filter.allows(path))
    }
}
