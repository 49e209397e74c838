//! Removal of target entries that no longer have a source counterpart.
//!
//! Used in two places:
//! - the scheduler, for every target directory mirroring a source folder
//!   with images, before that folder's work is enqueued;
//! - the scanner, for target directories mirroring source directories that
//!   hold no images (so nothing else would ever clean them).
//!
//! A single entry that cannot be removed is logged and skipped; the rest of
//! the directory is still reconciled.

use crate::paths::{dir_key, file_key};
use log::{debug, warn};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Counts of removed target entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deletions {
    pub files: usize,
    pub folders: usize,
}

/// What a source directory contains, in matching-key form.
#[derive(Debug, Default, Clone)]
pub struct SourceListing {
    /// Keys of the source image files (see [`file_key`]).
    pub files: HashSet<String>,
    /// Keys of every source subdirectory (see [`dir_key`]).
    pub dirs: HashSet<String>,
}

/// Deletes target-only files and subfolders, never touching protected paths.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    protected: Vec<PathBuf>,
}

impl Reconciler {
    /// `protected` paths (e.g. the metadata store file) survive even when
    /// they live inside the target tree.
    pub fn new(protected: Vec<PathBuf>) -> Self {
        Self { protected }
    }

    fn is_protected(&self, path: &Path) -> bool {
        self.protected.iter().any(|p| p.starts_with(path))
    }

    /// Remove everything in `target_dir` that `source` does not cover.
    ///
    /// Returns `Err` only when `target_dir` itself cannot be listed.
    pub fn reconcile(&self, target_dir: &Path, source: &SourceListing) -> io::Result<Deletions> {
        let mut deletions = Deletions::default();

        for entry in fs::read_dir(target_dir)? {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Skipping unreadable entry in {}: {}", target_dir.display(), e);
                    continue;
                }
            };
            let path = entry.path();
            if self.is_protected(&path) {
                continue;
            }
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);

            if is_dir {
                if source.dirs.contains(&dir_key(&path)) {
                    continue;
                }
                match fs::remove_dir_all(&path) {
                    Ok(()) => {
                        debug!("Deleted target-only folder {}", path.display());
                        deletions.folders += 1;
                    }
                    Err(e) => warn!("Failed to delete folder {}: {}", path.display(), e),
                }
            } else {
                if source.files.contains(&file_key(&path)) {
                    continue;
                }
                match fs::remove_file(&path) {
                    Ok(()) => {
                        debug!("Deleted target-only file {}", path.display());
                        deletions.files += 1;
                    }
                    Err(e) => warn!("Failed to delete file {}: {}", path.display(), e),
                }
            }
        }

        Ok(deletions)
    }
}
