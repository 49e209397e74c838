//! Source tree scanner.
//!
//! Walks the source root depth-first, pre-order, siblings in name order, and
//! publishes one [`FolderUnit`] for every directory holding at least one
//! image with a configured extension:
//!
//! ```text
//! photos/                 → (no images: target counterpart pruned)
//! ├── 2023/               → (no images: target counterpart pruned)
//! │   └── Summer/         → FolderUnit { files: [a.jpg, b.JPG] }
//! │       ├── a.jpg
//! │       └── b.JPG
//! └── Misc/               → FolderUnit { files: [c.jpeg] }
//!     ├── c.jpeg
//!     └── notes.txt       (ignored)
//! ```
//!
//! Directories without images are never scheduled, so the scanner cleans
//! their target counterparts itself when pruning is enabled: any target file
//! or subfolder with no source counterpart is removed.
//!
//! A directory that cannot be listed is logged and its subtree skipped; the
//! walk continues with its siblings.

use crate::cancel::CancelToken;
use crate::paths::{dir_key, has_extension, mirror_path};
use crate::reconcile::{Deletions, Reconciler, SourceListing};
use crate::types::FolderUnit;
use log::{debug, info, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Counts from one walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub folders: usize,
    pub images: usize,
    /// Target entries removed under image-less source directories.
    pub pruned: Deletions,
    pub unreadable_dirs: usize,
}

pub struct Scanner {
    source_root: PathBuf,
    target_root: PathBuf,
    extensions: Vec<String>,
    pruner: Option<Reconciler>,
}

/// Image files and subdirectories of one source directory.
struct DirListing {
    images: Vec<PathBuf>,
    subdirs: Vec<PathBuf>,
}

fn list_dir(dir: &Path, extensions: &[String]) -> io::Result<DirListing> {
    let mut images = Vec::new();
    let mut subdirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            subdirs.push(path);
        } else if path.is_file() && has_extension(&path, extensions) {
            images.push(path);
        }
    }
    images.sort();
    subdirs.sort();
    Ok(DirListing { images, subdirs })
}

impl Scanner {
    /// Scanner that only discovers; it never touches the target tree.
    pub fn new(
        source_root: impl Into<PathBuf>,
        target_root: impl Into<PathBuf>,
        extensions: Vec<String>,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            target_root: target_root.into(),
            extensions,
            pruner: None,
        }
    }

    /// Also prune target counterparts of image-less directories.
    pub fn with_pruning(mut self, reconciler: Reconciler) -> Self {
        self.pruner = Some(reconciler);
        self
    }

    /// Walk the tree, handing each discovered folder to `publish` as soon as
    /// it is found. Stops early when `cancel` fires.
    pub fn scan(
        &self,
        cancel: &CancelToken,
        mut publish: impl FnMut(Arc<FolderUnit>),
    ) -> ScanStats {
        let mut stats = ScanStats::default();
        info!("Scanning {}", self.source_root.display());

        let mut walker = WalkDir::new(&self.source_root)
            .sort_by_file_name()
            .into_iter();

        while let Some(entry) = walker.next() {
            if cancel.is_cancelled() {
                debug!("Scan cancelled");
                break;
            }
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Skipping unreadable source entry: {}", e);
                    stats.unreadable_dirs += 1;
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            let dir = entry.path();

            let listing = match list_dir(dir, &self.extensions) {
                Ok(l) => l,
                Err(e) => {
                    warn!("Skipping {}: {}", dir.display(), e);
                    stats.unreadable_dirs += 1;
                    walker.skip_current_dir();
                    continue;
                }
            };

            if listing.images.is_empty() {
                self.prune(dir, &listing, &mut stats);
            } else {
                stats.folders += 1;
                stats.images += listing.images.len();
                debug!("Found {} images in {}", listing.images.len(), dir.display());
                publish(Arc::new(FolderUnit::new(dir.to_path_buf(), listing.images)));
            }
        }

        info!(
            "Scan finished: {} folders, {} images",
            stats.folders, stats.images
        );
        stats
    }

    fn prune(&self, dir: &Path, listing: &DirListing, stats: &mut ScanStats) {
        let Some(reconciler) = &self.pruner else {
            return;
        };
        let Some(target_dir) = mirror_path(dir, &self.source_root, &self.target_root) else {
            return;
        };
        if !target_dir.is_dir() {
            return;
        }
        let source = SourceListing {
            files: Default::default(),
            dirs: listing.subdirs.iter().map(|d| dir_key(d)).collect(),
        };
        match reconciler.reconcile(&target_dir, &source) {
            Ok(d) => {
                stats.pruned.files += d.files;
                stats.pruned.folders += d.folders;
            }
            Err(e) => warn!("Failed to prune {}: {}", target_dir.display(), e),
        }
    }
}

/// Discover every image folder under `source_root` without touching any
/// target tree.
pub fn discover(source_root: &Path, extensions: &[String]) -> Vec<Arc<FolderUnit>> {
    let mut folders = Vec::new();
    Scanner::new(source_root, PathBuf::new(), extensions.to_vec())
        .scan(&CancelToken::new(), |f| folders.push(f));
    folders
}
