//! Shared types passed between the pipeline stages.
//!
//! A [`FolderUnit`] is created by the scanner for every source directory that
//! holds at least one image, handed to the scheduler through the folder queue,
//! and referenced by every [`WorkItem`] the scheduler expands it into. Engine
//! workers update its counters concurrently, so all mutable state sits behind
//! one per-folder mutex. Different folders never share a lock.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

/// Lifecycle of a folder within one run.
///
/// Status only moves forward: `Pending → Working → {Done, Skipped, Error, Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderStatus {
    Pending,
    Working,
    Done,
    Skipped,
    Error,
    Cancelled,
}

impl FolderStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, FolderStatus::Pending | FolderStatus::Working)
    }

    /// Whether `self → next` is a legal forward transition.
    pub fn can_advance_to(self, next: FolderStatus) -> bool {
        match self {
            FolderStatus::Pending => next == FolderStatus::Working,
            FolderStatus::Working => next.is_terminal(),
            _ => false,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FolderStatus::Pending => "pending",
            FolderStatus::Working => "working",
            FolderStatus::Done => "done",
            FolderStatus::Skipped => "skipped",
            FolderStatus::Error => "error",
            FolderStatus::Cancelled => "cancelled",
        }
    }
}

/// Policy applied when the target file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ExistingFileAction {
    /// An existing target blocks reconversion (and metadata re-extraction
    /// when the path is already stored).
    #[default]
    Skip,
    /// Always rebuild the target.
    Overwrite,
    /// Rebuild only when the existing target is smaller than what a fresh
    /// conversion would produce.
    OverwriteIfLowerResolution,
}

/// Point-in-time copy of a folder's progress counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FolderProgress {
    pub status: FolderStatus,
    pub total_count: usize,
    pub copied_count: usize,
    pub skipped_count: usize,
    pub meta_count: usize,
    /// Items that failed (decode error, conversion timeout, ...). Also
    /// counted in `skipped_count` so the folder can still complete.
    pub failed_count: usize,
    pub deleted_file_count: usize,
    pub deleted_folder_count: usize,
}

impl FolderProgress {
    fn new(total_count: usize) -> Self {
        Self {
            status: FolderStatus::Pending,
            total_count,
            copied_count: 0,
            skipped_count: 0,
            meta_count: 0,
            failed_count: 0,
            deleted_file_count: 0,
            deleted_folder_count: 0,
        }
    }

    pub fn processed(&self) -> usize {
        self.copied_count + self.skipped_count
    }
}

/// What happened to one work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ItemOutcome {
    /// The target file was written.
    pub copied: bool,
    /// A photo record was extracted and queued for the store.
    pub meta_extracted: bool,
    pub failed: bool,
    /// Cancellation arrived before the conversion started. The item is not
    /// accounted for, so its folder cannot reach `Done`.
    pub cancelled: bool,
}

impl ItemOutcome {
    pub fn skipped() -> Self {
        Self::default()
    }
}

/// One source directory containing images, tracked for the duration of a run.
#[derive(Debug)]
pub struct FolderUnit {
    path: PathBuf,
    files: Vec<PathBuf>,
    progress: Mutex<FolderProgress>,
}

impl FolderUnit {
    /// Create a pending folder. `files` are the matching image files, sorted.
    pub fn new(path: PathBuf, files: Vec<PathBuf>) -> Self {
        let total = files.len();
        Self {
            path,
            files,
            progress: Mutex::new(FolderProgress::new(total)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    fn lock(&self) -> MutexGuard<'_, FolderProgress> {
        // Counters stay consistent even if a worker panicked mid-update:
        // every mutation is a single field write.
        self.progress.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> FolderProgress {
        *self.lock()
    }

    pub fn status(&self) -> FolderStatus {
        self.lock().status
    }

    /// Move to `next` if that is a forward transition. Returns whether the
    /// status changed.
    pub fn advance(&self, next: FolderStatus) -> bool {
        let mut progress = self.lock();
        if progress.status.can_advance_to(next) {
            progress.status = next;
            true
        } else {
            false
        }
    }

    /// Add deletion counts from target reconciliation.
    pub fn add_deletions(&self, files: usize, folders: usize) {
        let mut progress = self.lock();
        progress.deleted_file_count += files;
        progress.deleted_folder_count += folders;
    }

    /// Record one finished item. Flips a working folder to `Done` once every
    /// file is accounted for. Returns the updated snapshot.
    ///
    /// A cancelled item only contributes its extracted metadata; it neither
    /// counts as processed nor completes the folder.
    pub fn record_outcome(&self, outcome: ItemOutcome) -> FolderProgress {
        let mut progress = self.lock();
        if outcome.cancelled {
            if outcome.meta_extracted {
                progress.meta_count += 1;
            }
            return *progress;
        }
        if progress.processed() < progress.total_count {
            if outcome.copied {
                progress.copied_count += 1;
            } else {
                progress.skipped_count += 1;
            }
            if outcome.meta_extracted {
                progress.meta_count += 1;
            }
            if outcome.failed {
                progress.failed_count += 1;
            }
        }
        if progress.processed() >= progress.total_count
            && progress.status == FolderStatus::Working
        {
            progress.status = FolderStatus::Done;
        }
        *progress
    }
}

/// A single source file waiting for conversion and/or metadata extraction.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub source: PathBuf,
    pub folder: Arc<FolderUnit>,
}

/// Every folder discovered during a run, in discovery order.
///
/// Written by the scanner, read by observers (CLI, report). Folders are never
/// removed during a run.
#[derive(Debug, Default)]
pub struct FolderSet {
    folders: RwLock<Vec<Arc<FolderUnit>>>,
}

impl FolderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, folder: Arc<FolderUnit>) {
        self.folders
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(folder);
    }

    pub fn len(&self) -> usize {
        self.folders.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cheap clone of the current folder list.
    pub fn snapshot(&self) -> Vec<Arc<FolderUnit>> {
        self.folders.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Process-wide flags for one sync invocation. A fresh instance is created
/// for every run, which resets all of them.
#[derive(Debug)]
pub struct RunState {
    syncing: AtomicBool,
    analyze_done: AtomicBool,
    schedule_done: AtomicBool,
    running_workers: AtomicUsize,
    existing_file_action: ExistingFileAction,
}

impl RunState {
    pub fn new(existing_file_action: ExistingFileAction) -> Self {
        Self {
            syncing: AtomicBool::new(true),
            analyze_done: AtomicBool::new(false),
            schedule_done: AtomicBool::new(false),
            running_workers: AtomicUsize::new(0),
            existing_file_action,
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::SeqCst)
    }

    pub fn finish(&self) {
        self.syncing.store(false, Ordering::SeqCst);
    }

    pub fn analyze_done(&self) -> bool {
        self.analyze_done.load(Ordering::SeqCst)
    }

    pub fn mark_analyze_done(&self) {
        self.analyze_done.store(true, Ordering::SeqCst);
    }

    pub fn schedule_done(&self) -> bool {
        self.schedule_done.load(Ordering::SeqCst)
    }

    pub fn mark_schedule_done(&self) {
        self.schedule_done.store(true, Ordering::SeqCst);
    }

    pub fn running_workers(&self) -> usize {
        self.running_workers.load(Ordering::SeqCst)
    }

    pub(crate) fn worker_started(&self) {
        self.running_workers.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn worker_finished(&self) {
        self.running_workers.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn existing_file_action(&self) -> ExistingFileAction {
        self.existing_file_action
    }
}

/// Notifications for the presentation layer.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// The scanner published a new folder.
    FolderDiscovered(Arc<FolderUnit>),
    /// A folder changed status.
    FolderStatus {
        folder: Arc<FolderUnit>,
        status: FolderStatus,
    },
    /// One work item finished. Only sent when progress following is enabled.
    ItemCompleted(Arc<FolderUnit>),
    /// One work item failed; the run continues.
    ItemFailed { path: PathBuf, message: String },
    /// The batch writer committed records to the store.
    BatchCommitted { added: usize, total: usize },
}
