//! Folder scheduler.
//!
//! Takes folders from the scanner in discovery order and, for each one:
//!
//! 1. marks it `Working`;
//! 2. creates the mirrored target directory, or reconciles an existing one
//!    (target-only files and subfolders are deleted, counts recorded on the
//!    folder);
//! 3. stops the run here if cancellation was requested, marking the folder
//!    `Cancelled`;
//! 4. enqueues one [`WorkItem`] per source file on the bounded work queue,
//!    blocking while the queue is full.
//!
//! A folder whose source vanished since the scan is marked `Skipped`; one
//! whose target directory cannot be prepared is marked `Error`. Neither gets
//! any work enqueued.

use crate::cancel::CancelToken;
use crate::paths::{dir_key, file_keys, mirror_path};
use crate::reconcile::{Deletions, Reconciler, SourceListing};
use crate::types::{FolderStatus, FolderUnit, SyncEvent, WorkItem};
use crossbeam_channel::{Receiver, Sender, select};
use log::{debug, info, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;

/// Counts from one scheduling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleStats {
    pub folders: usize,
    pub items: usize,
    pub deletions: Deletions,
    pub errors: usize,
}

enum Flow {
    Continue,
    Stop,
}

pub struct Scheduler<'a> {
    source_root: PathBuf,
    target_root: PathBuf,
    reconciler: &'a Reconciler,
    cancel: &'a CancelToken,
    events: Option<mpsc::Sender<SyncEvent>>,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        source_root: impl Into<PathBuf>,
        target_root: impl Into<PathBuf>,
        reconciler: &'a Reconciler,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            target_root: target_root.into(),
            reconciler,
            cancel,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Option<mpsc::Sender<SyncEvent>>) -> Self {
        self.events = events;
        self
    }

    /// Schedule folders until the scanner is done or the run is cancelled.
    /// `work` is dropped on return, which tells the engine nothing more is
    /// coming.
    pub fn run(&self, folders: Receiver<Arc<FolderUnit>>, work: Sender<WorkItem>) -> ScheduleStats {
        let mut stats = ScheduleStats::default();
        info!("Scheduler started");

        loop {
            let folder = select! {
                recv(folders) -> msg => match msg {
                    Ok(f) => f,
                    Err(_) => break,
                },
                recv(self.cancel.signal()) -> _ => break,
            };
            if self.cancel.is_cancelled() {
                break;
            }
            stats.folders += 1;
            if let Flow::Stop = self.schedule_folder(&folder, &work, &mut stats) {
                break;
            }
        }

        info!(
            "Scheduler finished: {} folders, {} items queued",
            stats.folders, stats.items
        );
        stats
    }

    fn set_status(&self, folder: &Arc<FolderUnit>, status: FolderStatus) {
        if folder.advance(status)
            && let Some(tx) = &self.events
        {
            tx.send(SyncEvent::FolderStatus {
                folder: Arc::clone(folder),
                status,
            })
            .ok();
        }
    }

    fn schedule_folder(
        &self,
        folder: &Arc<FolderUnit>,
        work: &Sender<WorkItem>,
        stats: &mut ScheduleStats,
    ) -> Flow {
        self.set_status(folder, FolderStatus::Working);

        if !folder.path().is_dir() {
            debug!("{} disappeared before scheduling", folder.path().display());
            self.set_status(folder, FolderStatus::Skipped);
            return Flow::Continue;
        }

        match self.prepare_target(folder) {
            Ok(deletions) => {
                folder.add_deletions(deletions.files, deletions.folders);
                stats.deletions.files += deletions.files;
                stats.deletions.folders += deletions.folders;
            }
            Err(e) => {
                warn!(
                    "Cannot prepare target for {}: {}",
                    folder.path().display(),
                    e
                );
                stats.errors += 1;
                self.set_status(folder, FolderStatus::Error);
                return Flow::Continue;
            }
        }

        if self.cancel.is_cancelled() {
            self.set_status(folder, FolderStatus::Cancelled);
            return Flow::Stop;
        }

        if folder.files().is_empty() {
            self.set_status(folder, FolderStatus::Done);
            return Flow::Continue;
        }

        for source in folder.files() {
            let item = WorkItem {
                source: source.clone(),
                folder: Arc::clone(folder),
            };
            select! {
                send(work, item) -> res => {
                    if res.is_err() {
                        warn!("Work queue closed; stopping scheduler");
                        return Flow::Stop;
                    }
                    stats.items += 1;
                }
                recv(self.cancel.signal()) -> _ => {
                    self.set_status(folder, FolderStatus::Cancelled);
                    return Flow::Stop;
                }
            }
        }
        Flow::Continue
    }

    /// Create the target directory, or reconcile it if it already exists.
    fn prepare_target(&self, folder: &FolderUnit) -> io::Result<Deletions> {
        let target = mirror_path(folder.path(), &self.source_root, &self.target_root)
            .ok_or_else(|| {
                io::Error::other(format!(
                    "{} is outside {}",
                    folder.path().display(),
                    self.source_root.display()
                ))
            })?;

        if !target.exists() {
            fs::create_dir_all(&target)?;
            return Ok(Deletions::default());
        }

        let listing = SourceListing {
            files: file_keys(folder.files()),
            dirs: source_subdir_keys(folder.path())?,
        };
        self.reconciler.reconcile(&target, &listing)
    }
}

fn source_subdir_keys(dir: &Path) -> io::Result<std::collections::HashSet<String>> {
    let mut keys = std::collections::HashSet::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            keys.insert(dir_key(&path));
        }
    }
    Ok(keys)
}
