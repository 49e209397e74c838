//! Run orchestration.
//!
//! One call to [`run`] performs a full one-shot pass over the source tree.
//! Four stages run on their own threads, connected by channels:
//!
//! ```text
//!  Scanner ──folders (unbounded)──▶ Scheduler ──work items (bounded 200)──▶ Engine ──records (unbounded)──▶ Writer
//!     │                                 │                                     │
//!     └── FolderSet (for observers)     └── target dirs created/reconciled    └── rayon pool, N items in flight
//! ```
//!
//! Each stage finishes when its input channel closes, so completion flows
//! downstream without polling. Cancellation is cooperative: every stage
//! checks the shared [`CancelToken`] at its checkpoints, in-flight items run
//! to the end, and any folder still `Working` afterwards is marked
//! `Cancelled`.

use crate::cancel::CancelToken;
use crate::config::{ConfigError, ResizeConfig, SyncConfig, effective_threads};
use crate::convert::ConvertOptions;
use crate::engine::{Engine, EngineStats};
use crate::imaging::{CommandBackend, ImageBackend, Quality, RustBackend};
use crate::metadata::PhotoRecord;
use crate::reconcile::Reconciler;
use crate::scan::{ScanStats, Scanner};
use crate::schedule::{ScheduleStats, Scheduler};
use crate::store::{self, JsonPhotoStore, PhotoStore};
use crate::types::{
    FolderProgress, FolderSet, FolderStatus, FolderUnit, RunState, SyncEvent, WorkItem,
};
use crate::writer::{BatchWriter, WriterStats};
use crossbeam_channel::{bounded, unbounded};
use log::info;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Capacity of the scheduler → engine queue. A full queue blocks the
/// scheduler.
pub const WORK_QUEUE_CAPACITY: usize = 200;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("The {0} stage panicked")]
    StagePanicked(&'static str),
}

/// Final state of one folder.
#[derive(Debug, Clone)]
pub struct FolderReport {
    pub path: PathBuf,
    pub progress: FolderProgress,
}

/// Sums over every folder, plus target entries pruned by the scanner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncTotals {
    pub folders: usize,
    pub files: usize,
    pub copied: usize,
    pub skipped: usize,
    pub metadata: usize,
    pub failed: usize,
    pub deleted_files: usize,
    pub deleted_folders: usize,
}

/// Outcome of one sync run.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// In discovery order.
    pub folders: Vec<FolderReport>,
    pub totals: SyncTotals,
    pub scan: ScanStats,
    pub schedule: ScheduleStats,
    pub engine: EngineStats,
    pub writer: WriterStats,
    /// Records in the metadata store after the run.
    pub store_count: usize,
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl SyncReport {
    pub fn folder(&self, path: &std::path::Path) -> Option<&FolderReport> {
        self.folders.iter().find(|f| f.path == path)
    }
}

/// Backend selected by `[resize] tool`: external command if set, built-in
/// otherwise.
pub fn backend_from_config(resize: &ResizeConfig) -> Box<dyn ImageBackend> {
    match &resize.tool {
        Some(tool) => Box::new(CommandBackend::new(
            tool.clone(),
            Duration::from_secs(resize.timeout_secs),
        )),
        None => Box::new(RustBackend::new()),
    }
}

/// Validate `config` as a sync would and list the folders it would
/// process. The target tree is not touched.
pub fn check(config: &SyncConfig) -> Result<Vec<Arc<FolderUnit>>, SyncError> {
    config.validate()?;
    config.validate_roots()?;
    Ok(crate::scan::discover(&config.source, &config.sync.extensions))
}

/// Run a sync with the backend and JSON store described by `config`.
pub fn run(
    config: &SyncConfig,
    cancel: &CancelToken,
    events: Option<mpsc::Sender<SyncEvent>>,
) -> Result<SyncReport, SyncError> {
    let backend = backend_from_config(&config.resize);
    let store_path = config.resolve_store_path();
    let mut store = if config.metadata.enabled {
        JsonPhotoStore::open(store_path)
    } else {
        JsonPhotoStore::empty(store_path)
    };
    run_with(config, backend.as_ref(), &mut store, cancel, events)
}

/// Run a sync with an explicit backend and store.
pub fn run_with(
    config: &SyncConfig,
    backend: &dyn ImageBackend,
    store: &mut dyn PhotoStore,
    cancel: &CancelToken,
    events: Option<mpsc::Sender<SyncEvent>>,
) -> Result<SyncReport, SyncError> {
    config.validate()?;
    config.validate_roots()?;
    let started = Instant::now();
    info!(
        "Syncing {} → {}",
        config.source.display(),
        config.target.display()
    );

    let state = RunState::new(config.sync.existing_files);
    let folders = FolderSet::new();
    let store_path = config.resolve_store_path();
    let reconciler = Reconciler::new(vec![store::temp_path(&store_path), store_path]);

    // Taken once; not refreshed while the run writes new records
    let existing_meta: HashSet<String> = if config.metadata.enabled {
        store.all_paths()
    } else {
        HashSet::new()
    };

    let threads = effective_threads(&config.processing);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("lowres-worker-{i}"))
        .build()?;

    let (folder_tx, folder_rx) = unbounded::<Arc<FolderUnit>>();
    let (work_tx, work_rx) = bounded::<WorkItem>(WORK_QUEUE_CAPACITY);
    let (record_tx, record_rx) = unbounded::<PhotoRecord>();

    let scanner = Scanner::new(
        &config.source,
        &config.target,
        config.sync.extensions.clone(),
    )
    .with_pruning(reconciler.clone());
    let scheduler = Scheduler::new(&config.source, &config.target, &reconciler, cancel)
        .with_events(events.clone());
    let engine = Engine {
        source_root: &config.source,
        target_root: &config.target,
        backend,
        convert_options: ConvertOptions {
            max_long_side: config.resize.max_long_side,
            existing_files: config.sync.existing_files,
            quality: Quality::new(config.resize.quality),
        },
        extract_metadata: config.metadata.enabled,
        existing_meta: &existing_meta,
        concurrency: threads,
        follow_progress: config.sync.follow_progress,
        state: &state,
        cancel,
        events: events.clone(),
    };
    let writer = BatchWriter::new(store, config.metadata.batch_size).with_events(events.clone());

    let (scan, schedule, engine, writer) = thread::scope(|s| {
        let scan = s.spawn(|| {
            let scan_events = events.clone();
            let stats = scanner.scan(cancel, |folder| {
                folders.push(Arc::clone(&folder));
                if let Some(tx) = &scan_events {
                    tx.send(SyncEvent::FolderDiscovered(Arc::clone(&folder))).ok();
                }
                folder_tx.send(folder).ok();
            });
            drop(folder_tx);
            state.mark_analyze_done();
            stats
        });
        let schedule = s.spawn(|| {
            let stats = scheduler.run(folder_rx, work_tx);
            state.mark_schedule_done();
            stats
        });
        let pool = &pool;
        let engine = s.spawn(move || engine.run(pool, work_rx, record_tx));
        let writer = s.spawn(move || writer.run(record_rx));

        (scan.join(), schedule.join(), engine.join(), writer.join())
    });
    let scan = scan.map_err(|_| SyncError::StagePanicked("scanner"))?;
    let schedule = schedule.map_err(|_| SyncError::StagePanicked("scheduler"))?;
    let engine = engine.map_err(|_| SyncError::StagePanicked("engine"))?;
    let writer = writer.map_err(|_| SyncError::StagePanicked("writer"))?;

    let cancelled = cancel.is_cancelled();
    if cancelled {
        for folder in folders.snapshot() {
            if folder.status() == FolderStatus::Working && folder.advance(FolderStatus::Cancelled) {
                if let Some(tx) = &events {
                    tx.send(SyncEvent::FolderStatus {
                        folder,
                        status: FolderStatus::Cancelled,
                    })
                    .ok();
                }
            }
        }
    }
    state.finish();

    let folder_reports: Vec<FolderReport> = folders
        .snapshot()
        .iter()
        .map(|f| FolderReport {
            path: f.path().to_path_buf(),
            progress: f.snapshot(),
        })
        .collect();
    let mut totals = SyncTotals {
        deleted_files: scan.pruned.files,
        deleted_folders: scan.pruned.folders,
        ..SyncTotals::default()
    };
    for f in &folder_reports {
        let p = &f.progress;
        totals.folders += 1;
        totals.files += p.total_count;
        totals.copied += p.copied_count;
        totals.skipped += p.skipped_count;
        totals.metadata += p.meta_count;
        totals.failed += p.failed_count;
        totals.deleted_files += p.deleted_file_count;
        totals.deleted_folders += p.deleted_folder_count;
    }

    let report = SyncReport {
        folders: folder_reports,
        totals,
        scan,
        schedule,
        engine,
        writer,
        store_count: store.count(),
        elapsed: started.elapsed(),
        cancelled,
    };
    info!(
        "Sync {} in {:.1?}: {} copied, {} skipped, {} failed",
        if cancelled { "cancelled" } else { "finished" },
        report.elapsed,
        totals.copied,
        totals.skipped,
        totals.failed
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::MockBackend;
    use crate::imaging::{BackendError, Dimensions, ResizeParams};
    use crate::store::tests::MemoryStore;
    use crate::test_helpers::write_tree;
    use crate::types::ExistingFileAction;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn config(src: &TempDir, dst: &TempDir) -> SyncConfig {
        let mut config = SyncConfig {
            source: src.path().to_path_buf(),
            target: dst.path().to_path_buf(),
            ..SyncConfig::default()
        };
        config.resize.max_long_side = 1000;
        config.processing.max_processes = Some(2);
        config
    }

    #[test]
    fn scenario_copy_small_resize_large() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("A")).unwrap();
        let one = src.path().join("A/1.jpg");
        let two = src.path().join("A/2.jpg");
        fs::write(&one, b"one").unwrap();
        fs::write(&two, b"two").unwrap();
        let backend = MockBackend::with_dimensions(&[(&one, 500, 500), (&two, 4000, 3000)]);
        let mut store = MemoryStore::new();
        let mut config = config(&src, &dst);
        config.metadata.enabled = false;

        let report =
            run_with(&config, &backend, &mut store, &CancelToken::new(), None).unwrap();

        let a = report.folder(&src.path().join("A")).unwrap();
        assert_eq!(a.progress.status, FolderStatus::Done);
        assert_eq!((a.progress.copied_count, a.progress.skipped_count), (2, 0));
        assert_eq!(fs::read(dst.path().join("A/1.jpg")).unwrap(), b"one");
        assert_eq!(
            backend
                .identify(&dst.path().join("A/2.jpg"))
                .unwrap()
                .long_side(),
            1000
        );
        assert!(!report.cancelled);
    }

    #[test]
    fn store_file_in_target_root_survives_reconciliation() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write_tree(src.path(), &[("root.jpg", 16, 16)]);
        fs::write(dst.path().join("photo-metadata.json"), "{}").unwrap();
        fs::write(dst.path().join("orphan.jpg"), "x").unwrap();
        let backend = MockBackend::with_dimensions(&[(&src.path().join("root.jpg"), 16, 16)]);
        let mut store = MemoryStore::new();

        let report =
            run_with(&config(&src, &dst), &backend, &mut store, &CancelToken::new(), None)
                .unwrap();

        assert!(dst.path().join("photo-metadata.json").exists());
        assert!(!dst.path().join("orphan.jpg").exists());
        assert_eq!(report.totals.deleted_files, 1);
        assert_eq!(report.store_count, 1);
    }

    #[test]
    fn second_run_with_skip_does_no_work() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write_tree(src.path(), &[("A/1.jpg", 16, 16), ("A/B/2.jpg", 24, 12)]);
        let backend = MockBackend::with_dimensions(&[
            (&src.path().join("A/1.jpg"), 16, 16),
            (&src.path().join("A/B/2.jpg"), 24, 12),
        ]);
        let mut store = MemoryStore::new();
        let config = config(&src, &dst);

        let first = run_with(&config, &backend, &mut store, &CancelToken::new(), None).unwrap();
        assert_eq!(first.totals.copied, 2);
        assert_eq!(first.writer.committed, 2);

        let second = run_with(&config, &backend, &mut store, &CancelToken::new(), None).unwrap();
        assert_eq!(second.engine.dispatched, 0);
        assert_eq!(second.totals.copied, 0);
        assert_eq!(second.totals.metadata, 0);
        assert_eq!(second.totals.skipped, 2);
        assert!(
            second
                .folders
                .iter()
                .all(|f| f.progress.status == FolderStatus::Done)
        );
    }

    #[test]
    fn cancelled_before_start_leaves_folders_pending() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write_tree(src.path(), &[("A/1.jpg", 16, 16)]);
        let backend = MockBackend::new();
        let mut store = MemoryStore::new();
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = run_with(&config(&src, &dst), &backend, &mut store, &cancel, None).unwrap();

        assert!(report.cancelled);
        assert!(
            report
                .folders
                .iter()
                .all(|f| f.progress.status == FolderStatus::Pending)
        );
        assert!(backend.get_operations().is_empty());
    }

    /// Every resize waits, then cancels the run before writing its output.
    struct CancellingBackend {
        cancel: CancelToken,
    }

    impl ImageBackend for CancellingBackend {
        fn identify(&self, _path: &Path) -> Result<Dimensions, BackendError> {
            Ok(Dimensions {
                width: 4000,
                height: 3000,
            })
        }

        fn resize(&self, params: &ResizeParams) -> Result<(), BackendError> {
            std::thread::sleep(Duration::from_millis(300));
            self.cancel.cancel();
            fs::write(&params.output, b"resized")?;
            Ok(())
        }
    }

    #[test]
    fn cancel_mid_run_cancels_in_flight_folders_only() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        // More files than the work queue holds, so the scheduler is still
        // blocked on folder A when the cancel arrives
        let a_files = WORK_QUEUE_CAPACITY + 3;
        fs::create_dir_all(src.path().join("A")).unwrap();
        for i in 0..a_files {
            fs::write(src.path().join(format!("A/{i:03}.jpg")), b"a").unwrap();
        }
        fs::create_dir_all(src.path().join("B")).unwrap();
        fs::write(src.path().join("B/1.jpg"), b"b").unwrap();

        let cancel = CancelToken::new();
        let backend = CancellingBackend {
            cancel: cancel.clone(),
        };
        let mut store = MemoryStore::new();
        let mut config = config(&src, &dst);
        config.processing.max_processes = Some(1);
        config.metadata.enabled = false;

        let report = run_with(&config, &backend, &mut store, &cancel, None).unwrap();

        assert!(report.cancelled);
        let a = report.folder(&src.path().join("A")).unwrap();
        assert_eq!(a.progress.status, FolderStatus::Cancelled);
        assert_eq!(a.progress.copied_count, 1);
        let b = report.folder(&src.path().join("B")).unwrap();
        assert_eq!(b.progress.status, FolderStatus::Pending);
        assert!(!dst.path().join("B").exists());
        assert_eq!(fs::read_dir(dst.path().join("A")).unwrap().count(), 1);

        for folder in &report.folders {
            assert_ne!(folder.progress.status, FolderStatus::Working);
            if folder.progress.status == FolderStatus::Done {
                let rel = folder.path.strip_prefix(src.path()).unwrap();
                for entry in fs::read_dir(&folder.path).unwrap() {
                    let name = entry.unwrap().file_name();
                    assert!(dst.path().join(rel).join(name).exists());
                }
            }
        }
    }

    #[test]
    fn check_lists_folders_without_touching_target() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write_tree(src.path(), &[("A/1.jpg", 8, 8), ("A/2.jpg", 8, 8)]);
        fs::write(dst.path().join("orphan.jpg"), "x").unwrap();

        let folders = check(&config(&src, &dst)).unwrap();

        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].files().len(), 2);
        assert!(dst.path().join("orphan.jpg").exists());
        assert!(!dst.path().join("A").exists());
    }

    #[test]
    fn check_rejects_nested_roots() {
        let src = TempDir::new().unwrap();
        write_tree(src.path(), &[("A/1.jpg", 8, 8)]);
        let config = SyncConfig {
            source: src.path().to_path_buf(),
            target: src.path().join("lowres"),
            ..SyncConfig::default()
        };

        assert!(matches!(check(&config), Err(SyncError::Config(_))));
    }

    #[test]
    fn invalid_roots_are_rejected() {
        let src = TempDir::new().unwrap();
        let backend = MockBackend::new();
        let mut store = MemoryStore::new();
        let config = SyncConfig {
            source: src.path().to_path_buf(),
            target: src.path().join("inside"),
            ..SyncConfig::default()
        };

        let result = run_with(&config, &backend, &mut store, &CancelToken::new(), None);
        assert!(matches!(result, Err(SyncError::Config(_))));
    }

    #[test]
    fn overwrite_policy_rebuilds_targets() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("A")).unwrap();
        fs::create_dir_all(dst.path().join("A")).unwrap();
        let big = src.path().join("A/big.jpg");
        fs::write(&big, b"big").unwrap();
        fs::write(dst.path().join("A/big.jpg"), b"stale").unwrap();
        let backend = MockBackend::with_dimensions(&[(&big, 3000, 2000)]);
        let mut store = MemoryStore::new();
        let mut config = config(&src, &dst);
        config.sync.existing_files = ExistingFileAction::Overwrite;
        config.metadata.enabled = false;

        let report = run_with(&config, &backend, &mut store, &CancelToken::new(), None).unwrap();

        assert_eq!(report.totals.copied, 1);
        assert_eq!(fs::read(dst.path().join("A/big.jpg")).unwrap(), b"resized");
    }

    #[test]
    fn events_cover_discovery_and_completion() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write_tree(src.path(), &[("A/1.jpg", 16, 16)]);
        let backend = MockBackend::with_dimensions(&[(&src.path().join("A/1.jpg"), 16, 16)]);
        let mut store = MemoryStore::new();
        let (tx, rx) = mpsc::channel();

        run_with(
            &config(&src, &dst),
            &backend,
            &mut store,
            &CancelToken::new(),
            Some(tx),
        )
        .unwrap();

        let events: Vec<_> = rx.iter().collect();
        assert!(matches!(events.first(), Some(SyncEvent::FolderDiscovered(_))));
        assert!(events.iter().any(|e| matches!(
            e,
            SyncEvent::FolderStatus {
                status: FolderStatus::Done,
                ..
            }
        )));
        assert!(
            events
                .iter()
                .any(|e| matches!(e, SyncEvent::BatchCommitted { added: 1, total: 1 }))
        );
    }
}
