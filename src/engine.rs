//! Execution engine.
//!
//! Drains the work queue and runs each item's conversion and metadata
//! extraction on a rayon pool. A running-count gate caps how many items are
//! in flight, so a full pool leaves items in the bounded work queue and the
//! scheduler blocks behind it.
//!
//! ## Per-item decision
//!
//! | | Skip policy | Other policies |
//! |---|---|---|
//! | **convert** | only if the target is missing | always (the executor may still keep the target) |
//! | **extract** | only if the path is not yet stored | always |
//!
//! Extraction additionally requires metadata to be enabled. An item needing
//! neither is recorded as skipped without being dispatched.
//!
//! Cancellation stops dispatching; items already dispatched run to the end.
//! A conversion that has not started yet when cancellation arrives is
//! dropped and the item left unaccounted, so its folder stays `Working` and
//! ends the run as `Cancelled`.

use crate::cancel::CancelToken;
use crate::convert::{ConvertOptions, convert};
use crate::imaging::ImageBackend;
use crate::metadata::{self, PhotoRecord};
use crate::paths::{mirror_path, store_key};
use crate::types::{
    ExistingFileAction, FolderStatus, ItemOutcome, RunState, SyncEvent, WorkItem,
};
use crossbeam_channel::{Receiver, Sender, select};
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, mpsc};

/// Counts from one engine run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Items handed to the pool.
    pub dispatched: usize,
    /// Items recorded as skipped without dispatch.
    pub skipped_early: usize,
    pub copied: usize,
    pub extracted: usize,
    pub failed: usize,
    /// Dispatched items whose conversion was dropped by cancellation.
    pub cancelled: usize,
}

#[derive(Default)]
struct Counters {
    dispatched: AtomicUsize,
    skipped_early: AtomicUsize,
    copied: AtomicUsize,
    extracted: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn stats(&self) -> EngineStats {
        EngineStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            skipped_early: self.skipped_early.load(Ordering::Relaxed),
            copied: self.copied.load(Ordering::Relaxed),
            extracted: self.extracted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

/// Caps the number of items in flight.
struct Gate {
    running: Mutex<usize>,
    freed: Condvar,
    limit: usize,
}

impl Gate {
    fn new(limit: usize) -> Self {
        Self {
            running: Mutex::new(0),
            freed: Condvar::new(),
            limit: limit.max(1),
        }
    }

    fn acquire(&self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        while *running >= self.limit {
            running = self.freed.wait(running).unwrap_or_else(|e| e.into_inner());
        }
        *running += 1;
    }

    fn release(&self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        *running = running.saturating_sub(1);
        self.freed.notify_one();
    }
}

/// What to do for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Plan {
    target: PathBuf,
    convert: bool,
    extract: bool,
}

pub struct Engine<'a> {
    pub source_root: &'a Path,
    pub target_root: &'a Path,
    pub backend: &'a dyn ImageBackend,
    pub convert_options: ConvertOptions,
    pub extract_metadata: bool,
    /// Paths already in the metadata store when the run started.
    pub existing_meta: &'a HashSet<String>,
    pub concurrency: usize,
    pub follow_progress: bool,
    pub state: &'a RunState,
    pub cancel: &'a CancelToken,
    pub events: Option<mpsc::Sender<SyncEvent>>,
}

impl Engine<'_> {
    /// Process work items until the queue closes or the run is cancelled.
    /// Returns once every dispatched item has finished; `records` and all
    /// its clones are dropped by then.
    pub fn run(
        &self,
        pool: &rayon::ThreadPool,
        work: Receiver<WorkItem>,
        records: Sender<PhotoRecord>,
    ) -> EngineStats {
        let gate = Gate::new(self.concurrency);
        let counters = Counters::default();
        info!("Engine started with {} workers", gate.limit);

        pool.in_place_scope(|scope| {
            loop {
                if self.cancel.is_cancelled() {
                    break;
                }
                let item = select! {
                    recv(work) -> msg => match msg {
                        Ok(item) => item,
                        Err(_) => break,
                    },
                    recv(self.cancel.signal()) -> _ => break,
                };
                if self.cancel.is_cancelled() {
                    break;
                }

                let Some(plan) = self.plan(&item) else {
                    Counters::bump(&counters.failed);
                    self.report_failure(&item.source, "source is outside the source root");
                    self.finish_item(&item, ItemOutcome {
                        failed: true,
                        ..ItemOutcome::default()
                    });
                    continue;
                };
                if !plan.convert && !plan.extract {
                    debug!("Nothing to do for {}", item.source.display());
                    Counters::bump(&counters.skipped_early);
                    self.finish_item(&item, ItemOutcome::skipped());
                    continue;
                }

                gate.acquire();
                if self.cancel.is_cancelled() {
                    gate.release();
                    break;
                }
                Counters::bump(&counters.dispatched);
                self.state.worker_started();

                let records = records.clone();
                let gate = &gate;
                let counters = &counters;
                scope.spawn(move |_| {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                        self.process_item(&item, &plan, &records)
                    }))
                    .unwrap_or_else(|_| {
                        self.report_failure(&item.source, "worker panicked");
                        ItemOutcome {
                            failed: true,
                            ..ItemOutcome::default()
                        }
                    });

                    if outcome.copied {
                        Counters::bump(&counters.copied);
                    }
                    if outcome.meta_extracted {
                        Counters::bump(&counters.extracted);
                    }
                    if outcome.failed {
                        Counters::bump(&counters.failed);
                    }
                    if outcome.cancelled {
                        Counters::bump(&counters.cancelled);
                    }
                    self.finish_item(&item, outcome);
                    self.state.worker_finished();
                    gate.release();
                });
            }
        });

        let stats = counters.stats();
        info!(
            "Engine finished: {} dispatched, {} copied, {} extracted, {} failed",
            stats.dispatched, stats.copied, stats.extracted, stats.failed
        );
        stats
    }

    fn plan(&self, item: &WorkItem) -> Option<Plan> {
        let target = mirror_path(&item.source, self.source_root, self.target_root)?;
        let skip_existing = self.state.existing_file_action() == ExistingFileAction::Skip;
        let convert = !(skip_existing && target.exists());
        let extract = self.extract_metadata
            && !(skip_existing && self.existing_meta.contains(&store_key(&item.source)));
        Some(Plan {
            target,
            convert,
            extract,
        })
    }

    fn process_item(
        &self,
        item: &WorkItem,
        plan: &Plan,
        records: &Sender<PhotoRecord>,
    ) -> ItemOutcome {
        let mut outcome = ItemOutcome::default();

        if plan.extract {
            match metadata::extract(&item.source) {
                Ok(record) => outcome.meta_extracted = records.send(record).is_ok(),
                Err(e) => {
                    self.report_failure(&item.source, &format!("metadata: {e}"));
                    outcome.failed = true;
                }
            }
        }

        if plan.convert {
            if self.cancel.is_cancelled() {
                debug!("Cancelled before converting {}", item.source.display());
                outcome.cancelled = true;
                return outcome;
            }
            match convert(
                self.backend,
                &item.source,
                &plan.target,
                &self.convert_options,
            ) {
                Ok(copied) => outcome.copied = copied,
                Err(e) => {
                    self.report_failure(&item.source, &format!("conversion: {e}"));
                    outcome.failed = true;
                }
            }
        }
        outcome
    }

    fn finish_item(&self, item: &WorkItem, outcome: ItemOutcome) {
        let progress = item.folder.record_outcome(outcome);
        let Some(tx) = &self.events else {
            return;
        };
        if progress.status == FolderStatus::Done && progress.processed() == progress.total_count
        {
            tx.send(SyncEvent::FolderStatus {
                folder: Arc::clone(&item.folder),
                status: FolderStatus::Done,
            })
            .ok();
        }
        if self.follow_progress {
            tx.send(SyncEvent::ItemCompleted(Arc::clone(&item.folder)))
                .ok();
        }
    }

    fn report_failure(&self, path: &Path, message: &str) {
        warn!("{}: {}", path.display(), message);
        if let Some(tx) = &self.events {
            tx.send(SyncEvent::ItemFailed {
                path: path.to_path_buf(),
                message: message.to_string(),
            })
            .ok();
        }
    }
}
