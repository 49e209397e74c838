//! Metadata batch writer.
//!
//! Drains extracted [`PhotoRecord`]s from the engine and persists them in
//! batches. A record whose path is already stored with identical contents is
//! dropped; a changed one replaces the stored record. Several records for the
//! same path within one batch collapse into the latest.
//!
//! A failed commit is logged and the staged batch kept, so the next commit
//! retries it. The writer itself never fails.

use crate::metadata::PhotoRecord;
use crate::store::PhotoStore;
use crate::types::SyncEvent;
use crossbeam_channel::Receiver;
use log::{debug, error, info};
use std::collections::HashMap;
use std::sync::mpsc::Sender;

pub const DEFAULT_BATCH_SIZE: usize = 50;

/// What the writer did over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Records received from the engine.
    pub received: usize,
    /// Received records identical to what was already stored.
    pub unchanged: usize,
    /// Records written by successful commits.
    pub committed: usize,
    pub failed_commits: usize,
}

pub struct BatchWriter<'a> {
    store: &'a mut dyn PhotoStore,
    batch_size: usize,
    staged: Vec<PhotoRecord>,
    // full_path → index in `staged`
    staged_index: HashMap<String, usize>,
    events: Option<Sender<SyncEvent>>,
    stats: WriterStats,
}

impl<'a> BatchWriter<'a> {
    pub fn new(store: &'a mut dyn PhotoStore, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            staged: Vec::new(),
            staged_index: HashMap::new(),
            events: None,
            stats: WriterStats::default(),
        }
    }

    pub fn with_events(mut self, events: Option<Sender<SyncEvent>>) -> Self {
        self.events = events;
        self
    }

    /// Consume records until every sender is gone, then commit what is left.
    pub fn run(mut self, records: Receiver<PhotoRecord>) -> WriterStats {
        info!("Metadata writer started (batch size {})", self.batch_size);
        for record in records.iter() {
            self.accept(record);
        }
        self.flush();
        info!(
            "Metadata writer finished: {} received, {} committed",
            self.stats.received, self.stats.committed
        );
        self.stats
    }

    /// Stage one record, committing when the batch is full.
    pub fn accept(&mut self, record: PhotoRecord) {
        self.stats.received += 1;

        if let Some(&i) = self.staged_index.get(&record.full_path) {
            self.staged[i] = record;
            return;
        }
        if self.store.find(&record.full_path) == Some(&record) {
            debug!("Metadata unchanged for {}", record.full_path);
            self.stats.unchanged += 1;
            return;
        }

        self.staged_index
            .insert(record.full_path.clone(), self.staged.len());
        self.staged.push(record);
        if self.staged.len() >= self.batch_size {
            self.flush();
        }
    }

    /// Commit the staged batch. On failure the batch stays staged.
    pub fn flush(&mut self) {
        if self.staged.is_empty() {
            return;
        }
        for record in &self.staged {
            self.store.upsert(record.clone());
        }
        match self.store.commit() {
            Ok(added) => {
                self.stats.committed += added;
                self.staged.clear();
                self.staged_index.clear();
                let total = self.store.count();
                debug!("Committed {} records ({} total)", added, total);
                if let Some(tx) = &self.events {
                    tx.send(SyncEvent::BatchCommitted { added, total }).ok();
                }
            }
            Err(e) => {
                self.stats.failed_commits += 1;
                error!(
                    "Failed to commit {} metadata records: {}",
                    self.staged.len(),
                    e
                );
            }
        }
    }

    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }
}
