//! Persistent store of [`PhotoRecord`]s keyed by full source path.
//!
//! The sync core only needs a narrow surface from the store, captured by
//! [`PhotoStore`]: list every stored path (for the existing-metadata
//! snapshot), look one up, upsert, commit, and count.
//!
//! ## JSON store
//!
//! [`JsonPhotoStore`] keeps every record in memory and writes the whole set
//! on commit:
//!
//! ```json
//! {
//!   "version": 1,
//!   "records": {
//!     "/photos/2024/a.jpg": { "full_path": "/photos/2024/a.jpg", "name": "a.jpg", ... }
//!   }
//! }
//! ```
//!
//! A missing, unparsable, or wrong-version file loads as an empty store, so a
//! format change simply causes a full re-extraction. Commits write to a
//! temporary sibling and rename it into place; a reader never sees a
//! half-written file.

use crate::metadata::PhotoRecord;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Version of the on-disk format. Bump to invalidate existing stores.
const STORE_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Operations the sync pipeline needs from a metadata store.
pub trait PhotoStore: Send {
    /// Every persisted full path.
    fn all_paths(&self) -> HashSet<String>;

    fn find(&self, full_path: &str) -> Option<&PhotoRecord>;

    /// Insert or replace by `full_path`. Not durable until [`commit`](Self::commit).
    fn upsert(&mut self, record: PhotoRecord);

    /// Persist pending changes. Returns how many records were written.
    /// On error the pending changes stay pending.
    fn commit(&mut self) -> Result<usize, StoreError>;

    fn count(&self) -> usize;
}

/// Sibling file a commit writes before renaming it over `path`.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    records: BTreeMap<String, PhotoRecord>,
}

/// File-backed store. See the module docs for the format.
#[derive(Debug)]
pub struct JsonPhotoStore {
    path: PathBuf,
    records: BTreeMap<String, PhotoRecord>,
    dirty: HashSet<String>,
}

impl JsonPhotoStore {
    /// Store at `path` with no records (nothing is read from disk).
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: BTreeMap::new(),
            dirty: HashSet::new(),
        }
    }

    /// Load from `path`. Falls back to an empty store when the file is
    /// missing or unusable.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return Self::empty(path),
        };
        let file: StoreFile = match serde_json::from_str(&content) {
            Ok(f) => f,
            Err(e) => {
                warn!("Ignoring unreadable metadata store {}: {}", path.display(), e);
                return Self::empty(path);
            }
        };
        if file.version != STORE_VERSION {
            warn!(
                "Ignoring metadata store {} with version {} (expected {})",
                path.display(),
                file.version,
                STORE_VERSION
            );
            return Self::empty(path);
        }
        Self {
            path,
            records: file.records,
            dirty: HashSet::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_atomically(&self) -> Result<(), StoreError> {
        let file = StoreFile {
            version: STORE_VERSION,
            records: self.records.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let tmp = temp_path(&self.path);
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl PhotoStore for JsonPhotoStore {
    fn all_paths(&self) -> HashSet<String> {
        self.records.keys().cloned().collect()
    }

    fn find(&self, full_path: &str) -> Option<&PhotoRecord> {
        self.records.get(full_path)
    }

    fn upsert(&mut self, record: PhotoRecord) {
        self.dirty.insert(record.full_path.clone());
        self.records.insert(record.full_path.clone(), record);
    }

    /// Rewrites the whole file, not just the dirty records. A run that
    /// commits every `batch_size` records therefore writes on the order of
    /// `records² / batch_size` bytes in total; raise the batch size for very
    /// large libraries.
    fn commit(&mut self) -> Result<usize, StoreError> {
        if self.dirty.is_empty() {
            return Ok(0);
        }
        self.write_atomically()?;
        let written = self.dirty.len();
        self.dirty.clear();
        Ok(written)
    }

    fn count(&self) -> usize {
        self.records.len()
    }
}
