//! # lowres-sync
//!
//! Keeps a low-resolution mirror of a full-resolution photo tree. Every image
//! in the source tree gets a counterpart in the target tree at the same
//! relative path, shrunk so its long side fits a configured bound (images
//! that already fit are copied byte for byte). Target entries with no source
//! counterpart are pruned, and EXIF metadata for each photo is collected
//! into a persistent store.
//!
//! # Architecture: Four-Stage Pipeline
//!
//! A run streams work through four concurrent stages:
//!
//! ```text
//! 1. Scan       source tree  →  folders      (one FolderUnit per image directory)
//! 2. Schedule   folders      →  work items   (target dirs created and reconciled)
//! 3. Execute    work items   →  target files + metadata records (bounded worker pool)
//! 4. Write      records      →  metadata store (batched commits)
//! ```
//!
//! Stages talk only through channels, so scanning a large tree overlaps with
//! converting the folders found first. The work queue is bounded: a slow
//! engine throttles the scheduler instead of buffering the whole tree.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`sync`] | Orchestration: wires the stages together and builds the run report |
//! | [`scan`] | Stage 1: walks the source tree, publishes image folders, prunes image-less mirrors |
//! | [`schedule`] | Stage 2: prepares target folders and expands folders into work items |
//! | [`engine`] | Stage 3: runs conversions and metadata extraction on a rayon pool |
//! | [`writer`] | Stage 4: batches metadata records into store commits |
//! | [`convert`] | One conversion: copy or resize, honoring the existing-file policy |
//! | [`metadata`] | EXIF extraction into [`metadata::PhotoRecord`] |
//! | [`store`] | Metadata persistence (`PhotoStore` trait, JSON file store) |
//! | [`reconcile`] | Deletes target entries with no source counterpart |
//! | [`paths`] | Source ↔ target path mapping and comparison keys |
//! | [`imaging`] | Image backends: built-in (`image` crate) and external command |
//! | [`config`] | `lowres-sync.toml` loading, merging, validation |
//! | [`cancel`] | Cooperative cancellation token |
//! | [`types`] | Folder units, run state, events |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Folder Status Only Moves Forward
//!
//! A folder goes `Pending → Working → {Done, Skipped, Error, Cancelled}` and
//! never back. Workers record outcomes concurrently; whichever outcome
//! accounts for the last file flips the folder to `Done`.
//!
//! ## Failures Do Not Stop the Run
//!
//! A file that cannot be decoded, resized, or copied is logged, counted as
//! failed (and as skipped, so its folder still completes), and the run moves
//! on. Only configuration problems abort a run before it starts.
//!
//! ## Cooperative Cancellation
//!
//! Ctrl-C sets a [`cancel::CancelToken`]. No new work is dispatched after
//! that, conversions already running finish, and folders left mid-flight end
//! as `Cancelled`. A second Ctrl-C exits immediately.

pub mod cancel;
pub mod config;
pub mod convert;
pub mod engine;
pub mod imaging;
pub mod metadata;
pub mod output;
pub mod paths;
pub mod reconcile;
pub mod scan;
pub mod schedule;
pub mod store;
pub mod sync;
pub mod types;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_helpers;
