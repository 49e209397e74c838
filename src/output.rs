//! CLI output formatting.
//!
//! Output is **folder-centric**: every line leads with a folder's path
//! relative to the source root (`.` for the root itself), followed by its
//! status or counters. Failures name the file that failed.
//!
//! # Output Format
//!
//! ## Sync events
//!
//! ```text
//! + 2024/Berlin (12 photos)
//!   2024/Berlin: working
//!   2024/Berlin: 3/12
//! ! 2024/Berlin/IMG_0042.jpg: Processing failed: truncated JPEG
//!   2024/Berlin: done
//!   metadata: 50 committed (1250 stored)
//! ```
//!
//! ## Report
//!
//! ```text
//! Folders
//! .             done       2 files, 2 copied, 0 skipped, 2 metadata
//! 2024/Berlin   done      12 files, 11 copied, 1 skipped, 12 metadata, 1 failed
//!
//! Synced 2 folders, 14 files in 3.2s: 13 copied, 1 skipped, 1 failed, 14 metadata
//! Pruned 3 files, 1 folder from target
//! ```
//!
//! ## Check
//!
//! ```text
//! .             2 photos
//! 2024/Berlin  12 photos
//! Found 2 folders, 14 photos
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure.

use crate::sync::SyncReport;
use crate::types::{FolderProgress, FolderUnit, SyncEvent};
use std::path::Path;
use std::sync::Arc;

/// Folder path relative to the source root, `.` for the root.
fn display_path(path: &Path, source_root: &Path) -> String {
    match path.strip_prefix(source_root) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel.to_string_lossy().into_owned(),
        Err(_) => path.to_string_lossy().into_owned(),
    }
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{} {}", n, one)
    } else {
        format!("{} {}", n, many)
    }
}

/// Counter summary for one folder.
///
/// ```text
/// 12 files, 11 copied, 1 skipped, 12 metadata, 1 failed
/// ```
fn progress_summary(p: &FolderProgress) -> String {
    let mut s = format!(
        "{}, {} copied, {} skipped, {} metadata",
        plural(p.total_count, "file", "files"),
        p.copied_count,
        p.skipped_count,
        p.meta_count
    );
    if p.failed_count > 0 {
        s.push_str(&format!(", {} failed", p.failed_count));
    }
    let deleted = p.deleted_file_count + p.deleted_folder_count;
    if deleted > 0 {
        s.push_str(&format!(", {} pruned", deleted));
    }
    s
}

// ============================================================================
// Sync events
// ============================================================================

/// Format one event from a running sync.
pub fn format_sync_event(event: &SyncEvent, source_root: &Path) -> Vec<String> {
    match event {
        SyncEvent::FolderDiscovered(folder) => vec![format!(
            "+ {} ({})",
            display_path(folder.path(), source_root),
            plural(folder.files().len(), "photo", "photos")
        )],
        SyncEvent::FolderStatus { folder, status } => vec![format!(
            "  {}: {}",
            display_path(folder.path(), source_root),
            status.label()
        )],
        SyncEvent::ItemCompleted(folder) => {
            let p = folder.snapshot();
            vec![format!(
                "  {}: {}/{}",
                display_path(folder.path(), source_root),
                p.processed(),
                p.total_count
            )]
        }
        SyncEvent::ItemFailed { path, message } => vec![format!(
            "! {}: {}",
            display_path(path, source_root),
            message
        )],
        SyncEvent::BatchCommitted { added, total } => vec![format!(
            "  metadata: {} committed ({} stored)",
            added, total
        )],
    }
}

// ============================================================================
// Report
// ============================================================================

/// Format the end-of-run report: one line per folder, then totals.
pub fn format_report(report: &SyncReport, source_root: &Path) -> Vec<String> {
    let mut lines = Vec::new();

    let names: Vec<String> = report
        .folders
        .iter()
        .map(|f| display_path(&f.path, source_root))
        .collect();
    let width = names.iter().map(|n| n.chars().count()).max().unwrap_or(0);

    if !report.folders.is_empty() {
        lines.push("Folders".to_string());
        for (name, folder) in names.iter().zip(&report.folders) {
            lines.push(format!(
                "{:<width$}  {:<9} {}",
                name,
                folder.progress.status.label(),
                progress_summary(&folder.progress),
                width = width
            ));
        }
        lines.push(String::new());
    }

    let t = &report.totals;
    let verb = if report.cancelled { "Cancelled after" } else { "Synced" };
    let mut summary = format!(
        "{} {}, {} in {:.1}s: {} copied, {} skipped, {} failed",
        verb,
        plural(t.folders, "folder", "folders"),
        plural(t.files, "file", "files"),
        report.elapsed.as_secs_f64(),
        t.copied,
        t.skipped,
        t.failed
    );
    if t.metadata > 0 {
        summary.push_str(&format!(", {} metadata", t.metadata));
    }
    lines.push(summary);

    if t.deleted_files + t.deleted_folders > 0 {
        lines.push(format!(
            "Pruned {}, {} from target",
            plural(t.deleted_files, "file", "files"),
            plural(t.deleted_folders, "folder", "folders")
        ));
    }
    if report.writer.failed_commits > 0 {
        lines.push(format!(
            "Metadata store: {} failed",
            plural(report.writer.failed_commits, "commit", "commits")
        ));
    }

    lines
}

/// Print the report to stdout.
pub fn print_report(report: &SyncReport, source_root: &Path) {
    for line in format_report(report, source_root) {
        println!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

/// Format the folders a sync would process, without touching the target.
pub fn format_folder_listing(folders: &[Arc<FolderUnit>], source_root: &Path) -> Vec<String> {
    let names: Vec<String> = folders
        .iter()
        .map(|f| display_path(f.path(), source_root))
        .collect();
    let width = names.iter().map(|n| n.chars().count()).max().unwrap_or(0);
    let count_width = folders
        .iter()
        .map(|f| f.files().len().to_string().len())
        .max()
        .unwrap_or(1);

    let mut lines: Vec<String> = names
        .iter()
        .zip(folders)
        .map(|(name, f)| {
            format!(
                "{:<width$}  {:>cw$} {}",
                name,
                f.files().len(),
                if f.files().len() == 1 { "photo" } else { "photos" },
                width = width,
                cw = count_width
            )
        })
        .collect();

    let photos: usize = folders.iter().map(|f| f.files().len()).sum();
    lines.push(format!(
        "Found {}, {}",
        plural(folders.len(), "folder", "folders"),
        plural(photos, "photo", "photos")
    ));
    lines
}

pub fn print_folder_listing(folders: &[Arc<FolderUnit>], source_root: &Path) {
    for line in format_folder_listing(folders, source_root) {
        println!("{}", line);
    }
}
