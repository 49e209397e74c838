//! Mirror-path mapping and the name-matching rules used to decide which
//! target entries still have a source counterpart.
//!
//! ## Matching
//!
//! - **Files** match when their stems (name without extension) are equal,
//!   ignoring ASCII case: `IMG_001.JPG` in the source covers `img_001.jpg`
//!   in the target.
//! - **Directories** match on the full name, ignoring ASCII case.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Substitute the `source_root` prefix of `path` with `target_root`.
///
/// Returns `None` when `path` does not live under `source_root`.
pub fn mirror_path(path: &Path, source_root: &Path, target_root: &Path) -> Option<PathBuf> {
    let relative = path.strip_prefix(source_root).ok()?;
    Some(target_root.join(relative))
}

/// Case-folded stem used to match a target file against source files.
pub fn file_key(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Case-folded directory name used to match target subfolders.
pub fn dir_key(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Set of file keys for a list of source files.
pub fn file_keys<'a>(files: impl IntoIterator<Item = &'a PathBuf>) -> HashSet<String> {
    files.into_iter().map(|p| file_key(p)).collect()
}

/// Whether `path` carries one of `extensions` (compared case-insensitively,
/// without the leading dot).
pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

/// Key used for metadata-store lookups: the full path as a string.
pub fn store_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
