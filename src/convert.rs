//! Conversion executor: produce one low-resolution target file.
//!
//! The decision table, given the source long side `S`, the configured bound
//! `M` and `E = min(M, S)`:
//!
//! | Target exists? | Condition | Action |
//! |---|---|---|
//! | yes | policy is overwrite-if-lower-resolution and target long side ≥ `E` | keep, no write |
//! | yes | `S ≤ M` | keep, no write |
//! | yes | otherwise | delete, then continue below |
//! | no | `S ≤ M` | byte-for-byte copy |
//! | no | `S > M` | resize to long side `E` |
//!
//! The source is always re-identified here rather than reusing dimensions
//! from a metadata pass; the two run independently.

use crate::imaging::{BackendError, ImageBackend, Quality, ResizeParams, effective_long_side};
use crate::types::ExistingFileAction;
use log::debug;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Settings shared by every conversion in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertOptions {
    pub max_long_side: u32,
    pub existing_files: ExistingFileAction,
    pub quality: Quality,
}

/// Convert `source` into `target`. Returns whether `target` was written.
pub fn convert(
    backend: &dyn ImageBackend,
    source: &Path,
    target: &Path,
    options: &ConvertOptions,
) -> Result<bool, ConvertError> {
    let source_long = backend.identify(source)?.long_side();
    let effective = effective_long_side(options.max_long_side, source_long);

    if target.exists() {
        if options.existing_files == ExistingFileAction::OverwriteIfLowerResolution {
            // An unreadable target counts as lower resolution
            if let Ok(dims) = backend.identify(target)
                && dims.long_side() >= effective
            {
                debug!("{} already at {}px, keeping", target.display(), dims.long_side());
                return Ok(false);
            }
        }
        if source_long <= options.max_long_side {
            debug!("{} is already small, keeping target", source.display());
            return Ok(false);
        }
        fs::remove_file(target)?;
    }

    if source_long <= options.max_long_side {
        fs::copy(source, target)?;
        debug!("Copied {} → {}", source.display(), target.display());
    } else {
        backend.resize(&ResizeParams {
            source: source.to_path_buf(),
            output: target.to_path_buf(),
            long_side: effective,
            quality: options.quality,
        })?;
        debug!(
            "Resized {} → {} ({}px)",
            source.display(),
            target.display(),
            effective
        );
    }
    Ok(true)
}
