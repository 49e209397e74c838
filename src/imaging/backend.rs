//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the two operations the sync needs:
//! identify (read dimensions) and resize (to a long-side bound, JPEG out).
//!
//! Implementations:
//! - [`RustBackend`](super::rust_backend::RustBackend): pure Rust, in process.
//! - [`CommandBackend`](super::command_backend::CommandBackend): shells out
//!   to an external resize tool with a hard wait bound.

use super::params::ResizeParams;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
    #[error("{program} did not finish within {timeout:?}")]
    Timeout { program: PathBuf, timeout: Duration },
    #[error("{program} exited with {status}")]
    ToolFailed { program: PathBuf, status: String },
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn long_side(&self) -> u32 {
        super::calculations::long_side(self.width, self.height)
    }
}

/// Read dimensions from the image header without decoding pixel data.
pub fn read_dimensions(path: &Path) -> Result<Dimensions, BackendError> {
    let (width, height) = image::image_dimensions(path).map_err(|e| {
        BackendError::ProcessingFailed(format!(
            "Failed to read dimensions of {}: {}",
            path.display(),
            e
        ))
    })?;
    Ok(Dimensions { width, height })
}

/// Trait for image processing backends.
///
/// Backends are shared by every engine worker, so they must be `Send + Sync`.
pub trait ImageBackend: Send + Sync {
    /// Get image dimensions.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Resize so the long side is at most `params.long_side`, replacing
    /// `params.output`.
    fn resize(&self, params: &ResizeParams) -> Result<(), BackendError>;
}
