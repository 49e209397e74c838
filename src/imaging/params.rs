//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how*. The conversion executor
//! builds them; a [`backend`](super::backend) carries them out. Keeping the
//! two apart lets tests swap in a mock backend without touching the
//! conversion rules.

use std::path::PathBuf;

/// JPEG encoding quality (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(85)
    }
}

/// Resize `source` so its longer edge is at most `long_side`, writing a JPEG
/// to `output`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResizeParams {
    pub source: PathBuf,
    pub output: PathBuf,
    pub long_side: u32,
    pub quality: Quality,
}
