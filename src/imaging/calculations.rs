//! Pure calculation functions for long-side resizing.
//!
//! All functions here are pure and testable without any I/O or images.

/// The larger of width and height.
pub fn long_side(width: u32, height: u32) -> u32 {
    width.max(height)
}

/// Long side a conversion should produce: the configured maximum, but never
/// larger than the source itself.
///
/// ```
/// # use lowres_sync::imaging::effective_long_side;
/// assert_eq!(effective_long_side(1000, 4000), 1000);
/// assert_eq!(effective_long_side(1000, 500), 500);
/// ```
pub fn effective_long_side(max_long_side: u32, source_long_side: u32) -> u32 {
    max_long_side.min(source_long_side)
}

/// Scale `(width, height)` so the longer edge equals `long_side`, keeping the
/// aspect ratio. Never upscales; the shorter edge is at least 1.
///
/// ```
/// # use lowres_sync::imaging::fit_within_long_side;
/// assert_eq!(fit_within_long_side((4000, 3000), 1000), (1000, 750));
/// assert_eq!(fit_within_long_side((3000, 4000), 1000), (750, 1000));
/// ```
pub fn fit_within_long_side(source: (u32, u32), long_side: u32) -> (u32, u32) {
    let (w, h) = source;
    let current = w.max(h);
    if current == 0 || current <= long_side {
        return (w, h);
    }
    let scale = long_side as f64 / current as f64;
    let scaled = |v: u32| ((v as f64 * scale).round() as u32).max(1);
    if w >= h {
        (long_side, scaled(h))
    } else {
        (scaled(w), long_side)
    }
}
