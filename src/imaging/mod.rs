//! Image services used by the conversion executor.
//!
//! | Operation | Built-in backend | External backend |
//! |---|---|---|
//! | **Identify** | `image::image_dimensions` (header only) | same |
//! | **Resize → JPEG** | Lanczos3 + `JpegEncoder` | `<tool> -out jpeg -resize longest N -o <target> <source>` |
//!
//! The module is split into:
//! - **Calculations**: pure long-side math (unit testable)
//! - **Parameters**: data describing a resize
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`] + [`CommandBackend`]

pub mod backend;
mod calculations;
pub mod command_backend;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::{effective_long_side, fit_within_long_side, long_side};
pub use command_backend::CommandBackend;
pub use params::{Quality, ResizeParams};
pub use rust_backend::RustBackend;
