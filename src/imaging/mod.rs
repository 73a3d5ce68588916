//! Image processing in pure Rust, statically linked.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::ImageReader` (format sniffed from bytes, EXIF-oriented) |
//! | **Fit** | [`fit_within_bounds`] (width pass, then height pass) |
//! | **Resize** | Lanczos3 |
//! | **Encode** | JPEG (`JpegEncoder`) or AVIF (rav1e) at a given quality |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
mod calculations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::{compression_ratio, fit_within_bounds};
pub use params::{DecodeLimits, OutputFormat, Quality, ResizeBounds};
pub use rust_backend::RustBackend;
