//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::ResizeBounds;

/// Scale `(width, height)` by `factor`, rounding each side and never
/// dropping below one pixel.
fn apply_scale(width: u32, height: u32, factor: f64) -> (u32, u32) {
    let w = (width as f64 * factor).round() as u32;
    let h = (height as f64 * factor).round() as u32;
    (w.max(1), h.max(1))
}

/// Calculate the output dimensions for a source that must fit within `bounds`.
///
/// Width is clamped first: if the source is wider than `max_width`, both sides
/// are scaled by `max_width / width`. Then, if the (possibly already scaled)
/// height still exceeds `max_height`, both sides are scaled again by
/// `max_height / height`. The second pass only ever shrinks, so the result
/// fits both bounds. Sources already inside the bounds are returned unchanged
/// (no upscaling).
///
/// # Examples
/// ```
/// # use folio_ingest::imaging::{ResizeBounds, fit_within_bounds};
/// let bounds = ResizeBounds::new(1920, 1920).unwrap();
/// // Landscape: the width pass alone is enough
/// assert_eq!(fit_within_bounds((4000, 3000), bounds), (1920, 1440));
/// // Portrait: only the height pass applies
/// assert_eq!(fit_within_bounds((1000, 4000), bounds), (480, 1920));
/// ```
pub fn fit_within_bounds(source: (u32, u32), bounds: ResizeBounds) -> (u32, u32) {
    let (mut width, mut height) = source;

    if width > bounds.max_width() {
        let factor = bounds.max_width() as f64 / width as f64;
        (width, height) = apply_scale(width, height, factor);
        // Rounding may leave the width one pixel off; pin it to the bound.
        width = bounds.max_width();
    }

    if height > bounds.max_height() {
        let factor = bounds.max_height() as f64 / height as f64;
        (width, height) = apply_scale(width, height, factor);
        height = bounds.max_height();
    }

    (width.min(bounds.max_width()), height)
}

/// Ratio of source bytes to stored bytes (e.g. `4.0` means four times smaller).
///
/// Returns `None` when nothing was stored.
pub fn compression_ratio(source_bytes: u64, stored_bytes: u64) -> Option<f64> {
    if stored_bytes == 0 {
        return None;
    }
    Some(source_bytes as f64 / stored_bytes as f64)
}
