//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the [`ingest`](crate::ingest) pipeline (which decides the
//! output shape) and the [`backend`](super::backend) (which does the actual
//! pixel work).
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 80). Clamped on construction.
//! - [`ResizeBounds`]: Box the output must fit inside (default 1920×1920). Both sides positive.
//! - [`OutputFormat`]: Lossy re-encoding target (JPEG or AVIF).
//! - [`DecodeLimits`]: Caps on what a payload may expand into when decoded.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Quality setting for lossy image encoding (1-100).
///
/// Out-of-range values are clamped, never rejected: `0` becomes `1` and
/// anything above `100` becomes `100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u8);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(80)
    }
}

/// Maximum output dimensions. Neither side may be zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeBounds {
    max_width: u32,
    max_height: u32,
}

impl ResizeBounds {
    /// Returns `None` when either side is zero.
    pub fn new(max_width: u32, max_height: u32) -> Option<Self> {
        if max_width == 0 || max_height == 0 {
            return None;
        }
        Some(Self {
            max_width,
            max_height,
        })
    }

    pub fn max_width(self) -> u32 {
        self.max_width
    }

    pub fn max_height(self) -> u32 {
        self.max_height
    }
}

impl Default for ResizeBounds {
    fn default() -> Self {
        Self {
            max_width: 1920,
            max_height: 1920,
        }
    }
}

impl fmt::Display for ResizeBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.max_width, self.max_height)
    }
}

/// Lossy output format for re-encoded uploads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Avif,
}

impl OutputFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Avif => "image/avif",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Avif => "avif",
        }
    }

    /// Parse a user-supplied format name (`jpeg`, `jpg`, `avif`), case-insensitive.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Some(Self::Jpeg),
            "avif" => Some(Self::Avif),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jpeg => f.write_str("jpeg"),
            Self::Avif => f.write_str("avif"),
        }
    }
}

/// Caps applied while decoding so a small payload cannot expand into an
/// unbounded raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    pub max_pixels: u64,
}

impl DecodeLimits {
    /// Largest raster allocation these limits allow, assuming 4 bytes per pixel.
    pub fn max_alloc_bytes(self) -> u64 {
        self.max_pixels.saturating_mul(4)
    }
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_pixels: 100_000_000,
        }
    }
}
