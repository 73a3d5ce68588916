//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP, GIF) | `image::ImageReader` with sniffed format |
//! | Orientation | `ImageDecoder::orientation` + `DynamicImage::apply_orientation` |
//! | Resize | `image::DynamicImage::resize_exact` with `Lanczos3` filter |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e, speed 6) |
//!
//! AVIF *sources* are not decodable: the `image` crate's `"avif"` feature only
//! enables the encoder. An AVIF upload therefore fails at the decode stage.

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::params::{DecodeLimits, OutputFormat, Quality};
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageDecoder, ImageReader, Limits};
use std::io::Cursor;

/// rav1e speed preset: 6 keeps a single upload in the low seconds.
const AVIF_SPEED: u8 = 6;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn reader_limits(limits: DecodeLimits) -> Limits {
    let mut reader_limits = Limits::default();
    reader_limits.max_alloc = Some(limits.max_alloc_bytes());
    reader_limits
}

/// Decode from memory, applying EXIF orientation the way a browser canvas does.
fn decode_oriented(bytes: &[u8], limits: DecodeLimits) -> Result<DynamicImage, BackendError> {
    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| BackendError::Decode(format!("failed to sniff format: {e}")))?;
    if reader.format().is_none() {
        return Err(BackendError::Decode("unrecognized image format".to_string()));
    }
    reader.limits(reader_limits(limits));

    let mut decoder = reader
        .into_decoder()
        .map_err(|e| BackendError::Decode(e.to_string()))?;

    let (width, height) = decoder.dimensions();
    let pixels = width as u64 * height as u64;
    if pixels > limits.max_pixels {
        return Err(BackendError::Limits(format!(
            "{width}x{height} is over {} pixels",
            limits.max_pixels
        )));
    }

    // A missing or unreadable EXIF block is not a decode failure.
    let orientation = decoder.orientation().ok();

    let mut img = DynamicImage::from_decoder(decoder).map_err(|e| match e {
        image::ImageError::Limits(l) => BackendError::Limits(l.to_string()),
        other => BackendError::Decode(other.to_string()),
    })?;
    if let Some(orientation) = orientation {
        img.apply_orientation(orientation);
    }
    Ok(img)
}

fn encode_jpeg(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
    let mut buf = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.value());
    // JPEG has no alpha channel; it is dropped here.
    img.to_rgb8()
        .write_with_encoder(encoder)
        .map_err(|e| BackendError::Encode(format!("JPEG encode failed: {e}")))?;
    Ok(buf.into_inner())
}

fn encode_avif(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
    let mut buf = Cursor::new(Vec::new());
    let encoder = AvifEncoder::new_with_speed_quality(&mut buf, AVIF_SPEED, quality.value());
    DynamicImage::ImageRgba8(img.to_rgba8())
        .write_with_encoder(encoder)
        .map_err(|e| BackendError::Encode(format!("AVIF encode failed: {e}")))?;
    Ok(buf.into_inner())
}

impl ImageBackend for RustBackend {
    type Surface = DynamicImage;

    fn decode(&self, bytes: &[u8], limits: DecodeLimits) -> Result<DynamicImage, BackendError> {
        decode_oriented(bytes, limits)
    }

    fn dimensions(&self, surface: &DynamicImage) -> Dimensions {
        Dimensions::new(surface.width(), surface.height())
    }

    fn resize(
        &self,
        surface: DynamicImage,
        target: Dimensions,
    ) -> Result<DynamicImage, BackendError> {
        if target.width == 0 || target.height == 0 {
            return Err(BackendError::ProcessingFailed(format!(
                "invalid resize target {}x{}",
                target.width, target.height
            )));
        }
        if surface.width() == target.width && surface.height() == target.height {
            return Ok(surface);
        }
        Ok(surface.resize_exact(target.width, target.height, FilterType::Lanczos3))
    }

    fn encode(
        &self,
        surface: &DynamicImage,
        format: OutputFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, BackendError> {
        match format {
            OutputFormat::Jpeg => encode_jpeg(surface, quality),
            OutputFormat::Avif => encode_avif(surface, quality),
        }
    }
}
