//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three raster operations the
//! ingestion pipeline needs: decode, resize, and encode. Every operation works
//! on in-memory buffers; nothing touches the filesystem.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend): pure Rust, statically
//! linked. The surface type is associated so test backends can stand in a
//! plain [`Dimensions`] for a real pixel grid.

use super::params::{DecodeLimits, OutputFormat, Quality};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    /// The payload is not an image any compiled-in decoder understands.
    #[error("Failed to decode image: {0}")]
    Decode(String),
    /// The payload decodes, but would exceed the configured decode limits.
    #[error("Image exceeds decode limits: {0}")]
    Limits(String),
    #[error("Failed to encode image: {0}")]
    Encode(String),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Pixel dimensions of a raster surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixels(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Trait for image processing backends.
///
/// Implementations must be `Sync`: one backend is shared by every ingestion
/// running on the rayon pool.
pub trait ImageBackend: Sync {
    /// Decoded, addressable pixel grid.
    type Surface: Send;

    /// Decode an encoded payload. The format is sniffed from the bytes, not
    /// taken from any declared media type.
    fn decode(&self, bytes: &[u8], limits: DecodeLimits) -> Result<Self::Surface, BackendError>;

    /// Dimensions of a decoded surface.
    fn dimensions(&self, surface: &Self::Surface) -> Dimensions;

    /// Resample to exactly `target`.
    fn resize(
        &self,
        surface: Self::Surface,
        target: Dimensions,
    ) -> Result<Self::Surface, BackendError>;

    /// Encode to a lossy format at the given quality.
    fn encode(
        &self,
        surface: &Self::Surface,
        format: OutputFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mock backend that records operations without touching pixels.
    ///
    /// Payloads starting with `MOCK:` decode to the dimensions given after the
    /// prefix (`MOCK:4000x3000`); anything else fails to decode. Uses Mutex
    /// (not RefCell) so it is Sync and works with rayon's par_iter.
    #[derive(Default)]
    pub struct MockBackend {
        pub operations: Mutex<Vec<RecordedOp>>,
        /// Bytes returned by `encode`; defaults to a fixed 100-byte payload.
        pub encoded: Option<Vec<u8>>,
        pub fail_encode: bool,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Decode { len: usize },
        Resize { width: u32, height: u32 },
        Encode { format: OutputFormat, quality: u8 },
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_encode() -> Self {
            Self {
                fail_encode: true,
                ..Self::default()
            }
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }
    }

    /// Build a payload the mock backend decodes to `width`x`height`.
    pub fn mock_payload(width: u32, height: u32) -> Vec<u8> {
        format!("MOCK:{width}x{height}").into_bytes()
    }

    fn parse_mock(bytes: &[u8]) -> Option<Dimensions> {
        let text = std::str::from_utf8(bytes).ok()?;
        let (w, h) = text.strip_prefix("MOCK:")?.split_once('x')?;
        Some(Dimensions::new(w.parse().ok()?, h.parse().ok()?))
    }

    impl ImageBackend for MockBackend {
        type Surface = Dimensions;

        fn decode(&self, bytes: &[u8], limits: DecodeLimits) -> Result<Dimensions, BackendError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Decode { len: bytes.len() });

            let dims = parse_mock(bytes)
                .ok_or_else(|| BackendError::Decode("not a mock payload".to_string()))?;
            if dims.pixels() > limits.max_pixels {
                return Err(BackendError::Limits(format!(
                    "{}x{}",
                    dims.width, dims.height
                )));
            }
            Ok(dims)
        }

        fn dimensions(&self, surface: &Dimensions) -> Dimensions {
            *surface
        }

        fn resize(&self, _surface: Dimensions, target: Dimensions) -> Result<Dimensions, BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Resize {
                width: target.width,
                height: target.height,
            });
            Ok(target)
        }

        fn encode(
            &self,
            _surface: &Dimensions,
            format: OutputFormat,
            quality: Quality,
        ) -> Result<Vec<u8>, BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Encode {
                format,
                quality: quality.value(),
            });
            if self.fail_encode {
                return Err(BackendError::Encode("mock encoder failure".to_string()));
            }
            Ok(self.encoded.clone().unwrap_or_else(|| vec![0u8; 100]))
        }
    }

    #[test]
    fn mock_decodes_mock_payload() {
        let backend = MockBackend::new();
        let dims = backend
            .decode(&mock_payload(800, 600), DecodeLimits::default())
            .unwrap();
        assert_eq!(dims, Dimensions::new(800, 600));

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 1);
        assert!(matches!(&ops[0], RecordedOp::Decode { .. }));
    }

    #[test]
    fn mock_rejects_other_bytes() {
        let backend = MockBackend::new();
        let err = backend
            .decode(b"hello", DecodeLimits::default())
            .unwrap_err();
        assert!(matches!(err, BackendError::Decode(_)));
    }

    #[test]
    fn mock_enforces_pixel_limit() {
        let backend = MockBackend::new();
        let err = backend
            .decode(&mock_payload(100, 100), DecodeLimits { max_pixels: 9_999 })
            .unwrap_err();
        assert!(matches!(err, BackendError::Limits(_)));
    }

    #[test]
    fn mock_records_resize_and_encode() {
        let backend = MockBackend::new();
        let surface = backend
            .resize(Dimensions::new(4000, 3000), Dimensions::new(1920, 1440))
            .unwrap();
        backend
            .encode(&surface, OutputFormat::Jpeg, Quality::new(85))
            .unwrap();

        let ops = backend.get_operations();
        assert_eq!(
            ops,
            vec![
                RecordedOp::Resize {
                    width: 1920,
                    height: 1440
                },
                RecordedOp::Encode {
                    format: OutputFormat::Jpeg,
                    quality: 85
                },
            ]
        );
    }
}
