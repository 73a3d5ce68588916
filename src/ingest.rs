//! The image ingestion pipeline.
//!
//! One call to [`ingest`] takes a single user-supplied image through every
//! stage, strictly in order:
//!
//! ```text
//! validate → decode → resize → encode → derive key → upload → UploadResult
//! ```
//!
//! ## Stages
//!
//! | Stage | Fails with | Touches |
//! |---|---|---|
//! | Validate media type, emptiness, size ceiling | [`IngestError::InvalidInput`] | nothing |
//! | Decode (format sniffed from bytes, EXIF-oriented) | [`IngestError::DecodeFailure`] | [`ImageBackend`] |
//! | Fit within bounds, resample with Lanczos3 | [`IngestError::Internal`] | [`ImageBackend`] |
//! | Re-encode at the configured quality | [`IngestError::Internal`] | [`ImageBackend`] |
//! | Upload under a fresh key, refusing overwrite | [`IngestError::UploadFailure`] | [`ObjectStore`] |
//!
//! The store write is the last step, so an abandoned or failed call leaves
//! nothing behind. There is no internal retry: re-invoking derives a new key.
//!
//! ## Progress
//!
//! An optional `mpsc::Sender` receives [`IngestEvent`]s as stages finish. The
//! events are advisory; a dropped receiver never affects the result.

use crate::config::IngestConfig;
use crate::imaging::{
    BackendError, DecodeLimits, Dimensions, ImageBackend, OutputFormat, Quality, ResizeBounds,
    compression_ratio, fit_within_bounds,
};
use crate::naming::generate_key;
use crate::storage::{ObjectStore, PutOptions, StoreError};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::mpsc::Sender;
use std::time::Instant;
use thiserror::Error;

/// Media type assumed when a file's extension says nothing useful.
const UNKNOWN_MEDIA_TYPE: &str = "application/octet-stream";

#[derive(Error, Debug)]
pub enum IngestError {
    /// Wrong media category, empty payload, size ceiling exceeded, or bad bounds.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The payload is not a decodable image, or decoding would exceed limits.
    #[error("could not decode image: {0}")]
    DecodeFailure(String),
    /// The store refused or failed the write, including key collisions.
    #[error("upload failed: {0}")]
    UploadFailure(#[from] StoreError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl IngestError {
    /// Short message suitable for showing to the person who picked the file.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidInput(reason) => reason.clone(),
            Self::DecodeFailure(_) => "unreadable image".to_string(),
            Self::UploadFailure(StoreError::Conflict { .. }) => {
                "upload collided with an existing image, please try again".to_string()
            }
            Self::UploadFailure(e) if e.is_retryable() => {
                "upload failed, please try again".to_string()
            }
            Self::UploadFailure(e) => format!("upload failed: {e}"),
            Self::Internal(_) => "something went wrong while processing the image".to_string(),
        }
    }

    /// Whether calling [`ingest`] again with the same input may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::UploadFailure(e) => e.is_retryable(),
            Self::InvalidInput(_) | Self::DecodeFailure(_) | Self::Internal(_) => false,
        }
    }

    /// Stable machine-readable tag, used in JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::DecodeFailure(_) => "decode_failure",
            Self::UploadFailure(_) => "upload_failure",
            Self::Internal(_) => "internal",
        }
    }
}

/// A user-supplied image, held in memory for the duration of one ingestion.
#[derive(Debug, Clone)]
pub struct SourceImage {
    name: String,
    media_type: String,
    bytes: Vec<u8>,
}

impl SourceImage {
    /// Wrap raw bytes (stdin, or an object fetched back from the store).
    pub fn from_bytes(
        name: impl Into<String>,
        media_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes,
        }
    }

    /// Read at most `max_bytes` from `reader`. A longer stream is rejected
    /// without buffering more than one byte past the limit.
    pub fn from_reader(
        name: impl Into<String>,
        media_type: impl Into<String>,
        reader: impl Read,
        max_bytes: u64,
    ) -> Result<Self, IngestError> {
        let name = name.into();
        let mut bytes = Vec::new();
        reader
            .take(max_bytes.saturating_add(1))
            .read_to_end(&mut bytes)
            .map_err(|e| IngestError::InvalidInput(format!("cannot read {name}: {e}")))?;
        if bytes.len() as u64 > max_bytes {
            return Err(too_large(&name, None, max_bytes));
        }
        Ok(Self::from_bytes(name, media_type, bytes))
    }

    /// Read a file, inferring the declared media type from its extension.
    ///
    /// Files over `max_bytes` are rejected from their metadata, before any
    /// content is read.
    pub fn from_path(path: &Path, max_bytes: u64) -> Result<Self, IngestError> {
        let read_error =
            |e: std::io::Error| IngestError::InvalidInput(format!("cannot read {}: {e}", path.display()));
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file = File::open(path).map_err(read_error)?;
        let len = file.metadata().map_err(read_error)?.len();
        if len > max_bytes {
            return Err(too_large(&name, Some(len), max_bytes));
        }
        Self::from_reader(name, media_type_for_path(path), file, max_bytes)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Media type a browser file picker would report for `path`.
pub fn media_type_for_path(path: &Path) -> String {
    image::ImageFormat::from_path(path)
        .map(|f| f.to_mime_type().to_string())
        .unwrap_or_else(|_| UNKNOWN_MEDIA_TYPE.to_string())
}

/// Settings for one ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOptions {
    pub bounds: ResizeBounds,
    pub quality: Quality,
    pub format: OutputFormat,
    /// Largest accepted source payload in bytes.
    pub max_source_bytes: u64,
    pub decode_limits: DecodeLimits,
    /// Folder inside the store; `None` or empty for the store root.
    pub key_prefix: Option<String>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self::from_config(&IngestConfig::default())
    }
}

impl IngestOptions {
    pub fn from_config(config: &IngestConfig) -> Self {
        let prefix = config.storage.key_prefix.trim_matches('/');
        Self {
            bounds: config.bounds(),
            quality: config.quality(),
            format: config.images.format,
            max_source_bytes: config.limits.max_source_bytes,
            decode_limits: config.decode_limits(),
            key_prefix: (!prefix.is_empty()).then(|| prefix.to_string()),
        }
    }

    /// Replace the bounds. Zero on either side is [`IngestError::InvalidInput`].
    pub fn with_bounds(mut self, max_width: u32, max_height: u32) -> Result<Self, IngestError> {
        self.bounds = ResizeBounds::new(max_width, max_height).ok_or_else(|| {
            IngestError::InvalidInput(format!(
                "resize bounds must be positive, got {max_width}x{max_height}"
            ))
        })?;
        Ok(self)
    }
}

/// Outcome of a successful ingestion. Only produced after the store accepted
/// the write.
#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    remote_key: String,
    public_url: String,
    stored_bytes: u64,
    source_bytes: u64,
    width: u32,
    height: u32,
    content_type: String,
    sha256: String,
    compression_ratio: Option<f64>,
}

impl UploadResult {
    pub fn remote_key(&self) -> &str {
        &self.remote_key
    }

    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    pub fn stored_bytes(&self) -> u64 {
        self.stored_bytes
    }

    pub fn source_bytes(&self) -> u64 {
        self.source_bytes
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Hex SHA-256 of the stored payload.
    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    /// Source size over stored size; `None` if nothing was stored.
    pub fn compression_ratio(&self) -> Option<f64> {
        self.compression_ratio
    }
}

/// Progress of one ingestion, in stage order.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestEvent {
    Validated { name: String, bytes: u64 },
    Decoded { name: String, width: u32, height: u32 },
    /// Emitted even when no resampling was needed.
    Resized { name: String, width: u32, height: u32 },
    Encoded { name: String, bytes: u64 },
    Uploading { name: String, key: String },
    Uploaded { name: String, url: String },
    Failed { name: String, message: String },
}

impl IngestEvent {
    /// Source file name the event belongs to.
    pub fn name(&self) -> &str {
        match self {
            Self::Validated { name, .. }
            | Self::Decoded { name, .. }
            | Self::Resized { name, .. }
            | Self::Encoded { name, .. }
            | Self::Uploading { name, .. }
            | Self::Uploaded { name, .. }
            | Self::Failed { name, .. } => name,
        }
    }

    /// Coarse completion fraction. A failure ends the call, so it reports 1.0.
    pub fn fraction(&self) -> f32 {
        match self {
            Self::Validated { .. } => 0.1,
            Self::Decoded { .. } => 0.35,
            Self::Resized { .. } => 0.6,
            Self::Encoded { .. } => 0.8,
            Self::Uploading { .. } => 0.9,
            Self::Uploaded { .. } | Self::Failed { .. } => 1.0,
        }
    }
}

/// Result of [`plan`]: what [`ingest`] would do, without encoding or uploading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestPlan {
    pub name: String,
    pub source_bytes: u64,
    pub source: Dimensions,
    pub target: Dimensions,
}

impl IngestPlan {
    pub fn needs_resize(&self) -> bool {
        self.source != self.target
    }
}

/// Check media type, emptiness and size ceiling. No decode work is done here.
pub fn validate(source: &SourceImage, options: &IngestOptions) -> Result<(), IngestError> {
    let essence = source
        .media_type()
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if !essence.starts_with("image/") {
        return Err(IngestError::InvalidInput(format!(
            "{} is not an image (media type '{}')",
            source.name(),
            source.media_type()
        )));
    }
    if source.is_empty() {
        return Err(IngestError::InvalidInput(format!(
            "{} is empty",
            source.name()
        )));
    }
    if source.len() > options.max_source_bytes {
        return Err(too_large(
            source.name(),
            Some(source.len()),
            options.max_source_bytes,
        ));
    }
    Ok(())
}

fn too_large(name: &str, len: Option<u64>, max_bytes: u64) -> IngestError {
    match len {
        Some(len) => IngestError::InvalidInput(format!(
            "{name} is {len} bytes, larger than the {max_bytes} byte limit"
        )),
        None => IngestError::InvalidInput(format!(
            "{name} is larger than the {max_bytes} byte limit"
        )),
    }
}

/// Any decode-stage backend error is the payload's fault.
fn decode_error(e: BackendError) -> IngestError {
    match e {
        BackendError::Decode(reason) | BackendError::Limits(reason) => {
            IngestError::DecodeFailure(reason)
        }
        other => IngestError::DecodeFailure(other.to_string()),
    }
}

fn internal_error(e: BackendError) -> IngestError {
    IngestError::Internal(e.to_string())
}

fn emit(progress: Option<&Sender<IngestEvent>>, event: IngestEvent) {
    if let Some(tx) = progress {
        // Advisory only; a closed receiver is not an ingestion failure.
        let _ = tx.send(event);
    }
}

fn target_dimensions(source: Dimensions, bounds: ResizeBounds) -> Dimensions {
    let (width, height) = fit_within_bounds(source.as_tuple(), bounds);
    Dimensions::new(width, height)
}

/// Validate, decode, and compute the target size without encoding or uploading.
pub fn plan(
    backend: &impl ImageBackend,
    source: &SourceImage,
    options: &IngestOptions,
) -> Result<IngestPlan, IngestError> {
    validate(source, options)?;
    let surface = backend
        .decode(source.bytes(), options.decode_limits)
        .map_err(decode_error)?;
    let dims = backend.dimensions(&surface);
    Ok(IngestPlan {
        name: source.name().to_string(),
        source_bytes: source.len(),
        source: dims,
        target: target_dimensions(dims, options.bounds),
    })
}

/// Ingest one image: validate, decode, resize, re-encode, upload.
///
/// On failure a [`IngestEvent::Failed`] is sent before the error is returned.
pub fn ingest<B, S>(
    backend: &B,
    store: &S,
    source: &SourceImage,
    options: &IngestOptions,
    progress: Option<&Sender<IngestEvent>>,
) -> Result<UploadResult, IngestError>
where
    B: ImageBackend,
    S: ObjectStore + ?Sized,
{
    let result = run_stages(backend, store, source, options, progress);
    if let Err(e) = &result {
        tracing::warn!(name = source.name(), kind = e.kind(), error = %e, "ingestion failed");
        emit(
            progress,
            IngestEvent::Failed {
                name: source.name().to_string(),
                message: e.user_message(),
            },
        );
    }
    result
}

fn run_stages<B, S>(
    backend: &B,
    store: &S,
    source: &SourceImage,
    options: &IngestOptions,
    progress: Option<&Sender<IngestEvent>>,
) -> Result<UploadResult, IngestError>
where
    B: ImageBackend,
    S: ObjectStore + ?Sized,
{
    let started = Instant::now();
    let name = source.name().to_string();

    validate(source, options)?;
    tracing::debug!(name = %name, bytes = source.len(), media_type = source.media_type(), "validated");
    emit(
        progress,
        IngestEvent::Validated {
            name: name.clone(),
            bytes: source.len(),
        },
    );

    let surface = backend
        .decode(source.bytes(), options.decode_limits)
        .map_err(decode_error)?;
    let decoded = backend.dimensions(&surface);
    tracing::debug!(name = %name, width = decoded.width, height = decoded.height, "decoded");
    emit(
        progress,
        IngestEvent::Decoded {
            name: name.clone(),
            width: decoded.width,
            height: decoded.height,
        },
    );

    let target = target_dimensions(decoded, options.bounds);
    let surface = if target == decoded {
        surface
    } else {
        backend.resize(surface, target).map_err(internal_error)?
    };
    tracing::debug!(name = %name, width = target.width, height = target.height, "resized");
    emit(
        progress,
        IngestEvent::Resized {
            name: name.clone(),
            width: target.width,
            height: target.height,
        },
    );

    let encoded = backend
        .encode(&surface, options.format, options.quality)
        .map_err(internal_error)?;
    drop(surface);
    if encoded.is_empty() {
        return Err(IngestError::Internal("encoder produced no data".to_string()));
    }
    let stored_bytes = encoded.len() as u64;
    tracing::debug!(name = %name, bytes = stored_bytes, format = %options.format, "encoded");
    emit(
        progress,
        IngestEvent::Encoded {
            name: name.clone(),
            bytes: stored_bytes,
        },
    );

    let key = generate_key(
        options.key_prefix.as_deref(),
        source.name(),
        options.format.extension(),
    );
    emit(
        progress,
        IngestEvent::Uploading {
            name: name.clone(),
            key: key.clone(),
        },
    );
    let content_type = options.format.content_type();
    let receipt = store.put(&key, &encoded, content_type, PutOptions::default())?;

    let result = UploadResult {
        remote_key: key,
        public_url: receipt.url,
        stored_bytes,
        source_bytes: source.len(),
        width: target.width,
        height: target.height,
        content_type: content_type.to_string(),
        sha256: format!("{:x}", Sha256::digest(&encoded)),
        compression_ratio: compression_ratio(source.len(), stored_bytes),
    };
    tracing::info!(
        name = %name,
        key = result.remote_key(),
        store = store.name(),
        width = result.width,
        height = result.height,
        source_bytes = result.source_bytes,
        stored_bytes = result.stored_bytes,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "image ingested"
    );
    emit(
        progress,
        IngestEvent::Uploaded {
            name,
            url: result.public_url.clone(),
        },
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp, mock_payload};
    use crate::storage::tests::MockStore;
    use std::collections::HashSet;
    use std::sync::mpsc;

    fn jpeg_source(width: u32, height: u32) -> SourceImage {
        SourceImage::from_bytes("Team Photo.JPG", "image/jpeg", mock_payload(width, height))
    }

    fn resize_ops(backend: &MockBackend) -> Vec<RecordedOp> {
        backend
            .get_operations()
            .into_iter()
            .filter(|op| matches!(op, RecordedOp::Resize { .. }))
            .collect()
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn non_image_media_type_touches_nothing() {
        let backend = MockBackend::new();
        let store = MockStore::new();
        let source = SourceImage::from_bytes("notes.txt", "text/plain", mock_payload(10, 10));

        let err = ingest(&backend, &store, &source, &IngestOptions::default(), None).unwrap_err();

        assert!(matches!(err, IngestError::InvalidInput(_)));
        assert!(backend.get_operations().is_empty());
        assert_eq!(store.put_count(), 0);
    }

    #[test]
    fn oversize_payload_is_rejected_before_upload() {
        let backend = MockBackend::new();
        let store = MockStore::new();
        let options = IngestOptions {
            max_source_bytes: 8,
            ..IngestOptions::default()
        };

        let err = ingest(&backend, &store, &jpeg_source(100, 100), &options, None).unwrap_err();

        assert!(matches!(err, IngestError::InvalidInput(ref m) if m.contains("limit")));
        assert!(backend.get_operations().is_empty());
        assert_eq!(store.put_count(), 0);
    }

    #[test]
    fn payload_at_exact_ceiling_is_accepted() {
        let source = jpeg_source(100, 100);
        let options = IngestOptions {
            max_source_bytes: source.len(),
            ..IngestOptions::default()
        };
        assert!(validate(&source, &options).is_ok());
    }

    #[test]
    fn empty_payload_is_invalid() {
        let source = SourceImage::from_bytes("a.png", "image/png", Vec::new());
        let err = validate(&source, &IngestOptions::default()).unwrap_err();
        assert!(matches!(err, IngestError::InvalidInput(_)));
    }

    #[test]
    fn oversize_file_is_rejected_before_reading() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("huge.jpg");
        // Sparse: 64 MiB on paper, nothing allocated on disk.
        File::create(&path).unwrap().set_len(64 * 1024 * 1024).unwrap();

        let err = SourceImage::from_path(&path, 10 * 1024 * 1024).unwrap_err();

        assert!(matches!(err, IngestError::InvalidInput(ref m) if m.contains("67108864 bytes")));
    }

    #[test]
    fn file_within_ceiling_is_read_with_inferred_type() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("dawn.png");
        std::fs::write(&path, mock_payload(10, 10)).unwrap();

        let source = SourceImage::from_path(&path, 1024).unwrap();

        assert_eq!(source.name(), "dawn.png");
        assert_eq!(source.media_type(), "image/png");
        assert_eq!(source.bytes(), mock_payload(10, 10).as_slice());
    }

    #[test]
    fn missing_file_is_invalid_input() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = SourceImage::from_path(&tmp.path().join("gone.jpg"), 1024).unwrap_err();
        assert!(matches!(err, IngestError::InvalidInput(ref m) if m.starts_with("cannot read")));
    }

    #[test]
    fn reader_stops_one_byte_past_ceiling() {
        let ok = SourceImage::from_reader("stdin", "image/png", &[7u8; 10][..], 10).unwrap();
        assert_eq!(ok.len(), 10);

        let err = SourceImage::from_reader("stdin", "image/png", &[7u8; 11][..], 10).unwrap_err();
        assert!(matches!(err, IngestError::InvalidInput(ref m) if m.contains("limit")));
    }

    #[test]
    fn media_type_parameters_and_case_are_ignored() {
        let source = SourceImage::from_bytes("a.png", "Image/PNG; charset=binary", vec![1]);
        assert!(validate(&source, &IngestOptions::default()).is_ok());
    }

    #[test]
    fn zero_bounds_are_invalid_input() {
        let err = IngestOptions::default().with_bounds(0, 1080).unwrap_err();
        assert!(matches!(err, IngestError::InvalidInput(_)));
    }

    #[test]
    fn media_type_inferred_from_extension() {
        assert_eq!(media_type_for_path(Path::new("a/b/photo.JPG")), "image/jpeg");
        assert_eq!(media_type_for_path(Path::new("shot.png")), "image/png");
        assert_eq!(
            media_type_for_path(Path::new("notes.txt")),
            "application/octet-stream"
        );
    }

    // =========================================================================
    // Decode
    // =========================================================================

    #[test]
    fn corrupt_bytes_are_decode_failure() {
        let backend = MockBackend::new();
        let store = MockStore::new();
        let source = SourceImage::from_bytes("broken.jpg", "image/jpeg", b"\xff\xd8garbage".to_vec());

        let err = ingest(&backend, &store, &source, &IngestOptions::default(), None).unwrap_err();

        assert!(matches!(err, IngestError::DecodeFailure(_)));
        assert_eq!(err.user_message(), "unreadable image");
        assert_eq!(store.put_count(), 0);
    }

    #[test]
    fn decode_limits_are_decode_failure() {
        let backend = MockBackend::new();
        let store = MockStore::new();
        let options = IngestOptions {
            decode_limits: DecodeLimits { max_pixels: 1_000 },
            ..IngestOptions::default()
        };

        let err = ingest(&backend, &store, &jpeg_source(100, 100), &options, None).unwrap_err();

        assert!(matches!(err, IngestError::DecodeFailure(_)));
        assert_eq!(store.put_count(), 0);
    }

    // =========================================================================
    // Resize
    // =========================================================================

    #[test]
    fn landscape_is_scaled_to_width() {
        let backend = MockBackend::new();
        let store = MockStore::new();

        let result =
            ingest(&backend, &store, &jpeg_source(4000, 3000), &IngestOptions::default(), None)
                .unwrap();

        assert_eq!(result.dimensions(), Dimensions::new(1920, 1440));
        assert_eq!(
            resize_ops(&backend),
            vec![RecordedOp::Resize {
                width: 1920,
                height: 1440
            }]
        );
    }

    #[test]
    fn portrait_is_scaled_to_height() {
        let backend = MockBackend::new();
        let store = MockStore::new();

        let result =
            ingest(&backend, &store, &jpeg_source(1000, 4000), &IngestOptions::default(), None)
                .unwrap();

        assert_eq!(result.dimensions(), Dimensions::new(480, 1920));
    }

    #[test]
    fn small_image_is_not_resampled() {
        let backend = MockBackend::new();
        let store = MockStore::new();

        let result =
            ingest(&backend, &store, &jpeg_source(800, 600), &IngestOptions::default(), None)
                .unwrap();

        assert_eq!(result.dimensions(), Dimensions::new(800, 600));
        assert!(resize_ops(&backend).is_empty());
    }

    // =========================================================================
    // Encode + upload
    // =========================================================================

    #[test]
    fn encodes_with_configured_format_and_quality() {
        let backend = MockBackend::new();
        let store = MockStore::new();
        let options = IngestOptions {
            quality: Quality::new(65),
            format: OutputFormat::Avif,
            ..IngestOptions::default()
        };

        let result = ingest(&backend, &store, &jpeg_source(640, 480), &options, None).unwrap();

        assert!(backend.get_operations().contains(&RecordedOp::Encode {
            format: OutputFormat::Avif,
            quality: 65
        }));
        assert!(result.remote_key().ends_with(".avif"));
        assert_eq!(result.content_type(), "image/avif");
        assert_eq!(
            store.content_type_of(result.remote_key()).as_deref(),
            Some("image/avif")
        );
    }

    #[test]
    fn result_describes_stored_object() {
        let backend = MockBackend::new();
        let store = MockStore::new();
        let source = jpeg_source(4000, 3000);

        let result = ingest(&backend, &store, &source, &IngestOptions::default(), None).unwrap();

        assert!(result.remote_key().starts_with("images/Team-Photo-"));
        assert!(result.remote_key().ends_with(".jpg"));
        assert_eq!(
            result.public_url(),
            format!("https://cdn.example.com/{}", result.remote_key())
        );
        assert_eq!(result.stored_bytes(), 100);
        assert_eq!(result.source_bytes(), source.len());
        assert_eq!(result.content_type(), "image/jpeg");
        assert_eq!(
            result.sha256(),
            format!("{:x}", Sha256::digest(vec![0u8; 100]))
        );
        let ratio = result.compression_ratio().unwrap();
        assert!((ratio - source.len() as f64 / 100.0).abs() < 1e-9);
    }

    #[test]
    fn encoder_failure_is_internal_and_nothing_is_stored() {
        let backend = MockBackend::failing_encode();
        let store = MockStore::new();

        let err = ingest(&backend, &store, &jpeg_source(100, 100), &IngestOptions::default(), None)
            .unwrap_err();

        assert!(matches!(err, IngestError::Internal(_)));
        assert_eq!(store.put_count(), 0);
    }

    #[test]
    fn store_failure_is_upload_failure_and_retryable() {
        let backend = MockBackend::new();
        let store = MockStore::failing();

        let err = ingest(&backend, &store, &jpeg_source(100, 100), &IngestOptions::default(), None)
            .unwrap_err();

        assert!(matches!(
            err,
            IngestError::UploadFailure(StoreError::Network(_))
        ));
        assert!(err.is_retryable());
        assert_eq!(err.user_message(), "upload failed, please try again");
        assert_eq!(store.put_count(), 1);
    }

    #[test]
    fn same_payload_twice_gets_distinct_keys() {
        let backend = MockBackend::new();
        let store = MockStore::new();
        let source = jpeg_source(100, 100);

        let keys: HashSet<String> = (0..20)
            .map(|_| {
                ingest(&backend, &store, &source, &IngestOptions::default(), None)
                    .unwrap()
                    .remote_key()
                    .to_string()
            })
            .collect();

        assert_eq!(keys.len(), 20);
        assert_eq!(store.put_count(), 20);
    }

    #[test]
    fn empty_prefix_stores_at_root() {
        let backend = MockBackend::new();
        let store = MockStore::new();
        let options = IngestOptions {
            key_prefix: None,
            ..IngestOptions::default()
        };

        let result = ingest(&backend, &store, &jpeg_source(10, 10), &options, None).unwrap();

        assert!(!result.remote_key().contains('/'));
    }

    #[test]
    fn stored_object_reingests_under_new_key() {
        // The mock encoder emits a payload the mock decoder understands.
        let backend = MockBackend {
            encoded: Some(mock_payload(1920, 1440)),
            ..MockBackend::default()
        };
        let store = MockStore::new();

        let first =
            ingest(&backend, &store, &jpeg_source(4000, 3000), &IngestOptions::default(), None)
                .unwrap();
        let fetched = store.get(first.remote_key()).unwrap();
        let again = SourceImage::from_bytes(first.remote_key(), first.content_type(), fetched);
        let second = ingest(&backend, &store, &again, &IngestOptions::default(), None).unwrap();

        assert_ne!(first.remote_key(), second.remote_key());
        assert_eq!(second.dimensions(), Dimensions::new(1920, 1440));
    }

    // =========================================================================
    // Progress
    // =========================================================================

    #[test]
    fn progress_events_arrive_in_stage_order() {
        let backend = MockBackend::new();
        let store = MockStore::new();
        let (tx, rx) = mpsc::channel();

        let result = ingest(
            &backend,
            &store,
            &jpeg_source(4000, 3000),
            &IngestOptions::default(),
            Some(&tx),
        )
        .unwrap();
        drop(tx);

        let events: Vec<IngestEvent> = rx.iter().collect();
        let fractions: Vec<f32> = events.iter().map(IngestEvent::fraction).collect();
        assert_eq!(fractions, vec![0.1, 0.35, 0.6, 0.8, 0.9, 1.0]);
        assert!(events.iter().all(|e| e.name() == "Team Photo.JPG"));
        assert_eq!(
            events[2],
            IngestEvent::Resized {
                name: "Team Photo.JPG".to_string(),
                width: 1920,
                height: 1440
            }
        );
        assert_eq!(
            events.last(),
            Some(&IngestEvent::Uploaded {
                name: "Team Photo.JPG".to_string(),
                url: result.public_url().to_string()
            })
        );
    }

    #[test]
    fn failure_ends_with_failed_event() {
        let backend = MockBackend::new();
        let store = MockStore::new();
        let (tx, rx) = mpsc::channel();
        let source = SourceImage::from_bytes("broken.png", "image/png", b"nope".to_vec());

        ingest(&backend, &store, &source, &IngestOptions::default(), Some(&tx)).unwrap_err();
        drop(tx);

        let events: Vec<IngestEvent> = rx.iter().collect();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], IngestEvent::Validated { .. }));
        assert_eq!(
            events[1],
            IngestEvent::Failed {
                name: "broken.png".to_string(),
                message: "unreadable image".to_string()
            }
        );
    }

    #[test]
    fn dropped_receiver_does_not_fail_ingestion() {
        let backend = MockBackend::new();
        let store = MockStore::new();
        let (tx, rx) = mpsc::channel();
        drop(rx);

        let result = ingest(
            &backend,
            &store,
            &jpeg_source(10, 10),
            &IngestOptions::default(),
            Some(&tx),
        );
        assert!(result.is_ok());
    }

    // =========================================================================
    // Plan
    // =========================================================================

    #[test]
    fn plan_decodes_but_never_encodes_or_uploads() {
        let backend = MockBackend::new();

        let plan = plan(&backend, &jpeg_source(4000, 3000), &IngestOptions::default()).unwrap();

        assert_eq!(plan.source, Dimensions::new(4000, 3000));
        assert_eq!(plan.target, Dimensions::new(1920, 1440));
        assert!(plan.needs_resize());
        let ops = backend.get_operations();
        assert_eq!(ops.len(), 1);
        assert!(matches!(ops[0], RecordedOp::Decode { .. }));
    }

    #[test]
    fn options_from_config_trim_prefix() {
        let mut config = IngestConfig::default();
        config.storage.key_prefix = "/blog/2024/".to_string();
        assert_eq!(
            IngestOptions::from_config(&config).key_prefix.as_deref(),
            Some("blog/2024")
        );
        config.storage.key_prefix = String::new();
        assert_eq!(IngestOptions::from_config(&config).key_prefix, None);
    }
}
