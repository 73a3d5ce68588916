//! Ingestion configuration module.
//!
//! Handles loading, validating, and merging `folio.toml`. Stock defaults are
//! the base layer; the user's file overrides any subset of keys; command-line
//! flags override both.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [images]
//! max_width = 1920          # Output never wider than this
//! max_height = 1920         # Output never taller than this
//! quality = 80              # Lossy encoding quality (1-100, clamped)
//! format = "jpeg"           # "jpeg" or "avif"
//!
//! [limits]
//! max_source_bytes = 10485760    # 10 MiB upload ceiling
//! max_decoded_pixels = 100000000 # Refuse to decode anything larger
//!
//! [storage]
//! backend = "local"         # "local" or "http"
//! key_prefix = "images"     # Folder inside the store
//! public_base_url = "http://localhost:8080/uploads"
//! root = "uploads"          # local: directory objects are written to
//! endpoint = ""             # http: S3-style endpoint
//! bucket = ""               # http: bucket name
//! timeout_secs = 30         # http: per-request timeout
//!
//! [processing]
//! max_processes = 4         # Max parallel ingestions (omit for auto = CPU cores)
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse. Override just the values you want:
//!
//! ```toml
//! [images]
//! quality = 70
//! ```
//!
//! Unknown keys are rejected to catch typos early. The storage bearer token
//! is not a config key; it is read from `FOLIO_STORAGE_TOKEN`.

use crate::imaging::{DecodeLimits, OutputFormat, Quality, ResizeBounds};
use crate::naming::validate_key;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILENAME: &str = "folio.toml";

/// Environment variable holding the HTTP store's bearer token.
pub const TOKEN_ENV: &str = "FOLIO_STORAGE_TOKEN";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Ingestion configuration loaded from `folio.toml`.
///
/// All fields have sensible defaults. User config files need only specify
/// the values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    /// Output shape and encoding.
    pub images: ImagesConfig,
    /// Input ceilings.
    pub limits: LimitsConfig,
    /// Where uploads go.
    pub storage: StorageConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl IngestConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.images.max_width == 0 || self.images.max_height == 0 {
            return Err(ConfigError::Validation(
                "images.max_width and images.max_height must be positive".into(),
            ));
        }
        if self.limits.max_source_bytes == 0 {
            return Err(ConfigError::Validation(
                "limits.max_source_bytes must be positive".into(),
            ));
        }
        if self.limits.max_decoded_pixels == 0 {
            return Err(ConfigError::Validation(
                "limits.max_decoded_pixels must be positive".into(),
            ));
        }
        let prefix = self.storage.key_prefix.trim_matches('/');
        if !prefix.is_empty() {
            validate_key(prefix)
                .map_err(|e| ConfigError::Validation(format!("storage.key_prefix: {e}")))?;
        }
        if self.storage.backend == StorageBackendKind::Http {
            if self.storage.endpoint.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "storage.endpoint is required for the http backend".into(),
                ));
            }
            if self.storage.bucket.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "storage.bucket is required for the http backend".into(),
                ));
            }
            if self.storage.timeout_secs == 0 {
                return Err(ConfigError::Validation(
                    "storage.timeout_secs must be positive".into(),
                ));
            }
        }
        Ok(())
    }

    /// Resize bounds from `[images]`. Only meaningful after [`validate`](Self::validate).
    pub fn bounds(&self) -> ResizeBounds {
        ResizeBounds::new(self.images.max_width, self.images.max_height).unwrap_or_default()
    }

    pub fn quality(&self) -> Quality {
        Quality::new(self.images.quality)
    }

    pub fn decode_limits(&self) -> DecodeLimits {
        DecodeLimits {
            max_pixels: self.limits.max_decoded_pixels,
        }
    }
}

/// Output shape and encoding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// Maximum output width in pixels.
    pub max_width: u32,
    /// Maximum output height in pixels.
    pub max_height: u32,
    /// Lossy encoding quality (1 = worst, 100 = best).
    pub quality: u32,
    /// Re-encoding target.
    pub format: OutputFormat,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            max_width: 1920,
            max_height: 1920,
            quality: 80,
            format: OutputFormat::Jpeg,
        }
    }
}

/// Input ceilings checked before and during decode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Largest accepted source payload in bytes.
    pub max_source_bytes: u64,
    /// Largest raster (width × height) the decoder will produce.
    pub max_decoded_pixels: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_source_bytes: 10 * 1024 * 1024,
            max_decoded_pixels: DecodeLimits::default().max_pixels,
        }
    }
}

/// Which [`ObjectStore`](crate::storage::ObjectStore) implementation to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    #[default]
    Local,
    Http,
}

/// Object store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub backend: StorageBackendKind,
    /// Folder inside the store that keys are created under. Empty for none.
    pub key_prefix: String,
    /// Base URL objects are publicly served from.
    pub public_base_url: String,
    /// Local backend: directory objects are written to.
    pub root: PathBuf,
    /// HTTP backend: S3-style endpoint, e.g. `https://s3.eu-west-1.amazonaws.com`.
    pub endpoint: String,
    /// HTTP backend: bucket name.
    pub bucket: String,
    /// HTTP backend: per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendKind::Local,
            key_prefix: "images".to_string(),
            public_base_url: "http://localhost:8080/uploads".to_string(),
            root: PathBuf::from("uploads"),
            endpoint: String::new(),
            bucket: String::new(),
            timeout_secs: 30,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of ingestions running at once.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// Command-line overrides applied on top of the merged config.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub quality: Option<u32>,
    pub format: Option<OutputFormat>,
}

impl Overrides {
    /// Apply overrides. Quality is clamped into 1-100.
    pub fn apply(&self, config: &mut IngestConfig) {
        if let Some(w) = self.max_width {
            config.images.max_width = w;
        }
        if let Some(h) = self.max_height {
            config.images.max_height = h;
        }
        if let Some(q) = self.quality {
            config.images.quality = Quality::new(q).value() as u32;
        }
        if let Some(f) = self.format {
            config.images.format = f;
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(IngestConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
///
/// Quality is clamped into 1-100 like every other way of setting it.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<IngestConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let mut config: IngestConfig = merged.try_into()?;
    config.images.quality = config.quality().value() as u32;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, merged over stock defaults and validated.
///
/// A missing file is not an error: the stock defaults are used.
pub fn load_config(path: &Path) -> Result<IngestConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Load config, apply command-line overrides, and re-validate.
pub fn load_config_with_overrides(
    path: &Path,
    overrides: &Overrides,
) -> Result<IngestConfig, ConfigError> {
    let mut config = load_config(path)?;
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock `folio.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# folio-ingest Configuration
# ==========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Command-line flags (--max-width, --max-height, --quality, --format)
# override this file. Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Output images
# ---------------------------------------------------------------------------
[images]
# Uploads are scaled down (never up) to fit inside max_width x max_height,
# keeping their aspect ratio.
max_width = 1920
max_height = 1920

# Lossy encoding quality (1 = worst, 100 = best).
# Values outside 1-100 are clamped.
quality = 80

# Re-encoding target: "jpeg" (fast, universal) or "avif" (smaller, slower).
format = "jpeg"

# ---------------------------------------------------------------------------
# Input limits
# ---------------------------------------------------------------------------
[limits]
# Largest accepted source file in bytes (10 MiB).
max_source_bytes = 10485760

# Largest raster (width x height) the decoder will produce.
max_decoded_pixels = 100000000

# ---------------------------------------------------------------------------
# Storage
# ---------------------------------------------------------------------------
[storage]
# "local" writes files under `root`; "http" PUTs to an S3-style endpoint.
backend = "local"

# Folder inside the store that uploads are created under.
key_prefix = "images"

# Base URL the stored objects are publicly served from.
public_base_url = "http://localhost:8080/uploads"

# local backend: directory objects are written to.
root = "uploads"

# http backend: endpoint and bucket. The bearer token is read from the
# FOLIO_STORAGE_TOKEN environment variable, never from this file.
endpoint = ""
bucket = ""

# http backend: per-request timeout in seconds.
timeout_secs = 30

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel ingestions.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
