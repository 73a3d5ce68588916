//! Object store collaborator for uploaded images.
//!
//! The pipeline only needs three things from a blob store: write a payload
//! under a key without clobbering anything already there, say where the
//! public copy lives, and read a payload back. [`ObjectStore`] captures that
//! contract; [`LocalStore`] and [`HttpStore`] implement it.
//!
//! | Backend | Write | No-overwrite mechanism |
//! |---|---|---|
//! | [`LocalStore`] | file under a root directory | `create_new` |
//! | [`HttpStore`] | `PUT {endpoint}/{bucket}/{key}` | `If-None-Match: *` → 412 |

mod http;
mod local;

pub use http::HttpStore;
pub use local::LocalStore;

use crate::config::{StorageBackendKind, StorageConfig};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("object already exists at '{key}'")]
    Conflict { key: String },
    #[error("object not found: {key}")]
    NotFound { key: String },
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether re-running the whole ingestion (which derives a fresh key) may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Conflict { .. } | Self::Network(_) | Self::Io(_) => true,
            Self::Rejected { status, .. } => *status >= 500,
            Self::NotFound { .. } | Self::InvalidKey(_) => false,
        }
    }
}

/// Options for a single write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutOptions {
    /// Refuse to replace an existing object at the same key.
    pub fail_on_exists: bool,
}

impl Default for PutOptions {
    fn default() -> Self {
        Self {
            fail_on_exists: true,
        }
    }
}

/// What the store reports back after a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutReceipt {
    pub url: String,
}

/// A blob store that uploaded images are written to.
///
/// Implementations must be `Sync`: one store is shared by every ingestion
/// running on the rayon pool.
pub trait ObjectStore: Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Write `bytes` under `key` in a single operation.
    ///
    /// A failed write must leave nothing behind at `key`.
    fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
        options: PutOptions,
    ) -> Result<PutReceipt, StoreError>;

    /// Public URL an object at `key` is (or would be) served from.
    fn public_url(&self, key: &str) -> String;

    /// Read an object back.
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;
}

/// Join a base URL and a key with exactly one slash between them.
pub(crate) fn join_url(base: &str, key: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        key.trim_start_matches('/')
    )
}

/// Build the store selected by `[storage]` config.
///
/// `bearer_token` is passed separately so secrets never live in the config file.
pub fn open_store(
    config: &StorageConfig,
    bearer_token: Option<String>,
) -> Result<Box<dyn ObjectStore + Send>, StoreError> {
    match config.backend {
        StorageBackendKind::Local => Ok(Box::new(LocalStore::new(
            config.root.clone(),
            config.public_base_url.clone(),
        ))),
        StorageBackendKind::Http => {
            let store = HttpStore::new(
                config.endpoint.clone(),
                config.bucket.clone(),
                config.public_base_url.clone(),
                std::time::Duration::from_secs(config.timeout_secs),
            )?
            .with_bearer_token(bearer_token);
            Ok(Box::new(store))
        }
    }
}
