use super::{ObjectStore, PutOptions, PutReceipt, StoreError, join_url};
use crate::naming::validate_key;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Name prefix of in-flight writes. Dropped on failure, renamed on success.
const STAGING_PREFIX: &str = ".upload-";

/// Filesystem-backed store: objects are files under `root`, served by some
/// static file server at `public_base_url`.
///
/// Only the bytes are written; `content_type` is not recorded. The file
/// server derives it from the key's extension, which `naming::generate_key`
/// always sets from the output format.
pub struct LocalStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key).map_err(StoreError::InvalidKey)?;
        Ok(self.root.join(key))
    }
}

impl ObjectStore for LocalStore {
    fn name(&self) -> &'static str {
        "local"
    }

    fn put(
        &self,
        key: &str,
        bytes: &[u8],
        _content_type: &str,
        options: PutOptions,
    ) -> Result<PutReceipt, StoreError> {
        let started = Instant::now();
        let path = self.object_path(key)?;
        let parent = path.parent().unwrap_or(self.root.as_path());
        fs::create_dir_all(parent)?;

        // Staged next to the target so the publish is a same-filesystem rename;
        // readers see either no object or the complete one.
        let mut staged = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(parent)?;
        staged.write_all(bytes)?;
        staged.as_file().sync_all()?;

        let published = if options.fail_on_exists {
            staged.persist_noclobber(&path)
        } else {
            staged.persist(&path)
        };
        match published {
            Ok(_) => {}
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::Conflict {
                    key: key.to_string(),
                });
            }
            Err(e) => return Err(StoreError::Io(e.error)),
        }

        tracing::debug!(
            backend = "local",
            key,
            bytes = bytes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "object written"
        );
        Ok(PutReceipt {
            url: self.public_url(key),
        })
    }

    fn public_url(&self, key: &str) -> String {
        join_url(&self.public_base_url, key)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.object_path(key)?;
        fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StoreError::NotFound {
                key: key.to_string(),
            },
            _ => StoreError::Io(e),
        })
    }
}
