//! Remote key construction for uploaded images.
//!
//! Every stored object gets a key of the form
//!
//! ```text
//! [prefix/]<stem>-<unix-millis>-<suffix>.<ext>
//! images/Team-Photo-1718000000000-k3x9qa.jpg
//! ```
//!
//! - `stem`: the original file name with its extension stripped and every
//!   character outside `[A-Za-z0-9_-]` replaced by `-` (see [`sanitize_stem`]).
//! - `unix-millis`: upload time. Orders keys and separates uploads of the same file.
//! - `suffix`: six random lowercase alphanumerics. Two clients uploading the
//!   same file name in the same millisecond still get different keys.
//!
//! The store additionally refuses to overwrite, so a collision surfaces as an
//! upload error instead of silently replacing an image.

use rand::Rng;
use rand::distr::Alphanumeric;
use std::time::{SystemTime, UNIX_EPOCH};

/// Stem used when sanitizing leaves nothing.
const FALLBACK_STEM: &str = "image";

/// Longest stem kept in a key.
const MAX_STEM_LEN: usize = 64;

const SUFFIX_LEN: usize = 6;

/// Longest key accepted by [`validate_key`].
const MAX_KEY_LEN: usize = 1024;

/// Sanitize a user-supplied file name into a key stem.
///
/// - `"Team Photo.JPG"` → `"Team-Photo"`
/// - `"C:\\Users\\me\\café.png"` → `"caf-"`
/// - `"archive.tar.gz"` → `"archive-tar"`
/// - `".jpg"` → `"image"`
pub fn sanitize_stem(file_name: &str) -> String {
    // Drop any directory part a browser or shell may have passed along.
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name);
    let stem = match base.rsplit_once('.') {
        Some((stem, _ext)) => stem,
        None => base,
    };

    let mut sanitized: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    sanitized.truncate(MAX_STEM_LEN);

    if sanitized.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        sanitized
    }
}

/// Six random lowercase alphanumerics.
pub fn random_suffix() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

/// Milliseconds since the Unix epoch (0 if the clock is before 1970).
pub fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Assemble a key from its parts. Pure, so tests can pin every component.
pub fn build_key(
    prefix: Option<&str>,
    file_name: &str,
    millis: u128,
    suffix: &str,
    extension: &str,
) -> String {
    let name = format!("{}-{}-{}.{}", sanitize_stem(file_name), millis, suffix, extension);
    match prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(p) => format!("{p}/{name}"),
        None => name,
    }
}

/// Derive a fresh key for `file_name` using the current time and a random suffix.
pub fn generate_key(prefix: Option<&str>, file_name: &str, extension: &str) -> String {
    build_key(prefix, file_name, unix_millis(), &random_suffix(), extension)
}

/// Check that a key (or key prefix) is safe to use as a storage path.
///
/// Rejects empty and over-long keys, path traversal, absolute paths, and
/// characters outside `[A-Za-z0-9._/-]`.
pub fn validate_key(key: &str) -> Result<(), String> {
    if key.is_empty() {
        return Err("key is empty".to_string());
    }
    if key.len() > MAX_KEY_LEN {
        return Err(format!("key is too long (max {MAX_KEY_LEN})"));
    }
    if key.contains("..") || key.starts_with('/') || key.contains("//") || key.contains('\\') {
        return Err(format!("key '{key}' escapes the store root"));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
    {
        return Err(format!("key '{key}' contains invalid characters"));
    }
    Ok(())
}
