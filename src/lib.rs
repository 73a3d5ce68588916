//! # folio-ingest
//!
//! Image ingestion for a portfolio site's admin panel. An editor picks or
//! drops an image; this crate turns it into a bounded, re-encoded object in a
//! blob store and hands back the public URL that the content entry links to.
//!
//! # Architecture: One Linear Pipeline
//!
//! ```text
//! SourceImage ─▶ validate ─▶ decode ─▶ resize ─▶ encode ─▶ upload ─▶ UploadResult
//!                 (ingest)   (imaging backend)             (storage)
//! ```
//!
//! Every stage runs in order on the caller's thread. Nothing is written until
//! the final upload, and the upload refuses to overwrite, so a failed or
//! abandoned call leaves no trace and concurrent calls need no locking.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`ingest`] | The [`ingest::ingest`] operation, its input, result, error and progress types |
//! | [`imaging`] | Pure-Rust decode, fit-within-bounds math, Lanczos3 resample, JPEG/AVIF encode |
//! | [`storage`] | [`storage::ObjectStore`] trait with filesystem and S3-style HTTP backends |
//! | [`naming`] | File-name sanitizing and collision-resistant key construction |
//! | [`config`] | Layered `folio.toml` loading over stock defaults, validation, stock config |
//! | [`output`] | CLI output formatting for progress, results and `check` plans |
//!
//! # Design Decisions
//!
//! ## Backends Behind Traits
//!
//! Both collaborators with side effects sit behind a trait: pixel work behind
//! [`imaging::ImageBackend`], blob writes behind [`storage::ObjectStore`]. The
//! pipeline tests run against recording mocks of both, so every failure path
//! is checked without encoding a real image or opening a socket.
//!
//! ## Keys Are Never Reused
//!
//! Keys combine the sanitized file name, the upload time in milliseconds and
//! a random suffix, and every write is conditional on the key being free.
//! Uploading the same photo twice yields two objects; retrying after a
//! collision simply derives a new key.

pub mod config;
pub mod imaging;
pub mod ingest;
pub mod naming;
pub mod output;
pub mod storage;
