//! CLI output formatting for the ingestion commands.
//!
//! # Output Format
//!
//! ## Ingest (progress, one line per stage)
//!
//! ```text
//! [ 10%] Team Photo.JPG: validated (2.4 MB)
//! [ 35%] Team Photo.JPG: decoded 4000x3000
//! [ 60%] Team Photo.JPG: resized to 1920x1440
//! [ 80%] Team Photo.JPG: encoded (412.0 KB)
//! [ 90%] Team Photo.JPG: uploading images/Team-Photo-1718000000000-k3x9qa.jpg
//! [100%] Team Photo.JPG: uploaded
//! ```
//!
//! ## Ingest (results)
//!
//! ```text
//! Team Photo.JPG → https://cdn.example.com/images/Team-Photo-1718000000000-k3x9qa.jpg
//!     Key: images/Team-Photo-1718000000000-k3x9qa.jpg
//!     Size: 1920x1440, 2.4 MB → 412.0 KB (6.0x smaller)
//! notes.txt ✗ notes.txt is not an image (media type 'application/octet-stream')
//!
//! Uploaded 1 image, 1 failed
//! ```
//!
//! ## Check
//!
//! ```text
//! Team Photo.JPG: 4000x3000 → 1920x1440 (2.4 MB)
//! logo.png: 640x480, no resize (18.2 KB)
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (pure, returns `String` or
//! `Vec<String>`) and, where the CLI needs it, a `print_*` wrapper that
//! writes to stdout. With `--json`, each result is one JSON object per line.

use crate::ingest::{IngestError, IngestEvent, IngestPlan, UploadResult};

/// Human-readable byte count with one decimal place above 1 KB.
fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    let b = bytes as f64;
    if b >= MB {
        format!("{:.1} MB", b / MB)
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{bytes} B")
    }
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

/// Format a single progress event as one display line.
pub fn format_event(event: &IngestEvent) -> String {
    let percent = (event.fraction() * 100.0).round() as u32;
    let detail = match event {
        IngestEvent::Validated { bytes, .. } => format!("validated ({})", format_bytes(*bytes)),
        IngestEvent::Decoded { width, height, .. } => format!("decoded {width}x{height}"),
        IngestEvent::Resized { width, height, .. } => format!("resized to {width}x{height}"),
        IngestEvent::Encoded { bytes, .. } => format!("encoded ({})", format_bytes(*bytes)),
        IngestEvent::Uploading { key, .. } => format!("uploading {key}"),
        IngestEvent::Uploaded { .. } => "uploaded".to_string(),
        IngestEvent::Failed { message, .. } => format!("failed: {message}"),
    };
    format!("[{percent:>3}%] {}: {detail}", event.name())
}

/// Format a successful ingestion.
pub fn format_result(name: &str, result: &UploadResult) -> Vec<String> {
    let dims = result.dimensions();
    let mut size = format!(
        "    Size: {}x{}, {} → {}",
        dims.width,
        dims.height,
        format_bytes(result.source_bytes()),
        format_bytes(result.stored_bytes())
    );
    if let Some(ratio) = result.compression_ratio() {
        if ratio >= 1.0 {
            size.push_str(&format!(" ({ratio:.1}x smaller)"));
        } else {
            size.push_str(&format!(" ({:.1}x larger)", 1.0 / ratio));
        }
    }
    vec![
        format!("{name} → {}", result.public_url()),
        format!("    Key: {}", result.remote_key()),
        size,
    ]
}

/// Format a failed ingestion using the error's user-facing message.
pub fn format_failure(name: &str, error: &IngestError) -> String {
    let mut line = format!("{name} ✗ {}", error.user_message());
    if error.is_retryable() {
        line.push_str(" (retryable)");
    }
    line
}

/// Final tally after all inputs finished.
pub fn format_summary(succeeded: usize, failed: usize) -> String {
    if failed == 0 {
        format!("Uploaded {}", plural(succeeded, "image"))
    } else {
        format!("Uploaded {}, {} failed", plural(succeeded, "image"), failed)
    }
}

/// One JSON object describing a successful ingestion.
pub fn format_result_json(name: &str, result: &UploadResult) -> String {
    serde_json::json!({
        "name": name,
        "ok": true,
        "result": result,
    })
    .to_string()
}

/// One JSON object describing a failed ingestion.
pub fn format_failure_json(name: &str, error: &IngestError) -> String {
    serde_json::json!({
        "name": name,
        "ok": false,
        "error": {
            "kind": error.kind(),
            "message": error.user_message(),
            "detail": error.to_string(),
            "retryable": error.is_retryable(),
        },
    })
    .to_string()
}

/// Format the outcome of `check` for one input.
pub fn format_plan(plan: &IngestPlan) -> String {
    let source = format!("{}x{}", plan.source.width, plan.source.height);
    if plan.needs_resize() {
        format!(
            "{}: {source} → {}x{} ({})",
            plan.name,
            plan.target.width,
            plan.target.height,
            format_bytes(plan.source_bytes)
        )
    } else {
        format!(
            "{}: {source}, no resize ({})",
            plan.name,
            format_bytes(plan.source_bytes)
        )
    }
}

pub fn print_result(name: &str, result: &UploadResult, json: bool) {
    if json {
        println!("{}", format_result_json(name, result));
    } else {
        for line in format_result(name, result) {
            println!("{}", line);
        }
    }
}

pub fn print_failure(name: &str, error: &IngestError, json: bool) {
    if json {
        println!("{}", format_failure_json(name, error));
    } else {
        println!("{}", format_failure(name, error));
    }
}
