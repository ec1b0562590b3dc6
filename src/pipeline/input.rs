//! Input classification: read an uploaded file set and split it into markup
//! and stylesheet content.
//!
//! Classification is by filename extension only — the ingestion layer hands
//! us an original filename and a path to readable bytes, and `.css` (ASCII
//! case-insensitive) marks a stylesheet. Everything else is treated as
//! markup. Contents are concatenated in encounter order within each
//! partition, so submitting `a.html, b.css, c.html` merges `a` then `c` as
//! the body and `b` as the styles regardless of which read finishes first.

use crate::error::PlatenError;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One uploaded file: the original filename (classification key) plus the
/// path its content was spooled to by the ingestion layer.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub name: String,
    pub path: PathBuf,
}

impl InputFile {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Build an `InputFile` whose name is the path's final component.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { name, path }
    }

    /// `true` when the original filename carries a `.css` extension.
    pub fn is_stylesheet(&self) -> bool {
        Path::new(&self.name)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("css"))
    }
}

/// Read every file concurrently and partition into `(markup, styles)`.
///
/// Both partitions preserve encounter order. Any unreadable file fails the
/// whole conversion — a half-assembled document would render, cache, and
/// serve the wrong artifact.
pub async fn read_and_partition(files: &[InputFile]) -> Result<(String, String), PlatenError> {
    let reads = files.iter().map(|file| async move {
        tokio::fs::read_to_string(&file.path)
            .await
            .map_err(|e| PlatenError::InputRead {
                path: file.path.clone(),
                source: e,
            })
    });
    let contents = futures::future::try_join_all(reads).await?;

    let mut markup = String::new();
    let mut styles = String::new();
    for (file, content) in files.iter().zip(contents) {
        if file.is_stylesheet() {
            styles.push_str(&content);
        } else {
            markup.push_str(&content);
        }
    }
    debug!(
        "partitioned {} files: {} markup bytes, {} stylesheet bytes",
        files.len(),
        markup.len(),
        styles.len()
    );
    Ok((markup, styles))
}

/// Delete ephemeral upload files after the response has been delivered.
///
/// Fire-and-forget: runs on a spawned task with no ordering guarantee
/// relative to subsequent requests. Failures are logged, never propagated —
/// the response is already gone.
pub fn cleanup_uploads(files: Vec<InputFile>) {
    if files.is_empty() {
        return;
    }
    tokio::spawn(async move {
        for file in files {
            if let Err(err) = tokio::fs::remove_file(&file.path).await {
                warn!("could not remove upload '{}': {err}", file.path.display());
            }
        }
    });
}
