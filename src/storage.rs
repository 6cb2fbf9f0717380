//! Capture history and output naming
//!
//! Finished captures are recorded through the `HistoryStore` boundary;
//! the orchestrator never cares how history is persisted or displayed.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// What kind of artifact a finished capture produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureKind {
    Recording,
    Gif,
}

impl CaptureKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            CaptureKind::Recording => "Recording",
            CaptureKind::Gif => "GIF",
        }
    }
}

/// One entry in the capture history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRecord {
    pub id: Uuid,
    pub kind: CaptureKind,
    pub path: PathBuf,

    /// RFC 3339 creation timestamp
    pub created_at: String,
}

impl CaptureRecord {
    pub fn new(kind: CaptureKind, path: &Path) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            path: path.to_path_buf(),
            created_at: Local::now().to_rfc3339(),
        }
    }
}

/// Records finished captures. Implementations must not fail the capture:
/// a recording that exists on disk is a success even if bookkeeping hiccups.
pub trait HistoryStore: Send + Sync {
    fn save(&self, final_path: &Path, kind: CaptureKind) -> CaptureRecord;
}

/// Human-readable output filename, e.g.
/// `Recording 2026-08-27 at 14.03.21.mp4`.
pub fn capture_filename(kind: CaptureKind, extension: &str) -> String {
    let stamp = Local::now().format("%Y-%m-%d at %H.%M.%S");
    format!("{} {stamp}.{extension}", kind.display_name())
}

/// Default directory for finished captures, created on demand by the
/// output layer. Falls back to the current directory when the platform
/// reports no data directory.
pub fn default_captures_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("screencap")
        .join("captures")
}
