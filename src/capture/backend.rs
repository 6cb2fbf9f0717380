//! Capture backend contract
//!
//! A backend drives frame/audio acquisition for exactly one session and
//! writes encoded media to the destination path it was started with. Two
//! variants exist (see `native` and `relay`), selected at construction time
//! by platform capability rather than runtime type inspection.

use crate::capture::config::RecordingConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Track and timing information reported by a backend after `stop`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureMetadata {
    /// Wall-clock duration of the captured media in milliseconds
    pub duration_ms: f64,

    /// Number of video frames written
    pub video_frames: u64,

    /// Whether an audio track was written alongside the video
    pub has_audio_track: bool,
}

/// Kind of a raw sample delivered by the platform capture service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    Video,
    Audio,
}

/// One raw sample buffer from the platform delivery queue.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    pub kind: SampleKind,

    /// Presentation timestamp relative to the service's own clock
    pub timestamp: Duration,

    pub data: Vec<u8>,
}

/// Errors raised by capture backends and the platform services behind them.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Capture failed to start: {0}")]
    StartFailed(String),

    #[error("Capture failed to stop: {0}")]
    StopFailed(String),

    #[error("Media writer error: {0}")]
    Writer(String),

    #[error("Backend was never started")]
    NotStarted,

    #[error("Backend already started")]
    AlreadyStarted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    /// Whether this failure should send the user to the permission prompt.
    pub fn is_permission(&self) -> bool {
        matches!(self, BackendError::PermissionDenied(_))
    }
}

/// Drives capture for a single session.
///
/// Instances are created fresh per session and dropped once `stop` or
/// `cancel` resolves; they are never reused.
#[async_trait]
pub trait CaptureBackend: Send {
    /// Begin capturing to `destination`. A failed start leaves no
    /// partially-initialized backend resources behind.
    async fn start(
        &mut self,
        config: &RecordingConfig,
        destination: &Path,
    ) -> Result<(), BackendError>;

    /// Stop capturing. Blocks until every already-delivered buffer has been
    /// flushed to the destination; the file must not be trusted before this
    /// returns. A failed stop means the output is suspect.
    async fn stop(&mut self) -> Result<CaptureMetadata, BackendError>;

    /// Best-effort abort. Never fails; any partial output left at the
    /// destination is the caller's to discard.
    async fn cancel(&mut self);
}

/// What the platform capture service is able to do, probed at startup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureCapabilities {
    /// The service can encode and write the destination file itself. When
    /// false, raw sample buffers are relayed through a `MediaWriter`.
    pub encodes_to_file: bool,
}

/// Constructs the backend variant appropriate for the current platform.
pub trait BackendFactory: Send + Sync {
    fn create(&self, config: &RecordingConfig) -> Box<dyn CaptureBackend>;
}
