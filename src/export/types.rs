//! GIF export types: options, errors, and the shared cancellation flag.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Quality tiers for GIF transcoding. Lower tiers shrink the palette and the
/// output width; GIFs get large fast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GifQuality {
    Low,
    Medium,
    High,
}

impl GifQuality {
    /// Maximum palette size passed to the encoder.
    pub fn max_colors(&self) -> u32 {
        match self {
            GifQuality::Low => 64,
            GifQuality::Medium => 128,
            GifQuality::High => 256,
        }
    }

    /// Output width ceiling; the source is scaled down preserving aspect.
    pub fn max_width(&self) -> u32 {
        match self {
            GifQuality::Low => 480,
            GifQuality::Medium => 720,
            GifQuality::High => 960,
        }
    }
}

/// Options for one GIF export job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GifExportOptions {
    /// Output frame rate; the decoder downsamples the source to this.
    pub frame_rate: u32,

    pub quality: GifQuality,
}

/// GIF export errors
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    #[error("Decoding error: {0}")]
    Decoding(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Export cancelled")]
    Cancelled,
}

/// Cooperative cancellation flag shared between the export job and whoever
/// may cancel it. Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. The job notices at its next check point,
    /// bounded by one frame's processing latency.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Clear the flag before starting a new job.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}
