//! Recording targets, preferences, and resolved configuration
//!
//! A `RecordingConfig` is derived once at session start from the user's
//! preferences and the chosen target, and is immutable afterwards.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Frame rate ceiling applied when recording in GIF mode.
const GIF_MAX_FPS: u32 = 15;

/// What kind of artifact a session produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingMode {
    Video,
    Gif,
}

impl RecordingMode {
    /// File extension of the final artifact for this mode.
    pub fn extension(&self) -> &'static str {
        match self {
            RecordingMode::Video => "mp4",
            RecordingMode::Gif => "gif",
        }
    }
}

/// Quality tiers for the capture encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    Low,    // 720p, 5 Mbps
    Medium, // 1080p, 8 Mbps
    High,   // Native, 12 Mbps
}

impl QualityPreset {
    pub fn max_height(&self) -> u32 {
        match self {
            QualityPreset::Low => 720,
            QualityPreset::Medium => 1080,
            QualityPreset::High => u32::MAX,
        }
    }

    pub fn bitrate(&self) -> u32 {
        match self {
            QualityPreset::Low => 5_000_000,
            QualityPreset::Medium => 8_000_000,
            QualityPreset::High => 12_000_000,
        }
    }
}

/// What to capture. Chosen once per session, immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RecordingTarget {
    Fullscreen {
        /// Display to capture; `None` means the primary display.
        display_id: Option<u32>,
    },
    Area {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        display_id: u32,
    },
    Window {
        window_id: u32,
    },
}

/// User-level recording preferences, the raw input to config resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingPreferences {
    pub quality: QualityPreset,
    pub fps: u32,
    pub include_cursor: bool,
    pub include_microphone: bool,
    pub include_system_audio: bool,
}

impl Default for RecordingPreferences {
    fn default() -> Self {
        Self {
            quality: QualityPreset::High,
            fps: 60,
            include_cursor: true,
            include_microphone: false,
            include_system_audio: true,
        }
    }
}

/// Information about a display/screen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayInfo {
    pub id: u32,
    pub width: u32,
    pub height: u32,
    pub scale_factor: f64,
    pub is_primary: bool,
}

/// Information about a capturable window
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowInfo {
    pub id: u32,
    pub title: String,
    pub app_name: String,
    pub width: u32,
    pub height: u32,
}

/// Screen-recording permission as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionStatus {
    Authorized,
    Denied,
    Restricted,
    NotDetermined,
}

/// Enumerates capturable content. Implemented by the platform layer.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    async fn displays(&self) -> Result<Vec<DisplayInfo>, ConfigError>;
    async fn windows(&self) -> Result<Vec<WindowInfo>, ConfigError>;
}

/// Errors raised while resolving a recording configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("display {0} not found")]
    DisplayNotFound(u32),

    #[error("no displays available")]
    NoDisplays,

    #[error("window {0} not found")]
    WindowNotFound(u32),

    #[error("capture area is empty")]
    EmptyArea,

    #[error("content enumeration failed: {0}")]
    Enumeration(String),
}

/// Fully-resolved, immutable configuration for one recording session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingConfig {
    pub target: RecordingTarget,
    pub mode: RecordingMode,

    /// Output width in pixels (always even)
    pub width: u32,

    /// Output height in pixels (always even)
    pub height: u32,

    pub fps: u32,
    pub include_cursor: bool,
    pub capture_microphone: bool,
    pub capture_system_audio: bool,
    pub quality: QualityPreset,
}

impl RecordingConfig {
    /// Resolve a target + mode + preferences into a concrete configuration.
    ///
    /// GIF mode disables audio capture and caps the frame rate, since the
    /// export pipeline downsamples anyway.
    pub async fn resolve(
        target: RecordingTarget,
        mode: RecordingMode,
        prefs: &RecordingPreferences,
        provider: &dyn ContentProvider,
    ) -> Result<Self, ConfigError> {
        let (raw_width, raw_height) = match &target {
            RecordingTarget::Fullscreen { display_id } => {
                let display = find_display(provider, *display_id).await?;
                (
                    (display.width as f64 * display.scale_factor) as u32,
                    (display.height as f64 * display.scale_factor) as u32,
                )
            }
            RecordingTarget::Area {
                width,
                height,
                display_id,
                ..
            } => {
                if *width < 1.0 || *height < 1.0 {
                    return Err(ConfigError::EmptyArea);
                }
                let display = find_display(provider, Some(*display_id)).await?;
                (
                    (*width * display.scale_factor) as u32,
                    (*height * display.scale_factor) as u32,
                )
            }
            RecordingTarget::Window { window_id } => {
                let windows = provider.windows().await?;
                let window = windows
                    .iter()
                    .find(|w| w.id == *window_id)
                    .ok_or(ConfigError::WindowNotFound(*window_id))?;
                (window.width, window.height)
            }
        };

        let (width, height) = clamp_to_preset(raw_width, raw_height, prefs.quality);

        let audio = mode == RecordingMode::Video;
        let fps = match mode {
            RecordingMode::Video => prefs.fps,
            RecordingMode::Gif => prefs.fps.min(GIF_MAX_FPS),
        };

        Ok(Self {
            target,
            mode,
            width,
            height,
            fps,
            include_cursor: prefs.include_cursor,
            capture_microphone: audio && prefs.include_microphone,
            capture_system_audio: audio && prefs.include_system_audio,
            quality: prefs.quality,
        })
    }
}

async fn find_display(
    provider: &dyn ContentProvider,
    display_id: Option<u32>,
) -> Result<DisplayInfo, ConfigError> {
    let displays = provider.displays().await?;
    match display_id {
        Some(id) => displays
            .into_iter()
            .find(|d| d.id == id)
            .ok_or(ConfigError::DisplayNotFound(id)),
        None => displays
            .into_iter()
            .find(|d| d.is_primary)
            .ok_or(ConfigError::NoDisplays),
    }
}

/// Scale dimensions down to the preset's max height, preserving aspect ratio,
/// and round both to even values for encoder compatibility.
fn clamp_to_preset(width: u32, height: u32, quality: QualityPreset) -> (u32, u32) {
    let max_height = quality.max_height();
    let (w, h) = if height > max_height {
        let scaled = (width as f64 * max_height as f64 / height as f64) as u32;
        (scaled, max_height)
    } else {
        (width, height)
    };
    (w & !1, h & !1)
}
