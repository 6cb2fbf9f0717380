//! Finalized-file validation
//!
//! Every finalized video (including the GIF pipeline's intermediate video)
//! is checked before being handed downstream: the file must exist,
//! be non-empty, contain a decodable video track with a finite positive
//! duration, and a frame near the start of the timeline must decode.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;
use thiserror::Error;

/// Metadata probed from a finalized video file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration_ms: f64,
    pub codec: String,
}

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("failed to run ffprobe: {0}")]
    Spawn(String),

    #[error("probe failed: {0}")]
    Probe(String),

    #[error("no video stream found")]
    NoVideoStream,

    #[error("{0}")]
    Invalid(String),
}

/// Inspects a video file. Implemented with ffprobe in production; tests
/// inject stubs.
pub trait VideoProbe: Send + Sync {
    fn probe(&self, path: &Path) -> Result<VideoMetadata, ProbeError>;

    /// Decode a single frame near the start of the timeline, discarding the
    /// output. Fails if the container lies about having decodable video.
    fn decode_head_frame(&self, path: &Path) -> Result<(), ProbeError>;
}

/// ffprobe/ffmpeg-backed probe.
pub struct FfprobeProbe;

impl VideoProbe for FfprobeProbe {
    fn probe(&self, path: &Path) -> Result<VideoMetadata, ProbeError> {
        let path_str = path.to_string_lossy();
        let output = Command::new("ffprobe")
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_streams",
                "-show_format",
                "-select_streams",
                "v:0",
                path_str.as_ref(),
            ])
            .output()
            .map_err(|e| ProbeError::Spawn(e.to_string()))?;

        if !output.status.success() {
            return Err(ProbeError::Probe(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }

        parse_ffprobe_json(&String::from_utf8_lossy(&output.stdout))
    }

    fn decode_head_frame(&self, path: &Path) -> Result<(), ProbeError> {
        let path_str = path.to_string_lossy();
        let output = Command::new("ffmpeg")
            .args([
                "-v",
                "error",
                "-i",
                path_str.as_ref(),
                "-frames:v",
                "1",
                "-f",
                "null",
                "-",
            ])
            .output()
            .map_err(|e| ProbeError::Spawn(e.to_string()))?;

        if !output.status.success() {
            return Err(ProbeError::Invalid(format!(
                "probe frame failed to decode: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// Parse ffprobe's JSON output into metadata.
fn parse_ffprobe_json(json_str: &str) -> Result<VideoMetadata, ProbeError> {
    let json: serde_json::Value =
        serde_json::from_str(json_str).map_err(|e| ProbeError::Probe(e.to_string()))?;

    let streams = json
        .get("streams")
        .and_then(|s| s.as_array())
        .ok_or(ProbeError::NoVideoStream)?;

    let video_stream = streams.first().ok_or(ProbeError::NoVideoStream)?;

    let width = video_stream
        .get("width")
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32;

    let height = video_stream
        .get("height")
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32;

    let codec = video_stream
        .get("codec_name")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    // Frame rate can be "30/1" or "29.97"
    let fps = video_stream
        .get("r_frame_rate")
        .and_then(|v| v.as_str())
        .map(parse_frame_rate)
        .unwrap_or(0.0);

    // Duration from the format section is more reliable than the stream's
    let duration_secs = json
        .get("format")
        .and_then(|f| f.get("duration"))
        .and_then(|d| d.as_str())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(VideoMetadata {
        width,
        height,
        fps,
        duration_ms: duration_secs * 1000.0,
        codec,
    })
}

fn parse_frame_rate(s: &str) -> f64 {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().unwrap_or(0.0);
        let den: f64 = den.parse().unwrap_or(1.0);
        if den > 0.0 {
            num / den
        } else {
            0.0
        }
    } else {
        s.parse().unwrap_or(0.0)
    }
}

/// Validate a finalized video file against the full check list. Returns the
/// probed metadata so callers can reuse it.
pub fn validate_video(probe: &dyn VideoProbe, path: &Path) -> Result<VideoMetadata, ProbeError> {
    let file_len = std::fs::metadata(path)
        .map_err(|_| ProbeError::Invalid(format!("file does not exist: {}", path.display())))?
        .len();
    if file_len == 0 {
        return Err(ProbeError::Invalid(format!(
            "file is empty: {}",
            path.display()
        )));
    }

    let metadata = probe.probe(path)?;

    if metadata.width == 0 || metadata.height == 0 {
        return Err(ProbeError::Invalid(
            "no decodable video track".to_string(),
        ));
    }
    if !metadata.duration_ms.is_finite() || metadata.duration_ms <= 0.0 {
        return Err(ProbeError::Invalid(format!(
            "invalid duration: {} ms",
            metadata.duration_ms
        )));
    }

    probe.decode_head_frame(path)?;

    tracing::debug!(
        path = %path.display(),
        width = metadata.width,
        height = metadata.height,
        duration_ms = metadata.duration_ms,
        "output file validated"
    );
    Ok(metadata)
}
