//! Top-level error type for recording orchestration.

use crate::capture::backend::BackendError;
use crate::capture::config::ConfigError;
use crate::capture::probe::ProbeError;
use crate::output::atomic::OutputError;
use crate::recorder::state::SessionError;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the recording orchestrator.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error("failed to start capture: {0}")]
    BackendStartFailed(BackendError),

    #[error("failed to stop capture: {0}")]
    BackendStopFailed(BackendError),

    #[error("recording output failed validation: {0}")]
    OutputInvalid(ProbeError),

    /// GIF transcoding failed after a valid source video was produced. The
    /// source is kept on disk so the user's footage is not lost.
    #[error("GIF export failed: {message} (source kept at {source_video:?})")]
    ExportFailed {
        message: String,
        source_video: PathBuf,
    },

    #[error("screen recording permission denied")]
    PermissionDenied,
}

impl CaptureError {
    /// Path of footage preserved on disk despite the failure, if any.
    pub fn preserved_path(&self) -> Option<&PathBuf> {
        match self {
            CaptureError::ExportFailed { source_video, .. } => Some(source_video),
            _ => None,
        }
    }
}

/// Serializable form handed to UI layers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preserved_path: Option<String>,
}

impl From<&CaptureError> for ErrorResponse {
    fn from(err: &CaptureError) -> Self {
        let code = match err {
            CaptureError::Io(_) => "io",
            CaptureError::Session(_) => "session",
            CaptureError::Config(_) => "config",
            CaptureError::Output(_) => "output",
            CaptureError::BackendStartFailed(_) => "captureStart",
            CaptureError::BackendStopFailed(_) => "captureStop",
            CaptureError::OutputInvalid(_) => "invalidOutput",
            CaptureError::ExportFailed { .. } => "exportFailed",
            CaptureError::PermissionDenied => "permissionDenied",
        };
        Self {
            code: code.to_string(),
            message: err.to_string(),
            preserved_path: err
                .preserved_path()
                .map(|p| p.to_string_lossy().into_owned()),
        }
    }
}
