//! Native encode-to-file backend
//!
//! Used when the platform capture service can encode and write the
//! destination file itself; the backend only sequences the service's
//! lifecycle and guards against misuse.

use crate::capture::backend::{BackendError, CaptureBackend, CaptureMetadata};
use crate::capture::config::RecordingConfig;
use async_trait::async_trait;
use std::path::Path;

/// Platform service that captures, encodes, and writes the file itself.
#[async_trait]
pub trait EncodedFileService: Send {
    /// Start capturing and writing `destination`.
    async fn begin(
        &mut self,
        config: &RecordingConfig,
        destination: &Path,
    ) -> Result<(), BackendError>;

    /// Stop capturing. Returns only once the service's internal writer has
    /// flushed and finalized the destination file.
    async fn finish(&mut self) -> Result<CaptureMetadata, BackendError>;

    /// Abort capture, releasing all service resources. Best-effort.
    async fn abort(&mut self);
}

/// Backend variant delegating encoding entirely to the platform service.
pub struct NativeFileBackend<S: EncodedFileService> {
    service: S,
    started: bool,
}

impl<S: EncodedFileService> NativeFileBackend<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            started: false,
        }
    }
}

#[async_trait]
impl<S: EncodedFileService> CaptureBackend for NativeFileBackend<S> {
    async fn start(
        &mut self,
        config: &RecordingConfig,
        destination: &Path,
    ) -> Result<(), BackendError> {
        if self.started {
            return Err(BackendError::AlreadyStarted);
        }

        if let Err(e) = self.service.begin(config, destination).await {
            // Tear down whatever the service managed to initialize before
            // reporting the failure.
            self.service.abort().await;
            return Err(e);
        }

        self.started = true;
        tracing::info!(?destination, "native capture started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<CaptureMetadata, BackendError> {
        if !self.started {
            return Err(BackendError::NotStarted);
        }
        self.started = false;

        let metadata = self.service.finish().await?;
        tracing::info!(
            duration_ms = metadata.duration_ms,
            frames = metadata.video_frames,
            "native capture stopped"
        );
        Ok(metadata)
    }

    async fn cancel(&mut self) {
        if self.started {
            self.started = false;
            self.service.abort().await;
            tracing::info!("native capture cancelled");
        }
    }
}
