//! GIF export job
//!
//! Transcodes a finished video file into an animated GIF as one cancellable
//! unit of work. Progress is fractional (0.0 to 1.0) and monotonically
//! non-decreasing, computed from decoded-frame-index / total-frame-count.

use crate::export::ffmpeg::{FfmpegFrameDecoder, FfmpegGifEncoder};
use crate::export::types::{CancelFlag, ExportError, GifExportOptions};
use std::path::Path;

/// Produces RGBA frames from the source video, already downsampled to the
/// export frame rate and scaled to the export width.
pub trait FrameDecoder: Send {
    fn dimensions(&self) -> (u32, u32);

    /// Expected number of output frames. An estimate; 0 when unknown.
    fn frame_count(&self) -> u64;

    /// Next RGBA frame, or `None` at end of stream.
    fn read_frame(&mut self) -> Result<Option<Vec<u8>>, ExportError>;
}

/// Consumes RGBA frames and writes the animated image.
pub trait GifFrameSink: Send {
    fn write_frame(&mut self, rgba: &[u8]) -> Result<(), ExportError>;

    /// Flush and close the destination. Not called on cancellation; the
    /// incomplete destination file is the caller's to discard.
    fn finish(&mut self) -> Result<(), ExportError>;
}

/// One transcode run. Checks the cancel flag between frame-decode steps, so
/// cancellation latency is bounded by a single frame's processing time.
pub struct GifExportJob {
    cancel: CancelFlag,
}

impl GifExportJob {
    pub fn new(cancel: CancelFlag) -> Self {
        Self { cancel }
    }

    pub fn run<D, S, F>(
        &self,
        mut decoder: D,
        mut sink: S,
        on_progress: F,
    ) -> Result<(), ExportError>
    where
        D: FrameDecoder,
        S: GifFrameSink,
        F: Fn(f64),
    {
        let total_frames = decoder.frame_count();
        let mut frames_done = 0u64;
        let mut last_reported = 0.0f64;
        on_progress(0.0);

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!(frames_done, "GIF export cancelled");
                return Err(ExportError::Cancelled);
            }

            let Some(frame) = decoder.read_frame()? else {
                break;
            };

            // Re-check after the decode step: a cancellation racing the
            // decode must win before any further work or progress report.
            if self.cancel.is_cancelled() {
                tracing::info!(frames_done, "GIF export cancelled");
                return Err(ExportError::Cancelled);
            }

            sink.write_frame(&frame)?;
            frames_done += 1;

            if total_frames > 0 {
                // The frame count is an estimate when downsampling, so cap
                // below 1.0 until the sink has actually finished.
                let fraction = (frames_done as f64 / total_frames as f64).min(0.99);
                if fraction > last_reported {
                    last_reported = fraction;
                    on_progress(fraction);
                }
            }
        }

        if self.cancel.is_cancelled() {
            tracing::info!(frames_done, "GIF export cancelled");
            return Err(ExportError::Cancelled);
        }

        sink.finish()?;
        on_progress(1.0);
        tracing::info!(frames = frames_done, "GIF export complete");
        Ok(())
    }
}

/// Transcodes a video file into a GIF file. The production implementation
/// shells out to ffmpeg; tests substitute their own.
pub trait GifTranscoder: Send + Sync {
    fn export(
        &self,
        source: &Path,
        destination: &Path,
        options: &GifExportOptions,
        cancel: &CancelFlag,
        on_progress: &(dyn Fn(f64) + Send + Sync),
    ) -> Result<(), ExportError>;
}

/// ffmpeg-backed transcoder: decodes RGBA frames from the source over a pipe
/// and feeds a single-pass palette GIF encoder.
pub struct FfmpegGifTranscoder;

impl GifTranscoder for FfmpegGifTranscoder {
    fn export(
        &self,
        source: &Path,
        destination: &Path,
        options: &GifExportOptions,
        cancel: &CancelFlag,
        on_progress: &(dyn Fn(f64) + Send + Sync),
    ) -> Result<(), ExportError> {
        let decoder = FfmpegFrameDecoder::open(source, options)?;
        let (width, height) = decoder.dimensions();
        let encoder = FfmpegGifEncoder::create(destination, width, height, options)?;
        GifExportJob::new(cancel.clone()).run(decoder, encoder, on_progress)
    }
}
