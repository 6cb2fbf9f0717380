//! GIF export module
//!
//! Asynchronous, cancellable transcode of a finished recording into an
//! animated GIF, with fractional progress reporting.

pub mod ffmpeg;
pub mod gif;
pub mod types;

pub use gif::{FfmpegGifTranscoder, GifExportJob, GifTranscoder};
pub use types::{CancelFlag, ExportError, GifExportOptions, GifQuality};
