//! FFmpeg decoder and GIF encoder wrappers
//!
//! The export job pipes raw RGBA frames out of one ffmpeg process and into
//! another rather than linking a codec library; the processes are killed on
//! drop so a cancelled job never leaks children.

use crate::export::gif::{FrameDecoder, GifFrameSink};
use crate::export::types::{ExportError, GifExportOptions};
use std::io::{BufReader, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

/// Decoder reading RGBA frames from a video file, downsampled to the export
/// frame rate and scaled to the quality tier's width.
pub struct FfmpegFrameDecoder {
    process: Child,
    stdout: BufReader<ChildStdout>,
    width: u32,
    height: u32,
    frame_size: usize,
    estimated_frames: u64,
}

impl FfmpegFrameDecoder {
    pub fn open(video_path: &Path, options: &GifExportOptions) -> Result<Self, ExportError> {
        let (src_width, src_height, src_frames, src_fps) = probe_video(video_path)?;
        let (width, height) =
            scaled_dimensions(src_width, src_height, options.quality.max_width());
        let estimated = estimated_frames(src_frames, src_fps, options.frame_rate);

        tracing::info!(
            source = %video_path.display(),
            width,
            height,
            fps = options.frame_rate,
            estimated_frames = estimated,
            "opening GIF export decoder"
        );

        let path_str = video_path.to_string_lossy();
        let mut process = Command::new("ffmpeg")
            .args([
                "-i",
                path_str.as_ref(),
                "-vf",
                &format!("fps={},scale={}:{}", options.frame_rate, width, height),
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgba",
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ExportError::Ffmpeg(format!("failed to start decoder: {e}")))?;

        let frame_size = (width * height * 4) as usize;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| ExportError::Ffmpeg("failed to capture decoder stdout".to_string()))?;

        Ok(Self {
            process,
            stdout: BufReader::with_capacity(frame_size * 2, stdout),
            width,
            height,
            frame_size,
            estimated_frames: estimated,
        })
    }
}

impl FrameDecoder for FfmpegFrameDecoder {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn frame_count(&self) -> u64 {
        self.estimated_frames
    }

    fn read_frame(&mut self) -> Result<Option<Vec<u8>>, ExportError> {
        let mut buffer = vec![0u8; self.frame_size];
        match self.stdout.read_exact(&mut buffer) {
            Ok(()) => Ok(Some(buffer)),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(ExportError::Decoding(format!("failed to read frame: {e}"))),
        }
    }
}

impl Drop for FfmpegFrameDecoder {
    fn drop(&mut self) {
        let _ = self.process.kill();
    }
}

/// Single-pass palette GIF encoder fed raw RGBA frames over stdin.
pub struct FfmpegGifEncoder {
    process: Child,
    stdin: Option<ChildStdin>,
}

impl FfmpegGifEncoder {
    pub fn create(
        destination: &Path,
        width: u32,
        height: u32,
        options: &GifExportOptions,
    ) -> Result<Self, ExportError> {
        let dest_str = destination.to_string_lossy();
        let mut process = Command::new("ffmpeg")
            .args([
                "-y",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgba",
                "-s",
                &format!("{width}x{height}"),
                "-r",
                &options.frame_rate.to_string(),
                "-i",
                "-",
                "-vf",
                &palette_filter(options.quality.max_colors()),
                // The destination is a temp path without a .gif extension,
                // so the muxer must be selected explicitly.
                "-f",
                "gif",
                dest_str.as_ref(),
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ExportError::Ffmpeg(format!("failed to start encoder: {e}")))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| ExportError::Ffmpeg("failed to capture encoder stdin".to_string()))?;

        Ok(Self {
            process,
            stdin: Some(stdin),
        })
    }
}

impl GifFrameSink for FfmpegGifEncoder {
    fn write_frame(&mut self, rgba: &[u8]) -> Result<(), ExportError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ExportError::Encoding("encoder already finished".to_string()))?;
        stdin
            .write_all(rgba)
            .map_err(|e| ExportError::Encoding(format!("failed to write frame: {e}")))?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ExportError> {
        // Closing stdin signals end of stream; the muxer then writes the
        // GIF trailer.
        drop(self.stdin.take());
        let status = self
            .process
            .wait()
            .map_err(|e| ExportError::Encoding(format!("failed to wait for encoder: {e}")))?;
        if !status.success() {
            return Err(ExportError::Encoding(format!(
                "encoder exited with {status}"
            )));
        }
        Ok(())
    }
}

impl Drop for FfmpegGifEncoder {
    fn drop(&mut self) {
        let _ = self.process.kill();
    }
}

/// Probe a video file with ffprobe: (width, height, frame count, fps).
fn probe_video(video_path: &Path) -> Result<(u32, u32, u64, f64), ExportError> {
    let path_str = video_path.to_string_lossy();
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-count_packets",
            "-show_entries",
            "stream=width,height,r_frame_rate,nb_read_packets",
            "-of",
            "csv=p=0",
            path_str.as_ref(),
        ])
        .output()
        .map_err(|e| ExportError::Ffmpeg(format!("failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ExportError::Ffmpeg(format!("ffprobe failed: {stderr}")));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_probe_csv(stdout.trim())
}

/// Parse ffprobe's `width,height,r_frame_rate,nb_read_packets` CSV line.
fn parse_probe_csv(line: &str) -> Result<(u32, u32, u64, f64), ExportError> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() < 4 {
        return Err(ExportError::Ffmpeg(format!(
            "unexpected ffprobe output: {line}"
        )));
    }

    let width: u32 = parts[0]
        .parse()
        .map_err(|_| ExportError::Ffmpeg("invalid width".to_string()))?;
    let height: u32 = parts[1]
        .parse()
        .map_err(|_| ExportError::Ffmpeg("invalid height".to_string()))?;

    let fps = match parts[2].split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().unwrap_or(30.0);
            let den: f64 = den.parse().unwrap_or(1.0);
            if den > 0.0 {
                num / den
            } else {
                30.0
            }
        }
        None => parts[2].parse().unwrap_or(30.0),
    };

    let total_frames: u64 = parts[3].parse().unwrap_or(0);

    Ok((width, height, total_frames, fps))
}

/// Scale down to `max_width` preserving aspect ratio, rounded to even.
fn scaled_dimensions(src_width: u32, src_height: u32, max_width: u32) -> (u32, u32) {
    let (w, h) = if src_width > max_width {
        let scaled = (src_height as f64 * max_width as f64 / src_width as f64) as u32;
        (max_width, scaled)
    } else {
        (src_width, src_height)
    };
    (w & !1, h & !1)
}

/// Expected output frame count after fps downsampling. 0 when unknown.
fn estimated_frames(src_frames: u64, src_fps: f64, out_fps: u32) -> u64 {
    if src_frames == 0 || src_fps <= 0.0 {
        return 0;
    }
    ((src_frames as f64 * out_fps as f64 / src_fps).ceil()) as u64
}

/// Single-pass per-frame palette: palettegen and paletteuse in one graph.
fn palette_filter(max_colors: u32) -> String {
    format!(
        "split[s0][s1];[s0]palettegen=stats_mode=single:max_colors={max_colors}[p];[s1][p]paletteuse=new=1"
    )
}
