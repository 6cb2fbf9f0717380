//! Buffer-relay backend
//!
//! Used when the platform capture service only delivers raw sample buffers;
//! the backend drives a muxing writer itself. Buffers arrive on a dedicated
//! per-engine channel and are drained by a background task, so delivery is
//! internally thread-safe without sharing queues across sessions.

use crate::capture::backend::{BackendError, CaptureBackend, CaptureMetadata, SampleBuffer};
use crate::capture::config::RecordingConfig;
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Per-engine delivery channel depth. The writer drops samples under
/// back-pressure anyway, so a modest buffer is enough.
const DELIVERY_QUEUE_DEPTH: usize = 64;

/// Platform service that streams raw sample buffers into a channel.
#[async_trait]
pub trait SampleSource: Send {
    /// Begin delivery. The service pushes buffers into `sink` from its own
    /// background delivery queue until `end` or `abort` is called, then
    /// drops the sender.
    async fn begin(
        &mut self,
        config: &RecordingConfig,
        sink: mpsc::Sender<SampleBuffer>,
    ) -> Result<(), BackendError>;

    /// Stop producing. Buffers already handed to the sink stay in flight.
    async fn end(&mut self) -> Result<(), BackendError>;

    /// Abort delivery. Best-effort.
    async fn abort(&mut self);
}

/// Muxing/encoding writer that appends delivered samples to the destination.
pub trait MediaWriter: Send {
    fn open(&mut self, config: &RecordingConfig, destination: &Path) -> Result<(), BackendError>;

    /// Whether the writer can accept another sample right now.
    fn ready_for_more(&self) -> bool;

    /// Called once, with the timestamp of the first delivered buffer; it
    /// establishes the encoding session's start time.
    fn begin_session(&mut self, start: std::time::Duration) -> Result<(), BackendError>;

    fn append(&mut self, buffer: &SampleBuffer) -> Result<(), BackendError>;

    /// Flush and finalize the destination file.
    fn finish(&mut self) -> Result<CaptureMetadata, BackendError>;

    /// Drop the output without finalizing. Best-effort.
    fn abort(&mut self);
}

/// Backend variant relaying raw buffers from the service into a writer.
pub struct BufferRelayBackend<S: SampleSource, W: MediaWriter + 'static> {
    source: S,
    writer: Option<W>,
    drain: Option<JoinHandle<Result<CaptureMetadata, BackendError>>>,
    aborted: Arc<AtomicBool>,
    started: bool,
}

impl<S: SampleSource, W: MediaWriter + 'static> BufferRelayBackend<S, W> {
    pub fn new(source: S, writer: W) -> Self {
        Self {
            source,
            writer: Some(writer),
            drain: None,
            aborted: Arc::new(AtomicBool::new(false)),
            started: false,
        }
    }
}

/// Drain loop run by the background task. Owns the writer; the first buffer
/// opens the encoding session, buffers the writer is not ready for are
/// dropped, and the writer is finalized once the channel closes.
async fn drain_samples<W: MediaWriter>(
    mut writer: W,
    mut rx: mpsc::Receiver<SampleBuffer>,
    aborted: Arc<AtomicBool>,
) -> Result<CaptureMetadata, BackendError> {
    let mut session_open = false;
    let mut appended = 0u64;
    let mut dropped = 0u64;

    while let Some(buffer) = rx.recv().await {
        if aborted.load(Ordering::SeqCst) {
            writer.abort();
            return Err(BackendError::StopFailed("capture aborted".to_string()));
        }

        if !session_open {
            if let Err(e) = writer.begin_session(buffer.timestamp) {
                writer.abort();
                return Err(e);
            }
            session_open = true;
        }

        if !writer.ready_for_more() {
            dropped += 1;
            continue;
        }

        if let Err(e) = writer.append(&buffer) {
            writer.abort();
            return Err(e);
        }
        appended += 1;
    }

    if aborted.load(Ordering::SeqCst) {
        writer.abort();
        return Err(BackendError::StopFailed("capture aborted".to_string()));
    }

    if dropped > 0 {
        tracing::warn!(dropped, appended, "writer back-pressure dropped samples");
    }
    writer.finish()
}

#[async_trait]
impl<S: SampleSource, W: MediaWriter + 'static> CaptureBackend for BufferRelayBackend<S, W> {
    async fn start(
        &mut self,
        config: &RecordingConfig,
        destination: &Path,
    ) -> Result<(), BackendError> {
        if self.started {
            return Err(BackendError::AlreadyStarted);
        }
        let mut writer = self.writer.take().ok_or(BackendError::AlreadyStarted)?;
        writer.open(config, destination)?;

        self.aborted.store(false, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(DELIVERY_QUEUE_DEPTH);

        // The drain task is spawned only once the source is live; until then
        // the bounded channel buffers whatever the source delivers.
        if let Err(e) = self.source.begin(config, tx).await {
            writer.abort();
            return Err(e);
        }

        self.drain = Some(tokio::spawn(drain_samples(
            writer,
            rx,
            self.aborted.clone(),
        )));
        self.started = true;
        tracing::info!(?destination, "buffer-relay capture started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<CaptureMetadata, BackendError> {
        if !self.started {
            return Err(BackendError::NotStarted);
        }
        self.started = false;
        let drain = self.drain.take().ok_or(BackendError::NotStarted)?;

        if let Err(e) = self.source.end().await {
            self.aborted.store(true, Ordering::SeqCst);
            self.source.abort().await;
            let _ = drain.await;
            return Err(e);
        }

        // The source dropped its sender; the drain task consumes whatever is
        // still queued and then finalizes the writer.
        let metadata = match drain.await {
            Ok(result) => result?,
            Err(e) => {
                return Err(BackendError::StopFailed(format!(
                    "drain task panicked: {e}"
                )))
            }
        };

        tracing::info!(
            duration_ms = metadata.duration_ms,
            frames = metadata.video_frames,
            "buffer-relay capture stopped"
        );
        Ok(metadata)
    }

    async fn cancel(&mut self) {
        if !self.started {
            return;
        }
        self.started = false;
        self.aborted.store(true, Ordering::SeqCst);
        self.source.abort().await;
        if let Some(drain) = self.drain.take() {
            let _ = drain.await;
        }
        tracing::info!("buffer-relay capture cancelled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::backend::SampleKind;
    use crate::capture::config::{RecordingMode, RecordingPreferences, RecordingTarget};
    use parking_lot::Mutex;
    use std::time::Duration;

    fn config() -> RecordingConfig {
        let prefs = RecordingPreferences::default();
        RecordingConfig {
            target: RecordingTarget::Fullscreen { display_id: None },
            mode: RecordingMode::Video,
            width: 1280,
            height: 720,
            fps: 30,
            include_cursor: true,
            capture_microphone: false,
            capture_system_audio: false,
            quality: prefs.quality,
        }
    }

    fn sample(index: u64) -> SampleBuffer {
        SampleBuffer {
            kind: SampleKind::Video,
            timestamp: Duration::from_millis(100 + index * 33),
            data: vec![index as u8; 16],
        }
    }

    /// Source that pushes a fixed set of buffers and then hangs up.
    struct FakeSource {
        buffers: Vec<SampleBuffer>,
        fail_begin: bool,
        delivery: Option<JoinHandle<()>>,
    }

    #[async_trait]
    impl SampleSource for FakeSource {
        async fn begin(
            &mut self,
            _config: &RecordingConfig,
            sink: mpsc::Sender<SampleBuffer>,
        ) -> Result<(), BackendError> {
            if self.fail_begin {
                return Err(BackendError::StartFailed("stream refused".to_string()));
            }
            let buffers = self.buffers.clone();
            self.delivery = Some(tokio::spawn(async move {
                for buffer in buffers {
                    if sink.send(buffer).await.is_err() {
                        break;
                    }
                }
                // sender dropped here, closing the channel
            }));
            Ok(())
        }

        async fn end(&mut self) -> Result<(), BackendError> {
            if let Some(delivery) = self.delivery.take() {
                let _ = delivery.await;
            }
            Ok(())
        }

        async fn abort(&mut self) {
            if let Some(delivery) = self.delivery.take() {
                delivery.abort();
            }
        }
    }

    #[derive(Default)]
    struct WriterLog {
        opened: bool,
        session_start: Option<Duration>,
        appended: Vec<Duration>,
        finished: bool,
        aborted: bool,
    }

    /// Writer that refuses the first `refusals_left` samples it is offered.
    struct FakeWriter {
        log: Arc<Mutex<WriterLog>>,
        refusals_left: std::sync::atomic::AtomicU32,
    }

    impl FakeWriter {
        fn new(refuse_first: u32) -> (Self, Arc<Mutex<WriterLog>>) {
            let log = Arc::new(Mutex::new(WriterLog::default()));
            (
                Self {
                    log: log.clone(),
                    refusals_left: std::sync::atomic::AtomicU32::new(refuse_first),
                },
                log,
            )
        }
    }

    impl MediaWriter for FakeWriter {
        fn open(
            &mut self,
            _config: &RecordingConfig,
            _destination: &Path,
        ) -> Result<(), BackendError> {
            self.log.lock().opened = true;
            Ok(())
        }

        fn ready_for_more(&self) -> bool {
            if self.refusals_left.load(Ordering::SeqCst) > 0 {
                self.refusals_left.fetch_sub(1, Ordering::SeqCst);
                false
            } else {
                true
            }
        }

        fn begin_session(&mut self, start: Duration) -> Result<(), BackendError> {
            self.log.lock().session_start = Some(start);
            Ok(())
        }

        fn append(&mut self, buffer: &SampleBuffer) -> Result<(), BackendError> {
            self.log.lock().appended.push(buffer.timestamp);
            Ok(())
        }

        fn finish(&mut self) -> Result<CaptureMetadata, BackendError> {
            let mut log = self.log.lock();
            log.finished = true;
            Ok(CaptureMetadata {
                duration_ms: log.appended.len() as f64 * 33.0,
                video_frames: log.appended.len() as u64,
                has_audio_track: false,
            })
        }

        fn abort(&mut self) {
            self.log.lock().aborted = true;
        }
    }

    #[tokio::test]
    async fn stop_flushes_all_delivered_buffers() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource {
            buffers: (0..20).map(sample).collect(),
            fail_begin: false,
            delivery: None,
        };
        let (writer, log) = FakeWriter::new(0);
        let mut backend = BufferRelayBackend::new(source, writer);

        backend
            .start(&config(), &dir.path().join("out.mp4"))
            .await
            .unwrap();
        let metadata = backend.stop().await.unwrap();

        let log = log.lock();
        assert!(log.opened);
        assert_eq!(log.appended.len(), 20);
        assert_eq!(metadata.video_frames, 20);
        assert!(log.finished);
        // First buffer established the session start time
        assert_eq!(log.session_start, Some(Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn drops_buffers_while_writer_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource {
            buffers: (0..10).map(sample).collect(),
            fail_begin: false,
            delivery: None,
        };
        let (writer, log) = FakeWriter::new(3);
        let mut backend = BufferRelayBackend::new(source, writer);

        backend
            .start(&config(), &dir.path().join("out.mp4"))
            .await
            .unwrap();
        backend.stop().await.unwrap();

        let log = log.lock();
        // First three samples were refused and dropped, the rest landed
        assert_eq!(log.appended.len(), 7);
        assert!(log.finished);
        assert!(log.session_start.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_source_start_aborts_writer() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource {
            buffers: vec![],
            fail_begin: true,
            delivery: None,
        };
        let (writer, log) = FakeWriter::new(0);
        let mut backend = BufferRelayBackend::new(source, writer);

        let err = backend
            .start(&config(), &dir.path().join("out.mp4"))
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::StartFailed(_)));
        let log = log.lock();
        assert!(log.aborted);
        assert!(!log.finished);
    }

    #[tokio::test]
    async fn cancel_never_finalizes() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource {
            buffers: (0..5).map(sample).collect(),
            fail_begin: false,
            delivery: None,
        };
        let (writer, log) = FakeWriter::new(0);
        let mut backend = BufferRelayBackend::new(source, writer);

        backend
            .start(&config(), &dir.path().join("out.mp4"))
            .await
            .unwrap();
        backend.cancel().await;

        let log = log.lock();
        assert!(log.aborted);
        assert!(!log.finished);
    }
}
