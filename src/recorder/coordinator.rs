//! Recording orchestration
//!
//! `RecordingOrchestrator` drives a session end to end: selection, backend
//! start, stop-and-finalize, GIF export, cancellation, and shutdown. It owns
//! the active backend and the pending output file; collaborators (content
//! enumeration, permissions, history, UI, transcoding) are injected behind
//! traits so the whole flow is testable without a screen or an encoder.

use crate::capture::backend::{BackendFactory, CaptureBackend};
use crate::capture::config::{
    ContentProvider, PermissionStatus, RecordingConfig, RecordingMode, RecordingPreferences,
    RecordingTarget,
};
use crate::capture::probe::{validate_video, VideoProbe};
use crate::error::CaptureError;
use crate::export::types::{CancelFlag, GifExportOptions, GifQuality};
use crate::export::{ExportError, GifTranscoder};
use crate::output::atomic::{self, PendingOutput};
use crate::recorder::state::{RecordingSessionModel, SessionError, SessionState};
use crate::storage::{capture_filename, CaptureKind, CaptureRecord, HistoryStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Screen-recording permission boundary, implemented by the platform layer.
pub trait PermissionGate: Send + Sync {
    fn screen_recording_status(&self) -> PermissionStatus;

    /// Prompt the user, or open system settings when the prompt cannot be
    /// shown again. Fire and forget.
    fn request_screen_recording(&self);
}

/// UI hooks the orchestrator raises. Implementations must be cheap and must
/// not call back into the orchestrator.
pub trait RecorderUi: Send + Sync {
    fn show_recording_controls(&self);
    fn hide_recording_controls(&self);

    /// Tell the user an operation failed. When footage survived the failure
    /// its path is passed so the UI can offer it.
    fn alert_failure(&self, operation: &str, message: &str, preserved_source: Option<&Path>);
}

struct ActiveSession {
    backend: Box<dyn CaptureBackend>,
    config: RecordingConfig,
    pending: PendingOutput,
}

/// Drives recording sessions against the shared session model. One instance
/// per process; callers serialize access through `&mut self`.
pub struct RecordingOrchestrator {
    model: Arc<RecordingSessionModel>,
    factory: Box<dyn BackendFactory>,
    provider: Arc<dyn ContentProvider>,
    probe: Arc<dyn VideoProbe>,
    history: Arc<dyn HistoryStore>,
    permissions: Arc<dyn PermissionGate>,
    ui: Arc<dyn RecorderUi>,
    transcoder: Arc<dyn GifTranscoder>,
    preferences: RecordingPreferences,
    output_dir: PathBuf,
    active: Option<ActiveSession>,
    export_cancel: CancelFlag,
}

impl RecordingOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model: Arc<RecordingSessionModel>,
        factory: Box<dyn BackendFactory>,
        provider: Arc<dyn ContentProvider>,
        probe: Arc<dyn VideoProbe>,
        history: Arc<dyn HistoryStore>,
        permissions: Arc<dyn PermissionGate>,
        ui: Arc<dyn RecorderUi>,
        transcoder: Arc<dyn GifTranscoder>,
        preferences: RecordingPreferences,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            model,
            factory,
            provider,
            probe,
            history,
            permissions,
            ui,
            transcoder,
            preferences,
            output_dir,
            active: None,
            export_cancel: CancelFlag::new(),
        }
    }

    pub fn model(&self) -> Arc<RecordingSessionModel> {
        Arc::clone(&self.model)
    }

    /// Flag that cancels an in-flight GIF export. Clone it before awaiting
    /// `stop`; the export honours it at frame granularity.
    pub fn export_cancel_flag(&self) -> CancelFlag {
        self.export_cancel.clone()
    }

    pub fn set_preferences(&mut self, preferences: RecordingPreferences) {
        self.preferences = preferences;
    }

    /// Enter target selection for a new session.
    pub fn begin_selection(&mut self, mode: RecordingMode) -> Result<(), CaptureError> {
        // A stale non-idle state with no active session means an earlier
        // flow died between transitions; reset rather than wedge.
        if self.model.state() != SessionState::Idle && self.active.is_none() {
            self.model.force_idle();
        }
        self.model.begin_selection(mode)?;
        Ok(())
    }

    /// The user dismissed the selection UI without picking a target.
    pub fn cancel_selection(&mut self) -> Result<(), CaptureError> {
        self.model.mark_cancelled()?;
        self.model.mark_idle()?;
        Ok(())
    }

    /// The user picked a target; resolve the configuration and start
    /// capturing.
    pub async fn target_chosen(&mut self, target: RecordingTarget) -> Result<(), CaptureError> {
        let mode = match self.model.state() {
            SessionState::Selecting { mode } => mode,
            other => {
                tracing::warn!(state = other.label(), "target chosen outside selection");
                return Err(SessionError::InvalidTransition {
                    from: other.label(),
                    to: "starting",
                }
                .into());
            }
        };

        self.model.begin_starting(mode)?;

        if self.permissions.screen_recording_status() != PermissionStatus::Authorized {
            self.permissions.request_screen_recording();
            return self.fail("start recording", CaptureError::PermissionDenied);
        }

        let config =
            match RecordingConfig::resolve(target, mode, &self.preferences, &*self.provider).await {
                Ok(config) => config,
                Err(e) => return self.fail("start recording", e.into()),
            };

        // The capture always targets a video container; GIF conversion
        // happens at stop time.
        let filename = capture_filename(CaptureKind::Recording, RecordingMode::Video.extension());
        let pending = match atomic::prepare(&self.output_dir.join(filename)) {
            Ok(pending) => pending,
            Err(e) => return self.fail("start recording", e.into()),
        };

        let mut backend = self.factory.create(&config);
        if let Err(e) = backend.start(&config, pending.temp_path()).await {
            atomic::discard(&pending);
            if e.is_permission() {
                self.permissions.request_screen_recording();
                return self.fail("start recording", CaptureError::PermissionDenied);
            }
            return self.fail("start recording", CaptureError::BackendStartFailed(e));
        }

        self.model.begin_recording(mode)?;
        self.ui.show_recording_controls();
        tracing::info!(
            ?mode,
            width = config.width,
            height = config.height,
            fps = config.fps,
            "recording started"
        );

        self.active = Some(ActiveSession {
            backend,
            config,
            pending,
        });
        Ok(())
    }

    /// Stop the active recording, finalize the output, and for GIF sessions
    /// run the export. Returns the history record of the finished capture,
    /// or `None` when there was nothing to stop or the export was cancelled.
    pub async fn stop(&mut self) -> Result<Option<CaptureRecord>, CaptureError> {
        let Some(mut session) = self.active.take() else {
            tracing::warn!("stop requested with no active session");
            return Ok(None);
        };
        let mode = session.config.mode;

        self.model.begin_stopping(mode)?;
        self.ui.hide_recording_controls();

        let metadata = match session.backend.stop().await {
            Ok(metadata) => metadata,
            Err(e) => {
                atomic::discard(&session.pending);
                return self
                    .fail("stop recording", CaptureError::BackendStopFailed(e))
                    .map(|_| None);
            }
        };
        tracing::info!(
            duration_ms = metadata.duration_ms,
            frames = metadata.video_frames,
            "capture stopped"
        );

        let video_path = match atomic::finalize(&session.pending) {
            Ok(path) => path,
            Err(e) => {
                atomic::discard(&session.pending);
                return self.fail("stop recording", e.into()).map(|_| None);
            }
        };

        if let Err(e) = validate_video(&*self.probe, &video_path) {
            // A file that failed validation must not sit at the final path
            // where history tooling could pick it up.
            remove_artifact(&video_path);
            return self
                .fail("stop recording", CaptureError::OutputInvalid(e))
                .map(|_| None);
        }

        match mode {
            RecordingMode::Video => {
                let record = self.history.save(&video_path, CaptureKind::Recording);
                self.model.mark_completed()?;
                self.model.mark_idle()?;
                Ok(Some(record))
            }
            RecordingMode::Gif => self.export_gif(&session.config, video_path).await,
        }
    }

    async fn export_gif(
        &mut self,
        config: &RecordingConfig,
        source_video: PathBuf,
    ) -> Result<Option<CaptureRecord>, CaptureError> {
        self.model.begin_gif_export()?;
        self.export_cancel.reset();

        let filename = capture_filename(CaptureKind::Gif, RecordingMode::Gif.extension());
        let pending = match atomic::prepare(&self.output_dir.join(filename)) {
            Ok(pending) => pending,
            Err(e) => return self.fail("export GIF", e.into()).map(|_| None),
        };

        let options = GifExportOptions {
            frame_rate: config.fps,
            quality: gif_quality_for(config),
        };
        let transcoder = Arc::clone(&self.transcoder);
        let model = Arc::clone(&self.model);
        let cancel = self.export_cancel.clone();
        let source = source_video.clone();
        let destination = pending.temp_path().to_path_buf();

        let result = tokio::task::spawn_blocking(move || {
            transcoder.export(&source, &destination, &options, &cancel, &move |fraction| {
                model.update_gif_export_progress(fraction);
            })
        })
        .await
        .unwrap_or_else(|e| Err(ExportError::Encoding(format!("export task panicked: {e}"))));

        match result {
            Ok(()) => {
                let gif_path = match atomic::finalize(&pending) {
                    Ok(path) => path,
                    Err(e) => {
                        atomic::discard(&pending);
                        return self.fail("export GIF", e.into()).map(|_| None);
                    }
                };
                remove_artifact(&source_video);
                let record = self.history.save(&gif_path, CaptureKind::Gif);
                self.model.mark_completed()?;
                self.model.mark_idle()?;
                Ok(Some(record))
            }
            Err(ExportError::Cancelled) => {
                // Only the partial GIF is thrown away; the finalized source
                // video stays on disk, same as on failure.
                atomic::discard(&pending);
                self.model.mark_cancelled()?;
                self.model.mark_idle()?;
                Ok(None)
            }
            Err(e) => {
                atomic::discard(&pending);
                self.fail(
                    "export GIF",
                    CaptureError::ExportFailed {
                        message: e.to_string(),
                        source_video,
                    },
                )
                .map(|_| None)
            }
        }
    }

    /// Abort the active recording and throw away its partial output.
    pub async fn cancel(&mut self) {
        if let Some(mut session) = self.active.take() {
            session.backend.cancel().await;
            atomic::discard(&session.pending);
            tracing::info!("recording cancelled");
        }
        self.ui.hide_recording_controls();
        // No backend resources remain live at this point.
        self.model.force_idle();
    }

    /// Process teardown: cancel whatever is in flight and reset. Safe to call
    /// in any state.
    pub async fn shutdown(&mut self) {
        self.export_cancel.cancel();
        if let Some(mut session) = self.active.take() {
            session.backend.cancel().await;
            atomic::discard(&session.pending);
        }
        self.ui.hide_recording_controls();
        self.model.force_idle();
    }

    /// Route a failure through the model and the UI, then return it.
    fn fail(&mut self, operation: &str, error: CaptureError) -> Result<(), CaptureError> {
        tracing::error!(operation, %error, "recording operation failed");
        self.ui.alert_failure(
            operation,
            &error.to_string(),
            error.preserved_path().map(|p| p.as_path()),
        );
        if self.model.mark_failed(error.to_string()).is_err() {
            self.model.force_idle();
        }
        let _ = self.model.mark_idle();
        Err(error)
    }
}

/// Map the capture quality preset onto a GIF palette/width tier.
fn gif_quality_for(config: &RecordingConfig) -> GifQuality {
    use crate::capture::config::QualityPreset;
    match config.quality {
        QualityPreset::Low => GifQuality::Low,
        QualityPreset::Medium => GifQuality::Medium,
        QualityPreset::High => GifQuality::High,
    }
}

/// Remove a file the user should no longer see (a consumed GIF intermediate,
/// or an artifact that failed validation). Removal failures only get logged.
fn remove_artifact(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::backend::{BackendError, CaptureMetadata};
    use crate::capture::config::{ConfigError, DisplayInfo, WindowInfo};
    use crate::capture::probe::{ProbeError, VideoMetadata};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeProvider;

    #[async_trait]
    impl ContentProvider for FakeProvider {
        async fn displays(&self) -> Result<Vec<DisplayInfo>, ConfigError> {
            Ok(vec![DisplayInfo {
                id: 1,
                width: 1920,
                height: 1080,
                scale_factor: 1.0,
                is_primary: true,
            }])
        }

        async fn windows(&self) -> Result<Vec<WindowInfo>, ConfigError> {
            Ok(vec![])
        }
    }

    #[derive(Default)]
    struct FakeBackendState {
        started_to: Mutex<Option<PathBuf>>,
        cancelled: AtomicBool,
        fail_start: AtomicBool,
        fail_start_permission: AtomicBool,
        fail_stop: AtomicBool,
    }

    struct FakeBackend(Arc<FakeBackendState>);

    #[async_trait]
    impl CaptureBackend for FakeBackend {
        async fn start(
            &mut self,
            _config: &RecordingConfig,
            destination: &Path,
        ) -> Result<(), BackendError> {
            if self.0.fail_start_permission.load(Ordering::SeqCst) {
                return Err(BackendError::PermissionDenied("screen capture".into()));
            }
            if self.0.fail_start.load(Ordering::SeqCst) {
                return Err(BackendError::StartFailed("no encoder".into()));
            }
            *self.0.started_to.lock() = Some(destination.to_path_buf());
            Ok(())
        }

        async fn stop(&mut self) -> Result<CaptureMetadata, BackendError> {
            if self.0.fail_stop.load(Ordering::SeqCst) {
                return Err(BackendError::StopFailed("writer died".into()));
            }
            let destination = self
                .0
                .started_to
                .lock()
                .clone()
                .ok_or(BackendError::NotStarted)?;
            std::fs::write(&destination, b"encoded video bytes")?;
            Ok(CaptureMetadata {
                duration_ms: 1200.0,
                video_frames: 36,
                has_audio_track: false,
            })
        }

        async fn cancel(&mut self) {
            self.0.cancelled.store(true, Ordering::SeqCst);
        }
    }

    struct FakeFactory(Arc<FakeBackendState>);

    impl BackendFactory for FakeFactory {
        fn create(&self, _config: &RecordingConfig) -> Box<dyn CaptureBackend> {
            Box::new(FakeBackend(Arc::clone(&self.0)))
        }
    }

    struct FakeProbe {
        invalid: AtomicBool,
    }

    impl VideoProbe for FakeProbe {
        fn probe(&self, _path: &Path) -> Result<VideoMetadata, ProbeError> {
            if self.invalid.load(Ordering::SeqCst) {
                return Err(ProbeError::NoVideoStream);
            }
            Ok(VideoMetadata {
                width: 1920,
                height: 1080,
                fps: 30.0,
                duration_ms: 1200.0,
                codec: "h264".to_string(),
            })
        }

        fn decode_head_frame(&self, _path: &Path) -> Result<(), ProbeError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeHistory {
        saved: Mutex<Vec<(PathBuf, CaptureKind)>>,
    }

    impl HistoryStore for FakeHistory {
        fn save(&self, final_path: &Path, kind: CaptureKind) -> CaptureRecord {
            self.saved.lock().push((final_path.to_path_buf(), kind));
            CaptureRecord::new(kind, final_path)
        }
    }

    #[derive(Default)]
    struct FakePermissions {
        authorized: AtomicBool,
        requests: AtomicUsize,
    }

    impl PermissionGate for FakePermissions {
        fn screen_recording_status(&self) -> PermissionStatus {
            if self.authorized.load(Ordering::SeqCst) {
                PermissionStatus::Authorized
            } else {
                PermissionStatus::Denied
            }
        }

        fn request_screen_recording(&self) {
            self.requests.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct FakeUi {
        controls_visible: AtomicBool,
        alerts: Mutex<Vec<(String, Option<PathBuf>)>>,
    }

    impl RecorderUi for FakeUi {
        fn show_recording_controls(&self) {
            self.controls_visible.store(true, Ordering::SeqCst);
        }

        fn hide_recording_controls(&self) {
            self.controls_visible.store(false, Ordering::SeqCst);
        }

        fn alert_failure(&self, operation: &str, _message: &str, preserved: Option<&Path>) {
            self.alerts
                .lock()
                .push((operation.to_string(), preserved.map(|p| p.to_path_buf())));
        }
    }

    enum TranscodeOutcome {
        Succeed,
        Cancelled,
        Fail,
    }

    struct FakeTranscoder {
        outcome: TranscodeOutcome,
    }

    impl GifTranscoder for FakeTranscoder {
        fn export(
            &self,
            _source: &Path,
            destination: &Path,
            _options: &GifExportOptions,
            cancel: &CancelFlag,
            on_progress: &(dyn Fn(f64) + Send + Sync),
        ) -> Result<(), ExportError> {
            on_progress(0.0);
            match self.outcome {
                TranscodeOutcome::Succeed => {
                    on_progress(0.5);
                    std::fs::write(destination, b"GIF89a")?;
                    on_progress(1.0);
                    Ok(())
                }
                TranscodeOutcome::Cancelled => {
                    cancel.cancel();
                    Err(ExportError::Cancelled)
                }
                TranscodeOutcome::Fail => {
                    Err(ExportError::Encoding("palette generation failed".into()))
                }
            }
        }
    }

    struct Harness {
        orchestrator: RecordingOrchestrator,
        backend: Arc<FakeBackendState>,
        history: Arc<FakeHistory>,
        permissions: Arc<FakePermissions>,
        ui: Arc<FakeUi>,
        probe: Arc<FakeProbe>,
        output_dir: PathBuf,
        _dir: tempfile::TempDir,
    }

    fn harness(outcome: TranscodeOutcome) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let output_dir = dir.path().to_path_buf();
        let backend = Arc::new(FakeBackendState::default());
        let history = Arc::new(FakeHistory::default());
        let permissions = Arc::new(FakePermissions::default());
        permissions.authorized.store(true, Ordering::SeqCst);
        let ui = Arc::new(FakeUi::default());
        let probe = Arc::new(FakeProbe {
            invalid: AtomicBool::new(false),
        });

        let orchestrator = RecordingOrchestrator::new(
            Arc::new(RecordingSessionModel::new()),
            Box::new(FakeFactory(Arc::clone(&backend))),
            Arc::new(FakeProvider),
            Arc::clone(&probe) as Arc<dyn VideoProbe>,
            Arc::clone(&history) as Arc<dyn HistoryStore>,
            Arc::clone(&permissions) as Arc<dyn PermissionGate>,
            Arc::clone(&ui) as Arc<dyn RecorderUi>,
            Arc::new(FakeTranscoder { outcome }),
            RecordingPreferences::default(),
            output_dir.clone(),
        );

        Harness {
            orchestrator,
            backend,
            history,
            permissions,
            ui,
            probe,
            output_dir,
            _dir: dir,
        }
    }

    fn fullscreen() -> RecordingTarget {
        RecordingTarget::Fullscreen { display_id: None }
    }

    #[tokio::test]
    async fn video_session_records_and_saves_history() {
        let mut h = harness(TranscodeOutcome::Succeed);

        h.orchestrator.begin_selection(RecordingMode::Video).unwrap();
        h.orchestrator.target_chosen(fullscreen()).await.unwrap();
        assert!(h.ui.controls_visible.load(Ordering::SeqCst));
        assert_eq!(
            h.orchestrator.model.state(),
            SessionState::Recording {
                mode: RecordingMode::Video
            }
        );

        let record = h.orchestrator.stop().await.unwrap().unwrap();
        assert_eq!(record.kind, CaptureKind::Recording);
        assert!(record.path.exists());
        assert_eq!(record.path.extension().unwrap(), "mp4");

        assert_eq!(h.history.saved.lock().len(), 1);
        assert_eq!(h.orchestrator.model.state(), SessionState::Idle);
        assert!(!h.ui.controls_visible.load(Ordering::SeqCst));

        // No stray partial files remain
        let partials: Vec<_> = std::fs::read_dir(&h.output_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
            .collect();
        assert!(partials.is_empty());
    }

    #[tokio::test]
    async fn gif_session_exports_and_removes_intermediate_video() {
        let mut h = harness(TranscodeOutcome::Succeed);

        h.orchestrator.begin_selection(RecordingMode::Gif).unwrap();
        h.orchestrator.target_chosen(fullscreen()).await.unwrap();

        let record = h.orchestrator.stop().await.unwrap().unwrap();
        assert_eq!(record.kind, CaptureKind::Gif);
        assert!(record.path.exists());
        assert_eq!(record.path.extension().unwrap(), "gif");

        // The intermediate mp4 is gone
        let leftovers: Vec<_> = std::fs::read_dir(&h.output_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".mp4"))
            .collect();
        assert!(leftovers.is_empty());
        assert_eq!(h.orchestrator.model.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn gif_export_progress_reaches_completion() {
        let mut h = harness(TranscodeOutcome::Succeed);
        let mut events = h.orchestrator.model.subscribe();

        h.orchestrator.begin_selection(RecordingMode::Gif).unwrap();
        h.orchestrator.target_chosen(fullscreen()).await.unwrap();
        h.orchestrator.stop().await.unwrap();

        let mut max_progress = 0.0f64;
        while let Ok(snapshot) = events.try_recv() {
            if snapshot.state == SessionState::ExportingGif {
                max_progress = max_progress.max(snapshot.gif_export_progress);
            }
        }
        assert_eq!(max_progress, 1.0);
    }

    #[tokio::test]
    async fn cancelled_export_is_silent_and_leaves_no_gif() {
        let mut h = harness(TranscodeOutcome::Cancelled);

        h.orchestrator.begin_selection(RecordingMode::Gif).unwrap();
        h.orchestrator.target_chosen(fullscreen()).await.unwrap();

        let result = h.orchestrator.stop().await.unwrap();
        assert!(result.is_none());
        assert!(h.ui.alerts.lock().is_empty());
        assert!(h.history.saved.lock().is_empty());
        assert_eq!(h.orchestrator.model.state(), SessionState::Idle);

        // The source recording survives the cancellation; only the partial
        // GIF is gone
        let names: Vec<String> = std::fs::read_dir(&h.output_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1, "expected only the source video: {names:?}");
        assert!(names[0].ends_with(".mp4"));
    }

    #[tokio::test]
    async fn failed_export_preserves_source_video() {
        let mut h = harness(TranscodeOutcome::Fail);

        h.orchestrator.begin_selection(RecordingMode::Gif).unwrap();
        h.orchestrator.target_chosen(fullscreen()).await.unwrap();

        let err = h.orchestrator.stop().await.unwrap_err();
        let preserved = err.preserved_path().cloned().unwrap();
        assert!(preserved.exists(), "source video must survive the failure");

        let alerts = h.ui.alerts.lock();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].1.as_ref(), Some(&preserved));
        assert_eq!(h.orchestrator.model.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn denied_permission_requests_and_fails() {
        let mut h = harness(TranscodeOutcome::Succeed);
        h.permissions.authorized.store(false, Ordering::SeqCst);

        h.orchestrator.begin_selection(RecordingMode::Video).unwrap();
        let err = h.orchestrator.target_chosen(fullscreen()).await.unwrap_err();

        assert!(matches!(err, CaptureError::PermissionDenied));
        assert_eq!(h.permissions.requests.load(Ordering::SeqCst), 1);
        assert_eq!(h.orchestrator.model.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn backend_permission_failure_routes_to_request() {
        let mut h = harness(TranscodeOutcome::Succeed);
        h.backend.fail_start_permission.store(true, Ordering::SeqCst);

        h.orchestrator.begin_selection(RecordingMode::Video).unwrap();
        let err = h.orchestrator.target_chosen(fullscreen()).await.unwrap_err();

        assert!(matches!(err, CaptureError::PermissionDenied));
        assert_eq!(h.permissions.requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn backend_start_failure_discards_output_and_recovers() {
        let mut h = harness(TranscodeOutcome::Succeed);
        h.backend.fail_start.store(true, Ordering::SeqCst);

        h.orchestrator.begin_selection(RecordingMode::Video).unwrap();
        let err = h.orchestrator.target_chosen(fullscreen()).await.unwrap_err();
        assert!(matches!(err, CaptureError::BackendStartFailed(_)));

        assert!(std::fs::read_dir(&h.output_dir).unwrap().next().is_none());

        // The next session starts cleanly
        h.backend.fail_start.store(false, Ordering::SeqCst);
        h.orchestrator.begin_selection(RecordingMode::Video).unwrap();
        h.orchestrator.target_chosen(fullscreen()).await.unwrap();
    }

    #[tokio::test]
    async fn backend_stop_failure_reports_and_resets() {
        let mut h = harness(TranscodeOutcome::Succeed);

        h.orchestrator.begin_selection(RecordingMode::Video).unwrap();
        h.orchestrator.target_chosen(fullscreen()).await.unwrap();

        h.backend.fail_stop.store(true, Ordering::SeqCst);
        let err = h.orchestrator.stop().await.unwrap_err();
        assert!(matches!(err, CaptureError::BackendStopFailed(_)));
        assert_eq!(h.ui.alerts.lock().len(), 1);
        assert_eq!(h.orchestrator.model.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn invalid_output_fails_the_session() {
        let mut h = harness(TranscodeOutcome::Succeed);
        h.probe.invalid.store(true, Ordering::SeqCst);

        h.orchestrator.begin_selection(RecordingMode::Video).unwrap();
        h.orchestrator.target_chosen(fullscreen()).await.unwrap();

        let err = h.orchestrator.stop().await.unwrap_err();
        assert!(matches!(err, CaptureError::OutputInvalid(_)));
        assert!(h.history.saved.lock().is_empty());

        // The known-bad file is removed from the final path
        assert!(std::fs::read_dir(&h.output_dir).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn cancel_discards_partial_recording() {
        let mut h = harness(TranscodeOutcome::Succeed);

        h.orchestrator.begin_selection(RecordingMode::Video).unwrap();
        h.orchestrator.target_chosen(fullscreen()).await.unwrap();

        h.orchestrator.cancel().await;
        assert!(h.backend.cancelled.load(Ordering::SeqCst));
        assert_eq!(h.orchestrator.model.state(), SessionState::Idle);
        assert!(std::fs::read_dir(&h.output_dir).unwrap().next().is_none());

        // Stop after cancel is a no-op
        assert!(h.orchestrator.stop().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cancel_selection_returns_to_idle_silently() {
        let mut h = harness(TranscodeOutcome::Succeed);

        h.orchestrator.begin_selection(RecordingMode::Gif).unwrap();
        h.orchestrator.cancel_selection().unwrap();

        assert_eq!(h.orchestrator.model.state(), SessionState::Idle);
        assert!(h.ui.alerts.lock().is_empty());
    }

    #[tokio::test]
    async fn shutdown_aborts_active_session() {
        let mut h = harness(TranscodeOutcome::Succeed);

        h.orchestrator.begin_selection(RecordingMode::Video).unwrap();
        h.orchestrator.target_chosen(fullscreen()).await.unwrap();

        h.orchestrator.shutdown().await;
        assert!(h.backend.cancelled.load(Ordering::SeqCst));
        assert!(h.orchestrator.export_cancel_flag().is_cancelled());
        assert_eq!(h.orchestrator.model.state(), SessionState::Idle);
    }
}
