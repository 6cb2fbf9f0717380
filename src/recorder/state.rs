//! Recording session state machine
//!
//! `RecordingSessionModel` is the single source of truth observed by the UI.
//! Every transition is validated against a fixed table; an invalid move is
//! an error, never a silent coercion. Observers subscribe to a broadcast of
//! committed snapshots and see them in commit order.

use crate::capture::config::RecordingMode;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::broadcast;

/// Capacity of the snapshot broadcast ring. Slow observers may lag and miss
/// intermediate snapshots, never see them out of order.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Current state of a recording session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Selecting { mode: RecordingMode },
    Starting { mode: RecordingMode },
    Recording { mode: RecordingMode },
    Stopping { mode: RecordingMode },
    ExportingGif,
    Completed,
    Failed { message: String },
    Cancelled,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Idle
    }
}

impl SessionState {
    /// Short name used in transition diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Selecting { .. } => "selecting",
            SessionState::Starting { .. } => "starting",
            SessionState::Recording { .. } => "recording",
            SessionState::Stopping { .. } => "stopping",
            SessionState::ExportingGif => "exportingGif",
            SessionState::Completed => "completed",
            SessionState::Failed { .. } => "failed",
            SessionState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed { .. } | SessionState::Cancelled
        )
    }

    /// The fixed transition table.
    fn allows(&self, next: &SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Idle, Selecting { .. }) => true,
            (Selecting { mode: a }, Starting { mode: b }) => a == b,
            (Selecting { .. }, Cancelled) => true,
            (Starting { mode: a }, Recording { mode: b }) => a == b,
            (Starting { .. }, Failed { .. }) => true,
            (Recording { mode: a }, Stopping { mode: b }) => a == b,
            (Stopping { mode: RecordingMode::Video }, Completed) => true,
            (Stopping { mode: RecordingMode::Gif }, ExportingGif) => true,
            (Stopping { .. }, Failed { .. }) => true,
            (ExportingGif, Completed | Failed { .. } | Cancelled) => true,
            (Completed | Failed { .. } | Cancelled, Idle) => true,
            _ => false,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The orchestration logic attempted a move not in the table. This is a
    /// core-logic defect, not a user-triggerable condition.
    #[error("invalid session transition: {from} -> {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

/// Snapshot of the model published on every committed transition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: SessionState,

    /// Wall-clock time since recording began, in milliseconds
    pub elapsed_ms: f64,

    /// GIF export progress (0.0 to 1.0); meaningful only while exporting
    pub gif_export_progress: f64,
}

struct ModelInner {
    state: SessionState,
    recording_started: Option<Instant>,
    gif_progress: f64,
}

impl ModelInner {
    fn elapsed(&self) -> Duration {
        self.recording_started
            .map(|t| t.elapsed())
            .unwrap_or_default()
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state.clone(),
            elapsed_ms: self.elapsed().as_secs_f64() * 1000.0,
            gif_export_progress: self.gif_progress,
        }
    }
}

/// The authoritative session state. One instance lives for the whole
/// process, owned by the composition root and reused across sequential
/// sessions; only the orchestrator mutates it.
pub struct RecordingSessionModel {
    inner: Mutex<ModelInner>,
    events: broadcast::Sender<SessionSnapshot>,
}

impl RecordingSessionModel {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(ModelInner {
                state: SessionState::Idle,
                recording_started: None,
                gif_progress: 0.0,
            }),
            events,
        }
    }

    /// Subscribe to committed snapshots, delivered in commit order.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionSnapshot> {
        self.events.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state.clone()
    }

    /// Wall-clock duration since recording began; zero outside a recording.
    /// Recomputed from the start instant on every read, so observer polling
    /// cadence never skews it.
    pub fn elapsed(&self) -> Duration {
        self.inner.lock().elapsed()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.lock().snapshot()
    }

    fn transition(&self, next: SessionState) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        if !inner.state.allows(&next) {
            let err = SessionError::InvalidTransition {
                from: inner.state.label(),
                to: next.label(),
            };
            tracing::warn!(%err, "rejected session transition");
            return Err(err);
        }

        match &next {
            SessionState::Recording { .. } => inner.recording_started = Some(Instant::now()),
            SessionState::ExportingGif => inner.gif_progress = 0.0,
            SessionState::Idle => {
                inner.recording_started = None;
                inner.gif_progress = 0.0;
            }
            _ => {}
        }

        tracing::debug!(from = inner.state.label(), to = next.label(), "session transition");
        inner.state = next;
        let snapshot = inner.snapshot();
        drop(inner);
        let _ = self.events.send(snapshot);
        Ok(())
    }

    pub fn begin_selection(&self, mode: RecordingMode) -> Result<(), SessionError> {
        self.transition(SessionState::Selecting { mode })
    }

    pub fn begin_starting(&self, mode: RecordingMode) -> Result<(), SessionError> {
        self.transition(SessionState::Starting { mode })
    }

    pub fn begin_recording(&self, mode: RecordingMode) -> Result<(), SessionError> {
        self.transition(SessionState::Recording { mode })
    }

    pub fn begin_stopping(&self, mode: RecordingMode) -> Result<(), SessionError> {
        self.transition(SessionState::Stopping { mode })
    }

    pub fn begin_gif_export(&self) -> Result<(), SessionError> {
        self.transition(SessionState::ExportingGif)
    }

    pub fn mark_completed(&self) -> Result<(), SessionError> {
        self.transition(SessionState::Completed)
    }

    pub fn mark_failed(&self, message: impl Into<String>) -> Result<(), SessionError> {
        self.transition(SessionState::Failed {
            message: message.into(),
        })
    }

    pub fn mark_cancelled(&self) -> Result<(), SessionError> {
        self.transition(SessionState::Cancelled)
    }

    pub fn mark_idle(&self) -> Result<(), SessionError> {
        self.transition(SessionState::Idle)
    }

    /// Unconditional reset to `Idle`. The sole escape hatch, used only when
    /// the orchestrator knows no backend resources remain live.
    pub fn force_idle(&self) {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Idle {
            tracing::warn!(from = inner.state.label(), "forcing session to idle");
        }
        inner.state = SessionState::Idle;
        inner.recording_started = None;
        inner.gif_progress = 0.0;
        let snapshot = inner.snapshot();
        drop(inner);
        let _ = self.events.send(snapshot);
    }

    /// Record export progress. A no-op outside `ExportingGif` (progress
    /// callbacks may race slightly behind a cancellation) and never moves
    /// backwards.
    pub fn update_gif_export_progress(&self, fraction: f64) {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::ExportingGif {
            return;
        }
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction <= inner.gif_progress {
            return;
        }
        inner.gif_progress = fraction;
        let snapshot = inner.snapshot();
        drop(inner);
        let _ = self.events.send(snapshot);
    }
}

impl Default for RecordingSessionModel {
    fn default() -> Self {
        Self::new()
    }
}
