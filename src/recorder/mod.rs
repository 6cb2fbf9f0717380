//! Recording session state and orchestration
//!
//! - `state` holds the validated session state machine and its observers
//! - `coordinator` drives sessions against the capture and export layers

pub mod coordinator;
pub mod state;

pub use coordinator::{PermissionGate, RecorderUi, RecordingOrchestrator};
pub use state::{RecordingSessionModel, SessionError, SessionSnapshot, SessionState};
