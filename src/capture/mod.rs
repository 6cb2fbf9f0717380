//! Capture configuration and backends
//!
//! `config` resolves what to record; `backend` defines the per-session
//! capture contract with two implementations (`native` for platforms whose
//! capture service encodes to file itself, `relay` for those that deliver
//! raw sample buffers); `probe` validates finished output.

pub mod backend;
pub mod config;
pub mod native;
pub mod probe;
pub mod relay;

pub use backend::{
    BackendError, BackendFactory, CaptureBackend, CaptureCapabilities, CaptureMetadata,
    SampleBuffer, SampleKind,
};
pub use config::{
    ContentProvider, DisplayInfo, PermissionStatus, QualityPreset, RecordingConfig, RecordingMode,
    RecordingPreferences, RecordingTarget, WindowInfo,
};
pub use native::NativeFileBackend;
pub use probe::{validate_video, FfprobeProbe, VideoMetadata, VideoProbe};
pub use relay::BufferRelayBackend;
