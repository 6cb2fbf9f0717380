//! Screen recording orchestration core.
//!
//! Drives screen, window, and area recordings end to end: target selection,
//! capture backends, atomic output files, validation, GIF export, and the
//! session state machine the UI observes. Platform capture services and UI
//! layers plug in behind the traits in [`capture`] and [`recorder`].

pub mod capture;
pub mod error;
pub mod export;
pub mod output;
pub mod recorder;
pub mod storage;

pub use error::{CaptureError, ErrorResponse};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing for binaries embedding this crate. Respects
/// `RUST_LOG`; defaults to debug-level output for this crate only.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "screencap=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
