//! Output-file discipline
//!
//! Finished captures become visible at their final path in a single rename;
//! everything in flight lives under a hidden temp name next to it.

pub mod atomic;

pub use atomic::{discard, finalize, prepare, OutputError, PendingOutput};
