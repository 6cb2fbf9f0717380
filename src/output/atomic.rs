//! Atomic output discipline
//!
//! A final path only ever shows a fully-written artifact: all writing goes
//! to a temporary path in the same directory, and a single finalize step
//! renames it into place. A dangling temp file after a failure is the only
//! allowed inconsistency, and `discard` removes it.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("temporary output missing: {0:?}")]
    Missing(PathBuf),

    #[error("final path has no parent directory: {0:?}")]
    NoParent(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A temporary-path/final-path pair. At most one is live per artifact
/// stage; it is either finalized or discarded, never both.
#[derive(Debug, Clone)]
pub struct PendingOutput {
    temp_path: PathBuf,
    final_path: PathBuf,
}

impl PendingOutput {
    /// Where the backend/exporter writes while the output is in flight.
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Where the artifact becomes visible after `finalize`.
    pub fn final_path(&self) -> &Path {
        &self.final_path
    }
}

/// Prepare a pending output for `final_path`. Creates the containing
/// directory, derives a uuid-suffixed temp path in the same directory (so
/// the later rename is same-filesystem and atomic), and removes any stale
/// temp file at that exact path. The final path itself is never touched.
pub fn prepare(final_path: &Path) -> Result<PendingOutput, OutputError> {
    let parent = final_path
        .parent()
        .ok_or_else(|| OutputError::NoParent(final_path.to_path_buf()))?;
    fs::create_dir_all(parent)?;

    let file_name = final_path
        .file_name()
        .ok_or_else(|| OutputError::NoParent(final_path.to_path_buf()))?
        .to_string_lossy();
    let temp_path = parent.join(format!(
        ".{}.{}.partial",
        file_name,
        Uuid::new_v4().simple()
    ));

    if temp_path.exists() {
        fs::remove_file(&temp_path)?;
    }

    tracing::debug!(
        temp = %temp_path.display(),
        target_path = %final_path.display(),
        "prepared pending output"
    );
    Ok(PendingOutput {
        temp_path,
        final_path: final_path.to_path_buf(),
    })
}

/// Atomically move the temp file into place. Fails with `Missing` if nothing
/// was written to the temp path. An existing file at the final path is
/// replaced (final paths are generated uniquely per capture, so this only
/// matters when that assumption is violated; it is logged).
pub fn finalize(pending: &PendingOutput) -> Result<PathBuf, OutputError> {
    if !pending.temp_path.exists() {
        return Err(OutputError::Missing(pending.temp_path.clone()));
    }

    if pending.final_path.exists() {
        tracing::warn!(
            path = %pending.final_path.display(),
            "replacing existing file at final path"
        );
        fs::remove_file(&pending.final_path)?;
    }

    fs::rename(&pending.temp_path, &pending.final_path)?;
    tracing::info!(path = %pending.final_path.display(), "output finalized");
    Ok(pending.final_path.clone())
}

/// Best-effort removal of the temp file. Safe to call repeatedly; errors are
/// logged rather than propagated so cleanup never masks the failure that
/// caused it.
pub fn discard(pending: &PendingOutput) {
    match fs::remove_file(&pending.temp_path) {
        Ok(()) => {
            tracing::debug!(temp = %pending.temp_path.display(), "discarded pending output");
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(
                temp = %pending.temp_path.display(),
                error = %e,
                "failed to discard pending output"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn prepare_then_finalize_round_trips_bytes() {
        let dir = tempdir().unwrap();
        let final_path = dir.path().join("clips").join("capture.mp4");

        let pending = prepare(&final_path).unwrap();
        assert!(!final_path.exists());
        assert_eq!(pending.temp_path().parent(), final_path.parent());

        fs::write(pending.temp_path(), b"encoded video bytes").unwrap();
        let finalized = finalize(&pending).unwrap();

        assert_eq!(finalized, final_path);
        assert_eq!(fs::read(&final_path).unwrap(), b"encoded video bytes");
        assert!(!pending.temp_path().exists());
    }

    #[test]
    fn finalize_without_temp_file_fails() {
        let dir = tempdir().unwrap();
        let pending = prepare(&dir.path().join("capture.mp4")).unwrap();

        let err = finalize(&pending).unwrap_err();
        assert!(matches!(err, OutputError::Missing(_)));
        assert!(!pending.final_path().exists());
    }

    #[test]
    fn finalize_replaces_existing_final_file() {
        let dir = tempdir().unwrap();
        let final_path = dir.path().join("capture.mp4");
        fs::write(&final_path, b"old").unwrap();

        let pending = prepare(&final_path).unwrap();
        fs::write(pending.temp_path(), b"new").unwrap();
        finalize(&pending).unwrap();

        assert_eq!(fs::read(&final_path).unwrap(), b"new");
    }

    #[test]
    fn discard_is_idempotent() {
        let dir = tempdir().unwrap();
        let pending = prepare(&dir.path().join("capture.mp4")).unwrap();
        fs::write(pending.temp_path(), b"partial").unwrap();

        discard(&pending);
        assert!(!pending.temp_path().exists());
        // Second call is a no-op, not an error
        discard(&pending);
    }

    #[test]
    fn final_path_only_appears_after_finalize() {
        let dir = tempdir().unwrap();
        let final_path = dir.path().join("capture.mp4");

        let pending = prepare(&final_path).unwrap();
        fs::write(pending.temp_path(), b"data").unwrap();
        assert!(!final_path.exists());

        finalize(&pending).unwrap();
        assert!(final_path.exists());
    }
}
