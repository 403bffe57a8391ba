//! Liveness marker file.
//!
//! The presence of the marker means "a relay process is running". It is
//! written at startup and removed as the last persistence step of shutdown.
//! The contents (the start timestamp) are informational only.

use std::io;
use std::path::Path;

use chrono::Utc;

use super::PersistenceError;
use super::atomic::write_atomic;

/// Creates or refreshes the marker at `path`.
pub fn write_marker(path: &Path) -> Result<(), PersistenceError> {
    let contents = format!("{}\n", Utc::now().to_rfc3339());
    write_atomic(path, contents.as_bytes())
}

/// Removes the marker. A marker that is already absent is not an error.
pub fn clear_marker(path: &Path) -> Result<(), PersistenceError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Returns true if the marker is present.
pub fn is_marked_running(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_clear() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("running.flag");

        write_marker(&path).unwrap();
        assert!(is_marked_running(&path));

        clear_marker(&path).unwrap();
        assert!(!is_marked_running(&path));
    }

    #[test]
    fn clear_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("running.flag");

        clear_marker(&path).unwrap();
        clear_marker(&path).unwrap();
    }

    #[test]
    fn marker_contains_timestamp() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("running.flag");
        write_marker(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(contents.trim()).is_ok());
    }
}
