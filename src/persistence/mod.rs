//! Local persistence for the relay.
//!
//! # File Layout
//!
//! ```text
//! <data_dir>/
//!   processed_ids.json   # dedup store: JSON array of attempted message ids
//!   running.flag         # liveness marker, present while the process runs
//! <backup_dir>/          # copy of the connector session, refreshed at shutdown
//! ```
//!
//! # Crash Safety
//!
//! - Files are replaced with write-to-temp-then-rename plus fsync
//! - The dedup file tolerates being missing or corrupt (loads as empty)
//! - No file is shared with another process

use std::io;

use thiserror::Error;

pub mod atomic;
pub mod backup;
pub mod dedup;
pub mod marker;

pub use atomic::{fsync_dir, fsync_file, write_atomic, write_json_atomic};
pub use backup::backup_dir;
pub use dedup::{DedupSnapshot, DedupStore};
pub use marker::{clear_marker, is_marked_running, write_marker};

/// File name of the dedup store inside the data directory.
pub const DEDUP_FILE_NAME: &str = "processed_ids.json";

/// File name of the liveness marker inside the data directory.
pub const MARKER_FILE_NAME: &str = "running.flag";

/// Errors from reading or writing local state.
///
/// These are always logged and never fatal.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The blocking writer task panicked or was cancelled.
    #[error("write task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
