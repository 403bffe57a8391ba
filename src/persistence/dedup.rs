//! Durable set of message ids that have already been attempted.
//!
//! The store is the only mechanism that prevents a message from being
//! forwarded twice. It is loaded once at startup, mutated by the
//! reconciliation loop after every dispatch attempt, and flushed after each
//! tick that changed it and again at shutdown.
//!
//! # File Format
//!
//! A JSON array of ids. Order carries no meaning; entries may be JSON
//! strings or numbers. Ids are written sorted so that successive files diff
//! cleanly.
//!
//! # Crash Window
//!
//! The file is not fsynced after every mark. A crash between a send and the
//! next flush can cause that message to be forwarded once more after
//! restart.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::PersistenceError;
use super::atomic::write_json_atomic;
use crate::types::MessageId;

/// Loads the persisted id set.
///
/// Never fails: a missing file yields an empty set, and an unreadable or
/// corrupt file yields an empty set plus a warning.
pub fn load(path: &Path) -> HashSet<MessageId> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No dedup file yet, starting empty");
            return HashSet::new();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read dedup file, starting empty");
            return HashSet::new();
        }
    };

    match serde_json::from_slice::<Vec<MessageId>>(&bytes) {
        Ok(ids) => ids.into_iter().collect(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Corrupt dedup file, starting empty");
            HashSet::new()
        }
    }
}

/// Atomically writes the id set to `path`.
pub fn persist(path: &Path, ids: &HashSet<MessageId>) -> Result<(), PersistenceError> {
    let mut sorted: Vec<&MessageId> = ids.iter().collect();
    sorted.sort();
    write_json_atomic(path, &sorted)
}

/// In-memory view of the dedup file.
///
/// Every newly marked id bumps a generation counter. The store is dirty
/// while the latest generation has not reached disk.
#[derive(Debug)]
pub struct DedupStore {
    path: PathBuf,
    ids: HashSet<MessageId>,
    generation: u64,
    flushed_generation: u64,
}

/// Point-in-time copy of the store, written without holding the store's lock.
#[derive(Debug, Clone)]
pub struct DedupSnapshot {
    path: PathBuf,
    ids: HashSet<MessageId>,
    generation: u64,
}

impl DedupSnapshot {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Atomically writes the snapshot to its file. Blocks on fsync.
    pub fn write(&self) -> Result<(), PersistenceError> {
        persist(&self.path, &self.ids)
    }
}

impl DedupStore {
    /// Opens the store backed by `path`, loading any existing ids.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let ids = load(&path);
        debug!(path = %path.display(), count = ids.len(), "Loaded dedup store");
        DedupStore {
            path,
            ids,
            generation: 0,
            flushed_generation: 0,
        }
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    /// Records that a dispatch attempt for `id` has completed.
    ///
    /// Returns `true` if the id was not previously recorded.
    pub fn mark_processed(&mut self, id: MessageId) -> bool {
        let inserted = self.ids.insert(id);
        if inserted {
            self.generation += 1;
        }
        inserted
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Returns true if ids were marked since the last successful flush.
    pub fn is_dirty(&self) -> bool {
        self.generation != self.flushed_generation
    }

    pub fn ids(&self) -> &HashSet<MessageId> {
        &self.ids
    }

    pub fn snapshot(&self) -> DedupSnapshot {
        DedupSnapshot {
            path: self.path.clone(),
            ids: self.ids.clone(),
            generation: self.generation,
        }
    }

    /// Notes that `snapshot` reached disk. Ids marked after the snapshot
    /// was taken keep the store dirty.
    pub fn record_flushed(&mut self, snapshot: &DedupSnapshot) {
        self.flushed_generation = self.flushed_generation.max(snapshot.generation);
    }

    /// Writes the current set to disk in place and clears the dirty flag.
    pub fn flush(&mut self) -> Result<(), PersistenceError> {
        let snapshot = self.snapshot();
        snapshot.write()?;
        self.record_flushed(&snapshot);
        Ok(())
    }
}
