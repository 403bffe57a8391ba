//! Backup of the connector's session directory.
//!
//! The connector keeps its paired session on disk. During shutdown the relay
//! copies that directory to a secondary location so a corrupted session can
//! be restored by hand. The copy is assembled beside the destination and
//! swapped in only once complete, so an interrupted backup never replaces a
//! good one.

use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

use super::PersistenceError;
use super::atomic::temp_path_for;

/// Copies `source` recursively into `destination`, replacing any previous
/// backup. Returns the number of files copied.
///
/// A missing source directory is not an error and copies nothing.
pub fn backup_dir(source: &Path, destination: &Path) -> Result<u64, PersistenceError> {
    if !source.is_dir() {
        debug!(source = %source.display(), "No session directory to back up");
        return Ok(0);
    }

    let staging = temp_path_for(destination);
    remove_dir_if_exists(&staging)?;
    if let Some(parent) = destination.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let copied = copy_tree(source, &staging)?;

    remove_dir_if_exists(destination)?;
    fs::rename(&staging, destination)?;

    Ok(copied)
}

fn copy_tree(source: &Path, destination: &Path) -> io::Result<u64> {
    fs::create_dir_all(destination)?;
    let mut copied = 0;

    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let target = destination.join(entry.file_name());

        if file_type.is_dir() {
            copied += copy_tree(&entry.path(), &target)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
        // Symlinks and special files are skipped.
    }

    Ok(copied)
}

fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
