//! Durable JSON documents with atomic replace.
//!
//! Every state file is written to a sibling temporary file and renamed over
//! the target, so readers see either the old or the new document and never a
//! partial one. Per session, hook events arrive strictly sequentially, so no
//! locking is layered on top.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::DriveError;

/// Serialize `value` as pretty JSON and atomically replace `path`.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create state directory: {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to serialize {}", path.display()))?;
    let temporary = temporary_sibling(path);
    std::fs::write(&temporary, json)
        .with_context(|| format!("failed to write {}", temporary.display()))?;
    if let Err(e) = std::fs::rename(&temporary, path) {
        let _ = std::fs::remove_file(&temporary);
        return Err(e).with_context(|| {
            format!(
                "failed to rename {} over {}",
                temporary.display(),
                path.display()
            )
        });
    }
    Ok(())
}

/// Read a JSON document. A missing file is `Ok(None)`; a malformed one is
/// `DriveError::StaleData`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
    };

    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|source| {
            DriveError::StaleData {
                path: path.to_path_buf(),
                source,
            }
            .into()
        })
}

/// Rename `path` to `archive`, replacing any earlier archive.
/// Returns false when there was nothing to archive.
pub fn archive(path: &Path, archive: &Path) -> Result<bool> {
    match std::fs::rename(path, archive) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| {
            format!(
                "failed to archive {} to {}",
                path.display(),
                archive.display()
            )
        }),
    }
}

/// Delete `path`; a file that is already gone is not an error.
pub fn remove(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("failed to delete {}", path.display())),
    }
}

fn temporary_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "state".to_string());
    path.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()))
}
