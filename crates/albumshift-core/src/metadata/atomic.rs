//! Crash-safe JSON snapshots.
//!
//! A snapshot is written to a sibling temp file with a PID+TID suffix, synced,
//! and renamed over the target. After a crash the target holds either the old
//! or the new document, never a mix.

use crate::error::StoreError;
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::thread;
use tracing::{debug, warn};

/// Read and parse a JSON snapshot.
///
/// Returns `None` if the file doesn't exist. Unparsable content is `Corrupt`.
pub fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(e, path)),
    };

    let data = serde_json::from_str(&contents)
        .map_err(|e| StoreError::corrupt(path, format!("unparsable JSON: {}", e)))?;

    Ok(Some(data))
}

/// Write a JSON snapshot atomically, optionally keeping the previous one as a backup.
pub fn write_snapshot<T: Serialize>(
    path: &Path,
    data: &T,
    backup_suffix: Option<&str>,
) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(e, parent))?;
        }
    }

    let serialized = serde_json::to_string_pretty(data)
        .map_err(|e| StoreError::corrupt(path, format!("failed to serialize: {}", e)))?;

    // Never replace a good snapshot with one we cannot read back.
    serde_json::from_str::<serde_json::Value>(&serialized)
        .map_err(|e| StoreError::corrupt(path, format!("validation failed: {}", e)))?;

    let temp_path = temp_path_for(path);
    let written = write_and_sync(&temp_path, serialized.as_bytes());
    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(StoreError::io(e, &temp_path));
    }

    if let Some(suffix) = backup_suffix {
        if path.exists() {
            let backup_path = sibling_with_suffix(path, suffix);
            match fs::copy(path, &backup_path) {
                Ok(_) => debug!("Kept backup {}", backup_path.display()),
                Err(e) => warn!("Failed to create backup {}: {}", backup_path.display(), e),
            }
        }
    }

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        StoreError::io(e, path)
    })?;

    sync_parent_dir(path);
    debug!("Atomically wrote {}", path.display());
    Ok(())
}

/// `plan.json` + `lock` -> `plan.json.lock`.
pub fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

fn temp_path_for(path: &Path) -> PathBuf {
    sibling_with_suffix(path, &format!("{}.{}.tmp", process::id(), thread_id()))
}

fn write_and_sync(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(bytes)?;
    file.flush()?;
    file.sync_all()
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) {}

fn thread_id() -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    thread::current().id().hash(&mut hasher);
    hasher.finish()
}
