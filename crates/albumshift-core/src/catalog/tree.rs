//! Album-tree exports: every directory level is a folder segment.

use crate::catalog::layout::RawEntry;
use crate::catalog::naming::{is_hidden_name, media_extension, relative_key, sidecar_for};
use crate::error::BuildError;
use std::path::Path;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

pub(crate) fn scan(root: &Path) -> Vec<RawEntry> {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

    let mut entries = Vec::new();
    for item in walker {
        let entry = match item {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().unwrap_or(root).to_path_buf();
                let key = relative_key(root, &path);
                entries.push(RawEntry::broken(
                    key,
                    path,
                    BuildError::Unreadable {
                        message: err.to_string(),
                    },
                ));
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if media_extension(path).is_none() {
            debug!("Ignoring non-media file {}", path.display());
            continue;
        }

        let key = relative_key(root, path);
        let folder = folder_segments(root, path);
        let mut raw = RawEntry::asset(key, path.to_path_buf(), folder);
        raw.sidecar = sidecar_for(path).filter(|p| p.is_file());
        entries.push(raw);
    }
    entries
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(is_hidden_name)
        .unwrap_or(false)
}

fn folder_segments(root: &Path, path: &Path) -> Vec<String> {
    let Some(parent) = path.parent() else {
        return Vec::new();
    };
    let key = relative_key(root, parent);
    if key.is_empty() {
        Vec::new()
    } else {
        key.split('/').map(str::to_string).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scan_maps_directories_to_folders() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("Trips/Italy")).unwrap();
        fs::create_dir_all(root.join(".thumbs")).unwrap();
        fs::write(root.join("loose.jpg"), b"x").unwrap();
        fs::write(root.join("Trips/Italy/b.jpg"), b"x").unwrap();
        fs::write(root.join("Trips/Italy/a.JPG"), b"x").unwrap();
        fs::write(root.join("Trips/Italy/a.JPG.json"), b"{}").unwrap();
        fs::write(root.join("Trips/notes.txt"), b"x").unwrap();
        fs::write(root.join(".thumbs/t.jpg"), b"x").unwrap();
        fs::write(root.join(".hidden.jpg"), b"x").unwrap();

        let entries = scan(root);
        let keys: Vec<_> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["Trips/Italy/a.JPG", "Trips/Italy/b.jpg", "loose.jpg"]);

        assert_eq!(entries[0].folder, vec!["Trips", "Italy"]);
        assert!(entries[0].sidecar.is_some());
        assert!(entries[1].sidecar.is_none());
        assert!(entries[2].folder.is_empty());
        assert!(entries.iter().all(|e| e.problem.is_none()));
    }
}
