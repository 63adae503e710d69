//! Flat archive exports from the upstream photo-sharing service.
//!
//! Layout: media files named `<name>_<photo-id>_o.<ext>` in one directory,
//! `photo_<id>_o.json` sidecars next to them, and an `albums.json` index that
//! lists the photo ids of every album. A photo may sit in several albums.

use crate::catalog::layout::RawEntry;
use crate::catalog::naming::{media_extension, relative_key, sanitize_album_title};
use crate::config::CatalogConfig;
use crate::error::BuildError;
use regex::Regex;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

#[derive(Debug, Default, Deserialize)]
struct AlbumIndex {
    #[serde(default)]
    albums: Vec<AlbumRecord>,
}

#[derive(Debug, Deserialize)]
struct AlbumRecord {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    photos: Vec<String>,
}

/// Album membership: photo id -> album names, plus ids in first-seen order.
#[derive(Debug, Default)]
struct Membership {
    albums_by_photo: HashMap<String, Vec<String>>,
    order: Vec<String>,
}

impl Membership {
    fn from_index(index: AlbumIndex) -> Self {
        let mut membership = Self::default();
        for album in index.albums {
            let name = sanitize_album_title(album.title.as_deref().unwrap_or_default());
            for photo_id in album.photos {
                if !membership.albums_by_photo.contains_key(&photo_id) {
                    membership.order.push(photo_id.clone());
                }
                let albums = membership.albums_by_photo.entry(photo_id).or_default();
                if !albums.contains(&name) {
                    albums.push(name.clone());
                }
            }
        }
        membership
    }

    fn albums_of(&self, photo_id: &str) -> &[String] {
        self.albums_by_photo
            .get(photo_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

pub(crate) fn scan(root: &Path) -> std::io::Result<Vec<RawEntry>> {
    let membership = load_membership(root);

    let mut names: Vec<(String, PathBuf)> = std::fs::read_dir(root)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| (e.file_name().to_string_lossy().into_owned(), e.path()))
        .collect();
    names.sort();

    let mut entries = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();

    for (file_name, path) in names {
        if CatalogConfig::IGNORED_FILENAMES.contains(&file_name.as_str()) {
            debug!("Ignoring known-bad archive entry {}", file_name);
            continue;
        }
        if media_extension(&path).is_none() {
            continue;
        }

        let key = relative_key(root, &path);
        let Some(photo_id) = photo_id_from_filename(&file_name) else {
            entries.push(RawEntry::broken(
                key,
                path,
                BuildError::UnrecognizedName { file_name },
            ));
            continue;
        };
        seen_ids.insert(photo_id.clone());

        let albums = membership.albums_of(&photo_id);
        let mut folders = albums.iter().map(|a| vec![a.clone()]);
        let folder = folders.next().unwrap_or_default();

        let mut raw = RawEntry::asset(key, path, folder);
        raw.extra_folders = folders.collect();
        raw.sidecar = sidecar_for_photo(root, &photo_id);
        entries.push(raw);
    }

    for photo_id in &membership.order {
        if seen_ids.contains(photo_id) {
            continue;
        }
        let albums = membership.albums_of(photo_id).to_vec();
        entries.push(RawEntry::broken(
            format!("{}#{}", CatalogConfig::ALBUMS_INDEX_FILENAME, photo_id),
            root.join(format!("photo {}", photo_id)),
            BuildError::MissingMedia { albums },
        ));
    }

    Ok(entries)
}

fn load_membership(root: &Path) -> Membership {
    let path = root.join(CatalogConfig::ALBUMS_INDEX_FILENAME);
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) => {
            warn!(
                "Cannot read {} ({}); photos will have no album assignments",
                path.display(),
                e
            );
            return Membership::default();
        }
    };

    match serde_json::from_str::<AlbumIndex>(&text) {
        Ok(index) => Membership::from_index(index),
        Err(e) => {
            warn!(
                "Cannot parse {} ({}); photos will have no album assignments",
                path.display(),
                e
            );
            Membership::default()
        }
    }
}

/// Flickr names media `<title>_<photo id>_<size>.<ext>`. The photo id is the
/// second-to-last `_`-separated token and must be all digits.
///
/// `img_0042_10438972513_o.jpg` -> `10438972513`; `a_b_o.jpg` -> none.
static PHOTO_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|_)(\d+)_[^_]*$").expect("photo id regex must compile"));

pub(crate) fn photo_id_from_filename(file_name: &str) -> Option<String> {
    PHOTO_ID
        .captures(file_name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn sidecar_for_photo(root: &Path, photo_id: &str) -> Option<PathBuf> {
    [
        format!("photo_{}_o.json", photo_id),
        format!("photo_{}.json", photo_id),
    ]
    .into_iter()
    .map(|name| root.join(name))
    .find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_photo_id_from_filename() {
        assert_eq!(
            photo_id_from_filename("img_0042_10438972513_o.jpg").as_deref(),
            Some("10438972513")
        );
        assert_eq!(photo_id_from_filename("beach_987_o.png").as_deref(), Some("987"));
        assert_eq!(photo_id_from_filename("987_o.png").as_deref(), Some("987"));
        assert_eq!(photo_id_from_filename("holiday.jpg"), None);
        assert_eq!(photo_id_from_filename("a_b_o.jpg"), None);
        assert_eq!(photo_id_from_filename("shot_12a_o.jpg"), None);
        assert_eq!(photo_id_from_filename("12_o_x.jpg"), None);
    }

    #[test]
    fn test_scan_assigns_albums_and_reports_missing_media() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::write(
            root.join("albums.json"),
            r#"{"albums": [
                {"title": "Trips: 2019!", "photos": ["111", "222", "999"]},
                {"title": "Best", "photos": ["111"]}
            ]}"#,
        )
        .unwrap();
        fs::write(root.join("lake_111_o.jpg"), b"x").unwrap();
        fs::write(root.join("city_222_o.jpg"), b"x").unwrap();
        fs::write(root.join("stray_333_o.jpg"), b"x").unwrap();
        fs::write(root.join("noid.jpg"), b"x").unwrap();
        fs::write(root.join("photo_111_o.json"), b"{}").unwrap();
        fs::write(root.join("photo_222.json"), b"{}").unwrap();
        fs::write(root.join("r-035_1451016205_o.jpg"), b"x").unwrap();

        let entries = scan(root).unwrap();
        let keys: Vec<_> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "city_222_o.jpg",
                "lake_111_o.jpg",
                "noid.jpg",
                "stray_333_o.jpg",
                "albums.json#999"
            ]
        );

        let lake = &entries[1];
        assert_eq!(lake.folder, vec!["Trips 2019"]);
        assert_eq!(lake.extra_folders, vec![vec!["Best".to_string()]]);
        assert!(lake.sidecar.as_ref().unwrap().ends_with("photo_111_o.json"));

        assert!(entries[0].sidecar.as_ref().unwrap().ends_with("photo_222.json"));
        assert!(matches!(
            entries[2].problem,
            Some(BuildError::UnrecognizedName { .. })
        ));
        assert!(entries[3].folder.is_empty());
        assert!(matches!(
            entries[4].problem,
            Some(BuildError::MissingMedia { .. })
        ));
    }

    #[test]
    fn test_unparsable_index_means_no_albums() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("albums.json"), b"[oops").unwrap();
        fs::write(tmp.path().join("a_1_o.jpg"), b"x").unwrap();

        let entries = scan(tmp.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].folder.is_empty());
        assert!(entries[0].problem.is_none());
    }
}
