//! Stable unit ids and album-name cleanup.

use crate::config::CatalogConfig;
use std::path::{Component, Path, PathBuf};

/// Derive the unit id for a source key (normally its export-relative path).
///
/// The id is a prefix of the BLAKE3 hash, so the same asset maps to the same
/// unit on every build.
pub fn unit_id_for(key: &str) -> String {
    let hash = blake3::hash(key.as_bytes());
    let mut id = hex::encode(hash.as_bytes());
    id.truncate(CatalogConfig::UNIT_ID_HEX_LEN);
    id
}

/// Render `path` relative to `root` with `/` separators.
///
/// Falls back to the lossy full path when `path` is outside `root`.
pub fn relative_key(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(relative) => relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => path.to_string_lossy().into_owned(),
    }
}

/// Keep alphanumerics, spaces, `-` and `_`; trim; never return an empty name.
pub fn sanitize_album_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        CatalogConfig::UNTITLED_ALBUM.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Lowercased extension if it names an importable media type.
pub fn media_extension(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    CatalogConfig::MEDIA_EXTENSIONS
        .contains(&ext.as_str())
        .then_some(ext)
}

/// `IMG_1.jpg` -> `IMG_1.jpg.json`, next to the asset.
pub fn sidecar_for(path: &Path) -> Option<PathBuf> {
    let mut name = path.file_name()?.to_os_string();
    name.push(CatalogConfig::SIDECAR_SUFFIX);
    Some(path.with_file_name(name))
}

pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
}
