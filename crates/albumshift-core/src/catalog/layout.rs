//! Export layouts and the raw entries a layout scan produces.

use crate::config::CatalogConfig;
use crate::error::BuildError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// How an export directory is organised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportLayout {
    /// Albums are directories; nesting becomes folder hierarchy.
    Tree,
    /// One flat directory with an `albums.json` index and per-photo sidecars.
    Flickr,
}

impl ExportLayout {
    /// Pick the layout from what is present in `root`.
    pub fn detect(root: &Path) -> Self {
        if root.join(CatalogConfig::ALBUMS_INDEX_FILENAME).is_file() {
            ExportLayout::Flickr
        } else {
            ExportLayout::Tree
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExportLayout::Tree => "tree",
            ExportLayout::Flickr => "flickr",
        }
    }
}

impl fmt::Display for ExportLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tree" => Ok(ExportLayout::Tree),
            "flickr" => Ok(ExportLayout::Flickr),
            other => Err(format!("unknown export layout {:?} (expected tree or flickr)", other)),
        }
    }
}

/// One asset candidate found by a layout scan, before ids and metadata are attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawEntry {
    /// Key the unit id is derived from; the export-relative path for real files.
    pub key: String,
    pub source_path: PathBuf,
    pub folder: Vec<String>,
    pub extra_folders: Vec<Vec<String>>,
    pub sidecar: Option<PathBuf>,
    /// Set when the entry cannot become an importable unit.
    pub problem: Option<BuildError>,
}

impl RawEntry {
    pub fn asset(key: String, source_path: PathBuf, folder: Vec<String>) -> Self {
        Self {
            key,
            source_path,
            folder,
            extra_folders: Vec::new(),
            sidecar: None,
            problem: None,
        }
    }

    pub fn broken(key: String, source_path: PathBuf, problem: BuildError) -> Self {
        Self {
            problem: Some(problem),
            ..Self::asset(key, source_path, Vec::new())
        }
    }
}
