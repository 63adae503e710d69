//! Asset catalog building.
//!
//! Scans an export directory and produces the ordered list of import units the
//! plan is made of. The build is read-only and deterministic: the same export
//! yields the same unit ids, folder paths and order every time. Problems with a
//! single entry become Skipped units or notes, never a failed build.

mod flickr;
mod layout;
pub mod naming;
pub mod sidecar;
mod tree;

pub use layout::ExportLayout;

use crate::error::{BuildError, MigrateError, Result};
use crate::metadata::{CaptureTimeSource, NoCaptureTime};
use crate::plan::ImportUnit;
use layout::RawEntry;
use naming::unit_id_for;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Result of a catalog build.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub export_root: PathBuf,
    pub layout: ExportLayout,
    /// Units in catalog order, all Pending or Skipped.
    pub units: Vec<ImportUnit>,
    pub stats: CatalogStats,
}

/// Counters gathered while building a catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    pub assets: usize,
    pub skipped: usize,
    pub sidecars_applied: usize,
    pub sidecars_rejected: usize,
    pub capture_times: usize,
    pub folders: usize,
}

/// Builds catalogs from export directories.
pub struct CatalogBuilder {
    capture: Box<dyn CaptureTimeSource>,
    layout: Option<ExportLayout>,
}

impl Default for CatalogBuilder {
    fn default() -> Self {
        Self {
            capture: Box::new(NoCaptureTime),
            layout: None,
        }
    }
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `source` to look up embedded capture timestamps.
    pub fn with_capture_source(mut self, source: impl CaptureTimeSource + 'static) -> Self {
        self.capture = Box::new(source);
        self
    }

    /// Force a layout instead of detecting it.
    pub fn with_layout(mut self, layout: ExportLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    /// Scan `export_root` and produce the catalog.
    pub fn build(&self, export_root: &Path) -> Result<Catalog> {
        if !export_root.is_dir() {
            return Err(MigrateError::InvalidExportRoot(export_root.to_path_buf()));
        }
        let root = export_root
            .canonicalize()
            .map_err(|e| MigrateError::io_with_path(e, export_root))?;

        let layout = self.layout.unwrap_or_else(|| ExportLayout::detect(&root));
        info!("Scanning {} as a {} export", root.display(), layout);

        let raw = match layout {
            ExportLayout::Tree => tree::scan(&root),
            ExportLayout::Flickr => {
                flickr::scan(&root).map_err(|e| MigrateError::io_with_path(e, &root))?
            }
        };

        let mut stats = CatalogStats::default();
        let mut ids: HashMap<String, PathBuf> = HashMap::new();
        let mut units = Vec::with_capacity(raw.len());
        for entry in raw {
            let unit = self.finish_entry(entry, &mut ids, &mut stats);
            units.push(unit);
        }

        let folders: BTreeSet<&Vec<String>> = units
            .iter()
            .filter(|u| !u.destination_folder_path.is_empty())
            .flat_map(|u| std::iter::once(&u.destination_folder_path).chain(&u.extra_folder_paths))
            .collect();
        stats.folders = folders.len();

        info!(
            "Catalog: {} assets, {} skipped, {} folders",
            stats.assets, stats.skipped, stats.folders
        );
        Ok(Catalog {
            export_root: root,
            layout,
            units,
            stats,
        })
    }

    fn finish_entry(
        &self,
        entry: RawEntry,
        ids: &mut HashMap<String, PathBuf>,
        stats: &mut CatalogStats,
    ) -> ImportUnit {
        let (unit_id, duplicate_of) = allocate_id(&entry.key, &entry.source_path, ids);

        let mut unit = ImportUnit::pending(unit_id.clone(), entry.source_path, entry.key, entry.folder);
        unit.extra_folder_paths = entry.extra_folders;

        let problem = match duplicate_of {
            Some(existing) => Some(BuildError::DuplicateUnit { unit_id, existing }),
            None => entry.problem,
        };
        if let Some(problem) = problem {
            warn!("Skipping {}: {}", unit.relative_path, problem);
            stats.skipped += 1;
            return unit.into_skipped(problem.to_string());
        }
        stats.assets += 1;

        let mut date_taken = None;
        if let Some(sidecar_path) = entry.sidecar {
            match sidecar::read_sidecar(&sidecar_path) {
                Ok(info) => {
                    unit.caption = info.caption;
                    unit.tags = info.tags;
                    unit.location = info.location;
                    unit.license = info.license;
                    date_taken = info.date_taken;
                    stats.sidecars_applied += 1;
                }
                Err(e) => {
                    warn!("{}; using defaults for {}", e, unit.relative_path);
                    unit.note = Some(e.to_string());
                    stats.sidecars_rejected += 1;
                }
            }
        }

        unit.captured_at = match self.capture.capture_time(&unit.source_path) {
            Ok(when) => Some(when),
            Err(e) => {
                debug!("{} for {}", e, unit.relative_path);
                date_taken
            }
        };
        if unit.captured_at.is_some() {
            stats.capture_times += 1;
        }

        unit
    }
}

/// Pick a unique id for `key`; on a clash, salt the key until it is free and
/// report the path the original id belongs to.
fn allocate_id(
    key: &str,
    source_path: &Path,
    ids: &mut HashMap<String, PathBuf>,
) -> (String, Option<PathBuf>) {
    let id = unit_id_for(key);
    let Some(existing) = ids.get(&id).cloned() else {
        ids.insert(id.clone(), source_path.to_path_buf());
        return (id, None);
    };

    let mut salt = 1u32;
    loop {
        let candidate = unit_id_for(&format!("{}#{}", key, salt));
        if !ids.contains_key(&candidate) {
            ids.insert(candidate.clone(), source_path.to_path_buf());
            return (candidate, Some(existing));
        }
        salt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataUnavailable;
    use crate::plan::UnitStatus;
    use chrono::NaiveDateTime;
    use std::fs;
    use tempfile::TempDir;

    struct FixedCaptureTime(&'static str);

    impl CaptureTimeSource for FixedCaptureTime {
        fn capture_time(&self, path: &Path) -> std::result::Result<NaiveDateTime, MetadataUnavailable> {
            if path.file_name().is_some_and(|n| n == "known.jpg") {
                Ok(NaiveDateTime::parse_from_str(self.0, "%Y-%m-%d %H:%M:%S").unwrap())
            } else {
                Err(MetadataUnavailable {
                    reason: "no tag".into(),
                })
            }
        }
    }

    fn write_tree(root: &Path) {
        fs::create_dir_all(root.join("AlbumA")).unwrap();
        fs::create_dir_all(root.join("AlbumB")).unwrap();
        fs::create_dir_all(root.join("AlbumC")).unwrap();
        for i in 0..2 {
            fs::write(root.join(format!("AlbumA/a{}.jpg", i)), b"x").unwrap();
        }
        for i in 0..5 {
            fs::write(root.join(format!("AlbumC/c{}.jpg", i)), b"x").unwrap();
        }
    }

    #[test]
    fn test_three_albums_scenario() {
        let tmp = TempDir::new().unwrap();
        write_tree(tmp.path());

        let catalog = CatalogBuilder::new().build(tmp.path()).unwrap();
        assert_eq!(catalog.layout, ExportLayout::Tree);
        assert_eq!(catalog.units.len(), 7);
        assert!(catalog.units.iter().all(|u| u.status == UnitStatus::Pending));

        let in_a = catalog
            .units
            .iter()
            .filter(|u| u.destination_folder_path == vec!["AlbumA".to_string()])
            .count();
        let in_c = catalog
            .units
            .iter()
            .filter(|u| u.destination_folder_path == vec!["AlbumC".to_string()])
            .count();
        assert_eq!((in_a, in_c), (2, 5));
        assert_eq!(catalog.stats.folders, 2);
    }

    #[test]
    fn test_builds_are_deterministic() {
        let tmp = TempDir::new().unwrap();
        write_tree(tmp.path());
        let builder = CatalogBuilder::new();

        let first = builder.build(tmp.path()).unwrap();
        let second = builder.build(tmp.path()).unwrap();

        let ids = |c: &Catalog| {
            c.units
                .iter()
                .map(|u| (u.unit_id.clone(), u.destination_folder_path.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn test_sidecars_and_capture_times() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::write(root.join("known.jpg"), b"x").unwrap();
        fs::write(root.join("dated.jpg"), b"x").unwrap();
        fs::write(
            root.join("dated.jpg.json"),
            r#"{"title": "Dated", "tags": ["t"], "date_taken": "2001-02-03 04:05:06",
                "latitude": 51.5, "longitude": -0.12, "license": "All Rights Reserved"}"#,
        )
        .unwrap();
        fs::write(root.join("broken.jpg"), b"x").unwrap();
        fs::write(root.join("broken.jpg.json"), b"{{{").unwrap();

        let catalog = CatalogBuilder::new()
            .with_capture_source(FixedCaptureTime("2020-01-01 00:00:00"))
            .build(root)
            .unwrap();
        let by_name = |n: &str| catalog.units.iter().find(|u| u.relative_path == n).unwrap();

        let broken = by_name("broken.jpg");
        assert_eq!(broken.status, UnitStatus::Pending);
        assert!(broken.note.as_ref().unwrap().contains("sidecar"));
        assert!(broken.caption.is_none());

        let dated = by_name("dated.jpg");
        assert_eq!(dated.caption.as_deref(), Some("Dated"));
        assert_eq!(dated.tags, vec!["t"]);
        assert_eq!(dated.captured_at.unwrap().to_string(), "2001-02-03 04:05:06");
        assert_eq!(dated.location.map(|l| (l.latitude, l.longitude)), Some((51.5, -0.12)));
        assert_eq!(dated.license.as_deref(), Some("All Rights Reserved"));
        assert_eq!(by_name("known.jpg").location, None);

        let known = by_name("known.jpg");
        assert_eq!(known.captured_at.unwrap().to_string(), "2020-01-01 00:00:00");

        assert_eq!(catalog.stats.sidecars_applied, 1);
        assert_eq!(catalog.stats.sidecars_rejected, 1);
        assert_eq!(catalog.stats.capture_times, 2);
    }

    #[test]
    fn test_flickr_problems_become_skipped_units() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::write(
            root.join("albums.json"),
            r#"{"albums": [{"title": "Lake", "photos": ["1", "2"]}]}"#,
        )
        .unwrap();
        fs::write(root.join("x_1_o.jpg"), b"x").unwrap();

        let catalog = CatalogBuilder::new().build(root).unwrap();
        assert_eq!(catalog.layout, ExportLayout::Flickr);
        assert_eq!(catalog.units.len(), 2);
        assert_eq!(catalog.units[0].destination_folder_path, vec!["Lake"]);
        assert_eq!(catalog.units[1].status, UnitStatus::Skipped);
        assert!(catalog.units[1].note.as_ref().unwrap().contains("no media file"));
        assert_eq!(catalog.stats.skipped, 1);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let err = CatalogBuilder::new()
            .build(&tmp.path().join("nope"))
            .unwrap_err();
        assert!(matches!(err, MigrateError::InvalidExportRoot(_)));
    }

    #[test]
    fn test_allocate_id_salts_clashes() {
        let mut ids = HashMap::new();
        let (first, dup) = allocate_id("a.jpg", Path::new("/x/a.jpg"), &mut ids);
        assert!(dup.is_none());
        let (second, dup) = allocate_id("a.jpg", Path::new("/y/a.jpg"), &mut ids);
        assert_ne!(first, second);
        assert_eq!(dup, Some(PathBuf::from("/x/a.jpg")));
    }
}
