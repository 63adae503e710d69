//! Durable plan storage.
//!
//! The plan lives in a single JSON document. Every mutation rewrites the whole
//! document through `write_snapshot`, so a crash mid-write leaves either the
//! pre-update or the post-update plan on disk. The in-memory copy is only
//! changed once the write has succeeded.
//!
//! A store turned into a scratch copy (`into_scratch`) applies the same
//! checks and changes in memory but never writes.

use crate::catalog::Catalog;
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::metadata::{read_snapshot, sibling_with_suffix, write_snapshot};
use crate::plan::types::{ImportUnit, Plan, UnitStatus};
use chrono::Utc;
use fs2::FileExt;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A status change for one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitUpdate {
    pub status: UnitStatus,
    pub attempt_count: u32,
    pub error: Option<String>,
    pub note: Option<String>,
    pub asset_id: Option<String>,
}

impl UnitUpdate {
    pub fn in_progress(attempt_count: u32) -> Self {
        Self::bare(UnitStatus::InProgress, attempt_count)
    }

    pub fn completed(attempt_count: u32, asset_id: impl Into<String>) -> Self {
        Self {
            asset_id: Some(asset_id.into()),
            ..Self::bare(UnitStatus::Completed, attempt_count)
        }
    }

    pub fn failed(attempt_count: u32, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::bare(UnitStatus::Failed, attempt_count)
        }
    }

    pub fn skipped(attempt_count: u32, note: impl Into<String>) -> Self {
        Self {
            note: Some(note.into()),
            ..Self::bare(UnitStatus::Skipped, attempt_count)
        }
    }

    fn bare(status: UnitStatus, attempt_count: u32) -> Self {
        Self {
            status,
            attempt_count,
            error: None,
            note: None,
            asset_id: None,
        }
    }
}

/// Owner of a persisted plan.
#[derive(Debug)]
pub struct PlanStore {
    path: PathBuf,
    plan: Plan,
    /// False for scratch copies.
    persist: bool,
}

impl PlanStore {
    /// Whether a plan document exists at `path`.
    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    /// Persist a freshly built catalog as a new plan.
    ///
    /// Fails with `AlreadyExists` if a plan is present and `overwrite` is false,
    /// and with `DuplicateUnit` if two catalog entries share an id. Nothing is
    /// written in either case.
    pub fn create(path: &Path, catalog: Catalog, overwrite: bool) -> Result<Self, StoreError> {
        if path.exists() && !overwrite {
            return Err(StoreError::AlreadyExists(path.to_path_buf()));
        }

        let plan = Plan::new(catalog.export_root, catalog.layout, catalog.units)
            .map_err(|unit_id| StoreError::DuplicateUnit { unit_id })?;
        let mut store = Self {
            path: path.to_path_buf(),
            plan,
            persist: true,
        };
        let snapshot = store.next_snapshot();
        let backup = overwrite.then_some(StoreConfig::BACKUP_SUFFIX);
        write_snapshot(&store.path, &snapshot, backup)?;
        store.plan = snapshot;

        info!(
            "Created plan {} with {} units",
            store.path.display(),
            store.plan.units.len()
        );
        Ok(store)
    }

    /// Load an existing plan, validating it in full.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let mut plan: Plan =
            read_snapshot(path)?.ok_or_else(|| StoreError::NotFound(path.to_path_buf()))?;

        validate(path, &mut plan)?;
        debug!(
            "Loaded plan {} (version {}, {} units)",
            path.display(),
            plan.plan_version,
            plan.units.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            plan,
            persist: true,
        })
    }

    /// Keep working on this plan in memory only; later updates are never written.
    pub fn into_scratch(mut self) -> Self {
        self.persist = false;
        self
    }

    /// Whether updates reach the plan document.
    pub fn is_persistent(&self) -> bool {
        self.persist
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read-only view of the current plan.
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// Apply one status change and persist it before returning.
    pub fn update_unit(&mut self, unit_id: &str, update: UnitUpdate) -> Result<&ImportUnit, StoreError> {
        let current = self
            .plan
            .unit(unit_id)
            .ok_or_else(|| StoreError::UnknownUnit {
                unit_id: unit_id.to_string(),
            })?;

        if !current.status.can_transition_to(update.status) {
            return Err(StoreError::InvalidTransition {
                unit_id: unit_id.to_string(),
                message: format!("{} -> {} is not allowed", current.status, update.status),
            });
        }
        if update.attempt_count < current.attempt_count {
            return Err(StoreError::InvalidTransition {
                unit_id: unit_id.to_string(),
                message: format!(
                    "attempt_count would decrease from {} to {}",
                    current.attempt_count, update.attempt_count
                ),
            });
        }

        let mut snapshot = self.next_snapshot();
        if let Some(unit) = snapshot.unit_mut(unit_id) {
            apply(unit, update);
        }
        if self.persist {
            write_snapshot(&self.path, &snapshot, None)?;
        }
        self.plan = snapshot;

        self.plan
            .unit(unit_id)
            .ok_or_else(|| StoreError::UnknownUnit {
                unit_id: unit_id.to_string(),
            })
    }

    /// Explicit retry request: move Failed units back to Pending.
    ///
    /// With an empty `only`, every Failed unit is reset. Returns how many units
    /// changed. Attempt counts are kept.
    pub fn reset_failed(&mut self, only: &[String]) -> Result<usize, StoreError> {
        for unit_id in only {
            if self.plan.unit(unit_id).is_none() {
                return Err(StoreError::UnknownUnit {
                    unit_id: unit_id.clone(),
                });
            }
        }
        let wanted: HashSet<&str> = only.iter().map(String::as_str).collect();

        let mut snapshot = self.next_snapshot();
        let mut reset = 0;
        for unit in snapshot.units.iter_mut() {
            let selected = wanted.is_empty() || wanted.contains(unit.unit_id.as_str());
            if selected && unit.status == UnitStatus::Failed {
                unit.status = UnitStatus::Pending;
                unit.last_error = None;
                reset += 1;
            }
        }

        if reset > 0 {
            if self.persist {
                write_snapshot(&self.path, &snapshot, Some(StoreConfig::BACKUP_SUFFIX))?;
            }
            self.plan = snapshot;
            info!("Reset {} failed unit(s) to pending", reset);
        }
        Ok(reset)
    }

    /// Take the advisory lock that keeps two runs off the same plan.
    pub fn lock(&self) -> Result<PlanLock, StoreError> {
        PlanLock::acquire(&self.path)
    }

    /// Lock the plan at `path` without loading it, e.g. before replacing it.
    pub fn lock_at(path: &Path) -> Result<PlanLock, StoreError> {
        PlanLock::acquire(path)
    }

    fn next_snapshot(&self) -> Plan {
        let mut snapshot = self.plan.clone();
        snapshot.plan_version += 1;
        snapshot.updated_at = Utc::now();
        snapshot
    }
}

fn apply(unit: &mut ImportUnit, update: UnitUpdate) {
    unit.status = update.status;
    unit.attempt_count = update.attempt_count;
    unit.last_error = match update.status {
        UnitStatus::Failed => update.error,
        _ => None,
    };
    if update.note.is_some() {
        unit.note = update.note;
    }
    if update.asset_id.is_some() {
        unit.destination_asset_id = update.asset_id;
    }
}

fn validate(path: &Path, plan: &mut Plan) -> Result<(), StoreError> {
    if plan.format != StoreConfig::FORMAT_TAG {
        return Err(StoreError::corrupt(
            path,
            format!("not an albumshift plan (format {:?})", plan.format),
        ));
    }
    if plan.schema_version != StoreConfig::SCHEMA_VERSION {
        return Err(StoreError::corrupt(
            path,
            format!("unsupported schema version {}", plan.schema_version),
        ));
    }
    if let Err(duplicate) = plan.reindex() {
        return Err(StoreError::corrupt(
            path,
            format!("unit id {} appears more than once", duplicate),
        ));
    }
    if let Some(unit) = plan
        .units
        .iter()
        .find(|u| u.last_error.is_some() && u.status != UnitStatus::Failed)
    {
        return Err(StoreError::corrupt(
            path,
            format!("unit {} carries an error but is {}", unit.unit_id, unit.status),
        ));
    }
    Ok(())
}

/// Exclusive advisory lock on `<plan>.lock`, released on drop.
#[derive(Debug)]
pub struct PlanLock {
    file: File,
    path: PathBuf,
}

impl PlanLock {
    fn acquire(plan_path: &Path) -> Result<Self, StoreError> {
        let path = sibling_with_suffix(plan_path, StoreConfig::LOCK_SUFFIX);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| StoreError::io(e, &path))?;

        file.try_lock_exclusive()
            .map_err(|_| StoreError::Locked(plan_path.to_path_buf()))?;
        debug!("Locked {}", path.display());
        Ok(Self { file, path })
    }
}

impl Drop for PlanLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!("Released {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogStats, ExportLayout};
    use tempfile::TempDir;

    fn catalog(ids: &[&str]) -> Catalog {
        Catalog {
            export_root: PathBuf::from("/export"),
            layout: ExportLayout::Tree,
            units: ids
                .iter()
                .map(|id| {
                    ImportUnit::pending(
                        *id,
                        format!("/export/{}.jpg", id),
                        format!("{}.jpg", id),
                        vec!["Album".to_string()],
                    )
                })
                .collect(),
            stats: CatalogStats::default(),
        }
    }

    #[test]
    fn test_create_then_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plan.json");

        let store = PlanStore::create(&path, catalog(&["a", "b"]), false).unwrap();
        assert_eq!(store.plan().plan_version, 1);

        let loaded = PlanStore::load(&path).unwrap();
        assert_eq!(loaded.plan().units.len(), 2);
        assert_eq!(loaded.plan().units[0].unit_id, "a");
        assert_eq!(loaded.plan().summary().pending, 2);
    }

    #[test]
    fn test_create_refuses_existing_plan() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plan.json");
        PlanStore::create(&path, catalog(&["a"]), false).unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        let err = PlanStore::create(&path, catalog(&["b"]), false).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);

        let replaced = PlanStore::create(&path, catalog(&["b"]), true).unwrap();
        assert_eq!(replaced.plan().units[0].unit_id, "b");
    }

    #[test]
    fn test_create_refuses_duplicate_ids_and_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plan.json");

        let err = PlanStore::create(&path, catalog(&["a", "dup", "dup"]), false).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateUnit { ref unit_id } if unit_id == "dup"));
        assert!(!path.exists());

        // Nor does it replace a good plan when overwriting.
        PlanStore::create(&path, catalog(&["a"]), false).unwrap();
        let before = std::fs::read_to_string(&path).unwrap();
        assert!(PlanStore::create(&path, catalog(&["dup", "dup"]), true).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
        assert!(PlanStore::load(&path).is_ok());
    }

    #[test]
    fn test_load_missing_is_not_found_and_creates_nothing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plan.json");

        let err = PlanStore::load(&path).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(!path.exists());
    }

    #[test]
    fn test_load_truncated_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plan.json");
        PlanStore::create(&path, catalog(&["a", "b"]), false).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, &text[..text.len() / 2]).unwrap();

        assert!(matches!(
            PlanStore::load(&path).unwrap_err(),
            StoreError::Corrupt { .. }
        ));
    }

    #[test]
    fn test_load_rejects_duplicate_ids() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plan.json");
        PlanStore::create(&path, catalog(&["a", "b"]), false).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, text.replace("\"unit_id\": \"b\"", "\"unit_id\": \"a\"")).unwrap();

        let err = PlanStore::load(&path).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_update_unit_persists_and_bumps_version() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plan.json");
        let mut store = PlanStore::create(&path, catalog(&["a", "b"]), false).unwrap();

        store.update_unit("a", UnitUpdate::in_progress(1)).unwrap();
        let unit = store.update_unit("a", UnitUpdate::completed(1, "asset-9")).unwrap();
        assert_eq!(unit.status, UnitStatus::Completed);
        assert_eq!(store.plan().plan_version, 3);

        let reloaded = PlanStore::load(&path).unwrap();
        let unit = reloaded.plan().unit("a").unwrap();
        assert_eq!(unit.status, UnitStatus::Completed);
        assert_eq!(unit.attempt_count, 1);
        assert_eq!(unit.destination_asset_id.as_deref(), Some("asset-9"));
        assert_eq!(reloaded.plan().plan_version, 3);
    }

    #[test]
    fn test_update_unit_rejects_bad_changes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plan.json");
        let mut store = PlanStore::create(&path, catalog(&["a"]), false).unwrap();

        assert!(matches!(
            store.update_unit("nope", UnitUpdate::in_progress(1)),
            Err(StoreError::UnknownUnit { .. })
        ));
        assert!(matches!(
            store.update_unit("a", UnitUpdate::completed(1, "x")),
            Err(StoreError::InvalidTransition { .. })
        ));

        store.update_unit("a", UnitUpdate::in_progress(2)).unwrap();
        assert!(matches!(
            store.update_unit("a", UnitUpdate::in_progress(1)),
            Err(StoreError::InvalidTransition { .. })
        ));

        store.update_unit("a", UnitUpdate::completed(2, "x")).unwrap();
        assert!(matches!(
            store.update_unit("a", UnitUpdate::in_progress(3)),
            Err(StoreError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_reset_failed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plan.json");
        let mut store = PlanStore::create(&path, catalog(&["a", "b", "c"]), false).unwrap();
        for id in ["a", "b"] {
            store.update_unit(id, UnitUpdate::in_progress(3)).unwrap();
            store.update_unit(id, UnitUpdate::failed(3, "boom")).unwrap();
        }

        assert_eq!(store.reset_failed(&["b".to_string()]).unwrap(), 1);
        let b = store.plan().unit("b").unwrap();
        assert_eq!(b.status, UnitStatus::Pending);
        assert_eq!(b.attempt_count, 3);
        assert!(b.last_error.is_none());
        assert_eq!(store.plan().unit("a").unwrap().status, UnitStatus::Failed);

        assert_eq!(store.reset_failed(&[]).unwrap(), 1);
        assert_eq!(PlanStore::load(&path).unwrap().plan().summary().failed, 0);
        assert!(store.reset_failed(&["zzz".to_string()]).is_err());
    }

    #[test]
    fn test_scratch_copy_never_writes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plan.json");
        let store = PlanStore::create(&path, catalog(&["a", "b"]), false).unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        let mut scratch = store.into_scratch();
        assert!(!scratch.is_persistent());
        scratch.update_unit("a", UnitUpdate::in_progress(1)).unwrap();
        scratch.update_unit("a", UnitUpdate::failed(1, "boom")).unwrap();
        assert_eq!(scratch.plan().summary().failed, 1);
        assert_eq!(scratch.reset_failed(&[]).unwrap(), 1);
        // Transition rules still apply in memory.
        assert!(scratch.update_unit("b", UnitUpdate::completed(1, "x")).is_err());

        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
        assert!(!tmp.path().join("plan.json.bak").exists());
        assert_eq!(PlanStore::load(&path).unwrap().plan().summary().pending, 2);
    }

    #[test]
    fn test_lock_is_exclusive() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plan.json");
        let store = PlanStore::create(&path, catalog(&["a"]), false).unwrap();
        let other = PlanStore::load(&path).unwrap();

        let guard = store.lock().unwrap();
        assert!(matches!(other.lock(), Err(StoreError::Locked(_))));
        drop(guard);
        assert!(other.lock().is_ok());
    }
}
