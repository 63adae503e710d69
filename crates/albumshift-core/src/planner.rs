//! Plan phase: scan an export and persist the resulting plan.

use crate::catalog::{CatalogBuilder, CatalogStats};
use crate::error::{Result, StoreError};
use crate::plan::{PlanStore, PlanSummary};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// What the plan phase produced.
#[derive(Debug, Clone)]
pub struct PlanCreated {
    pub plan_path: PathBuf,
    pub summary: PlanSummary,
    pub stats: CatalogStats,
    /// Assets per destination folder, keyed by `A/B` label.
    pub folders: BTreeMap<String, usize>,
}

/// Build the catalog for `export_root` and write it to `plan_path`.
///
/// An existing plan is only replaced when `overwrite` is set; otherwise the
/// export is not even scanned. Replacing takes the plan's lock first, so a
/// plan that an execute run is working on is never swapped out underneath it.
pub fn create_plan(
    export_root: &Path,
    plan_path: &Path,
    builder: &CatalogBuilder,
    overwrite: bool,
) -> Result<PlanCreated> {
    let exists = PlanStore::exists(plan_path);
    if exists && !overwrite {
        return Err(StoreError::AlreadyExists(plan_path.to_path_buf()).into());
    }
    let _lock = if exists {
        Some(PlanStore::lock_at(plan_path)?)
    } else {
        None
    };

    let catalog = builder.build(export_root)?;
    let stats = catalog.stats.clone();
    let store = PlanStore::create(plan_path, catalog, overwrite)?;

    let folders = store.plan().folder_counts();
    for (folder, count) in &folders {
        info!("  {:<40} {:>6} asset(s)", folder, count);
    }

    Ok(PlanCreated {
        plan_path: plan_path.to_path_buf(),
        summary: store.plan().summary(),
        stats,
        folders,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MigrateError;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_existing_plan_is_kept_without_overwrite() {
        let export = TempDir::new().unwrap();
        fs::create_dir(export.path().join("A")).unwrap();
        fs::write(export.path().join("A/one.jpg"), b"1").unwrap();
        let work = TempDir::new().unwrap();
        let plan_path = work.path().join("plan.json");

        let created = create_plan(export.path(), &plan_path, &CatalogBuilder::new(), false).unwrap();
        assert_eq!(created.summary.total, 1);
        assert_eq!(created.folders.get("A"), Some(&1));
        let original = fs::read(&plan_path).unwrap();

        fs::write(export.path().join("A/two.jpg"), b"2").unwrap();
        let err = create_plan(export.path(), &plan_path, &CatalogBuilder::new(), false).unwrap_err();
        assert!(matches!(err, MigrateError::Store(StoreError::AlreadyExists(_))));
        assert_eq!(fs::read(&plan_path).unwrap(), original);

        let replaced = create_plan(export.path(), &plan_path, &CatalogBuilder::new(), true).unwrap();
        assert_eq!(replaced.summary.total, 2);
    }

    #[test]
    fn test_overwrite_waits_for_running_execute() {
        let export = TempDir::new().unwrap();
        fs::write(export.path().join("one.jpg"), b"1").unwrap();
        let work = TempDir::new().unwrap();
        let plan_path = work.path().join("plan.json");
        create_plan(export.path(), &plan_path, &CatalogBuilder::new(), false).unwrap();
        let original = fs::read(&plan_path).unwrap();

        let running = PlanStore::load(&plan_path).unwrap();
        let lock = running.lock().unwrap();
        fs::write(export.path().join("two.jpg"), b"2").unwrap();

        let err = create_plan(export.path(), &plan_path, &CatalogBuilder::new(), true).unwrap_err();
        assert!(matches!(err, MigrateError::Store(StoreError::Locked(_))));
        assert_eq!(err.exit_code(), 2);
        assert_eq!(fs::read(&plan_path).unwrap(), original);

        drop(lock);
        let replaced = create_plan(export.path(), &plan_path, &CatalogBuilder::new(), true).unwrap();
        assert_eq!(replaced.summary.total, 2);
    }

    #[test]
    fn test_bad_export_root_writes_nothing() {
        let work = TempDir::new().unwrap();
        let plan_path = work.path().join("plan.json");
        let err = create_plan(
            &work.path().join("missing"),
            &plan_path,
            &CatalogBuilder::new(),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, MigrateError::InvalidExportRoot(_)));
        assert!(!plan_path.exists());
    }
}
