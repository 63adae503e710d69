//! Plan data model: import units, their lifecycle, and the plan document.

use crate::catalog::ExportLayout;
use crate::config::StoreConfig;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;

/// Processing status of one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl UnitStatus {
    /// Completed and Skipped units are never attempted again.
    pub fn is_terminal(self) -> bool {
        matches!(self, UnitStatus::Completed | UnitStatus::Skipped)
    }

    /// Transitions the execute phase may perform.
    ///
    /// Failed -> Pending is deliberately absent: only an explicit retry
    /// request (`PlanStore::reset_failed`) performs it.
    pub fn can_transition_to(self, next: UnitStatus) -> bool {
        use UnitStatus::*;
        match (self, next) {
            (Pending, InProgress) => true,
            (InProgress, InProgress | Completed | Failed | Skipped) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UnitStatus::Pending => "pending",
            UnitStatus::InProgress => "in_progress",
            UnitStatus::Completed => "completed",
            UnitStatus::Failed => "failed",
            UnitStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a photo was taken, in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoLocation {
    /// `None` unless both coordinates are finite and in range.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self { latitude, longitude })
    }
}

/// One asset's migration task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportUnit {
    /// Stable id derived from the source path relative to the export root.
    pub unit_id: String,
    /// Absolute path of the source file.
    pub source_path: PathBuf,
    /// Path relative to the export root, `/`-separated.
    pub relative_path: String,
    /// Destination folder segments; empty means the library root.
    pub destination_folder_path: Vec<String>,
    /// Further folders the asset also belongs to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_folder_paths: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoLocation>,
    /// Rights statement carried over from the export.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    pub status: UnitStatus,
    pub attempt_count: u32,
    /// Failure description; present only while the unit is Failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Informational remark from planning or execution (skip reasons, rejected sidecars).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Identifier the destination assigned on import.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_asset_id: Option<String>,
}

impl ImportUnit {
    /// A fresh Pending unit with no descriptive metadata.
    pub fn pending(
        unit_id: impl Into<String>,
        source_path: impl Into<PathBuf>,
        relative_path: impl Into<String>,
        destination_folder_path: Vec<String>,
    ) -> Self {
        Self {
            unit_id: unit_id.into(),
            source_path: source_path.into(),
            relative_path: relative_path.into(),
            destination_folder_path,
            extra_folder_paths: Vec::new(),
            caption: None,
            tags: Vec::new(),
            captured_at: None,
            location: None,
            license: None,
            status: UnitStatus::Pending,
            attempt_count: 0,
            last_error: None,
            note: None,
            destination_asset_id: None,
        }
    }

    /// Turn this unit into a Skipped one carrying the reason.
    pub fn into_skipped(mut self, note: impl Into<String>) -> Self {
        self.status = UnitStatus::Skipped;
        self.note = Some(note.into());
        self
    }

    /// Destination folder rendered as `A/B`, or `(root)`.
    pub fn folder_label(&self) -> String {
        folder_label(&self.destination_folder_path)
    }
}

pub(crate) fn folder_label(segments: &[String]) -> String {
    if segments.is_empty() {
        "(root)".to_string()
    } else {
        segments.join("/")
    }
}

/// Counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl PlanSummary {
    pub fn from_units<'a>(units: impl IntoIterator<Item = &'a ImportUnit>) -> Self {
        let mut summary = Self::default();
        for unit in units {
            summary.total += 1;
            match unit.status {
                UnitStatus::Pending => summary.pending += 1,
                UnitStatus::InProgress => summary.in_progress += 1,
                UnitStatus::Completed => summary.completed += 1,
                UnitStatus::Failed => summary.failed += 1,
                UnitStatus::Skipped => summary.skipped += 1,
            }
        }
        summary
    }

    /// Units not yet resolved in any way.
    pub fn remaining(&self) -> usize {
        self.pending + self.in_progress
    }

    /// Units the resume controller still considers open (everything non-terminal).
    pub fn open(&self) -> usize {
        self.total - self.completed - self.skipped
    }
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} completed, {} failed, {} skipped, {} remaining (of {})",
            self.completed,
            self.failed,
            self.skipped,
            self.remaining(),
            self.total
        )
    }
}

/// The durable, versioned record of every unit and its status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub format: String,
    pub schema_version: u32,
    /// Incremented on every persisted write.
    pub plan_version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub export_root: PathBuf,
    pub layout: ExportLayout,
    /// Units in catalog order.
    pub units: Vec<ImportUnit>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Plan {
    /// Build a version-0 plan; the store bumps the version when it persists it.
    ///
    /// Fails with the first duplicated unit id.
    pub(crate) fn new(
        export_root: PathBuf,
        layout: ExportLayout,
        units: Vec<ImportUnit>,
    ) -> Result<Self, String> {
        let now = Utc::now();
        let mut plan = Self {
            format: StoreConfig::FORMAT_TAG.to_string(),
            schema_version: StoreConfig::SCHEMA_VERSION,
            plan_version: 0,
            created_at: now,
            updated_at: now,
            export_root,
            layout,
            units,
            index: HashMap::new(),
        };
        plan.reindex()?;
        Ok(plan)
    }

    /// Rebuild the id index. Returns the first duplicated id, if any; the
    /// previous index is kept in that case.
    pub(crate) fn reindex(&mut self) -> Result<(), String> {
        let mut index = HashMap::with_capacity(self.units.len());
        for (position, unit) in self.units.iter().enumerate() {
            if index.insert(unit.unit_id.clone(), position).is_some() {
                return Err(unit.unit_id.clone());
            }
        }
        self.index = index;
        Ok(())
    }

    pub fn unit(&self, unit_id: &str) -> Option<&ImportUnit> {
        self.index.get(unit_id).map(|&i| &self.units[i])
    }

    pub(crate) fn unit_mut(&mut self, unit_id: &str) -> Option<&mut ImportUnit> {
        match self.index.get(unit_id) {
            Some(&i) => self.units.get_mut(i),
            None => None,
        }
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary::from_units(&self.units)
    }

    /// Ids of units not in {Completed, Skipped}, in catalog order.
    pub fn open_unit_ids(&self) -> Vec<String> {
        self.units
            .iter()
            .filter(|u| !u.status.is_terminal())
            .map(|u| u.unit_id.clone())
            .collect()
    }

    pub fn failed_units(&self) -> impl Iterator<Item = &ImportUnit> {
        self.units.iter().filter(|u| u.status == UnitStatus::Failed)
    }

    /// Number of non-skipped assets per destination folder.
    pub fn folder_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for unit in self.units.iter().filter(|u| u.status != UnitStatus::Skipped) {
            *counts.entry(unit.folder_label()).or_insert(0) += 1;
            for extra in &unit.extra_folder_paths {
                *counts.entry(folder_label(extra)).or_insert(0) += 1;
            }
        }
        counts
    }
}
