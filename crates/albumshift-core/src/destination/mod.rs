//! The destination photo library, seen through one operation.
//!
//! Any destination only has to implement `Destination::import_asset`. The
//! execution side never talks to a destination directly; every call goes
//! through the fault isolator.

mod command;
mod dry_run;

pub use command::CommandDestination;
pub use dry_run::DryRunDestination;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::plan::{GeoLocation, ImportUnit};

/// What the destination is asked to do for one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRequest {
    pub unit_id: String,
    pub source_path: PathBuf,
    pub folder_path: Vec<String>,
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
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
}

impl From<&ImportUnit> for ImportRequest {
    fn from(unit: &ImportUnit) -> Self {
        Self {
            unit_id: unit.unit_id.clone(),
            source_path: unit.source_path.clone(),
            folder_path: unit.destination_folder_path.clone(),
            extra_folder_paths: unit.extra_folder_paths.clone(),
            caption: unit.caption.clone(),
            tags: unit.tags.clone(),
            captured_at: unit.captured_at,
            location: unit.location,
            license: unit.license.clone(),
        }
    }
}

/// A call that returned normally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// The asset is now in the library under this identifier.
    Imported { asset_id: String },
    /// The destination recognised the asset as one it already holds.
    AlreadyPresent,
    /// The call finished but confirmed nothing.
    NoResult,
}

/// A call that raised.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DestinationError {
    #[error("{0}")]
    Fault(String),

    #[error("destination unresponsive: {0}")]
    Unresponsive(String),
}

/// A photo library that can take one asset at a time.
///
/// Implementations are not expected to tolerate concurrent calls.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Import one asset into `request.folder_path`.
    async fn import_asset(&self, request: &ImportRequest) -> Result<ImportOutcome, DestinationError>;

    /// Try to bring a wedged destination back. Called once per cooldown.
    async fn recover(&self) -> Result<(), DestinationError> {
        Ok(())
    }
}
