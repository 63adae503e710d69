//! Destination that imports nothing and reports success.

use super::{Destination, DestinationError, ImportOutcome, ImportRequest};
use crate::plan::folder_label;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

#[derive(Debug, Default)]
pub struct DryRunDestination {
    calls: AtomicU64,
}

impl DryRunDestination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Destination for DryRunDestination {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn import_asset(&self, request: &ImportRequest) -> Result<ImportOutcome, DestinationError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "[dry run] would import {} into {}",
            request.source_path.display(),
            folder_label(&request.folder_path)
        );
        Ok(ImportOutcome::Imported {
            asset_id: format!("dry-run-{}-{}", n, request.unit_id),
        })
    }
}
