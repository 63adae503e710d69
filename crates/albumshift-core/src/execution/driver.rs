//! One pass over the open units of a plan.

use super::cooldown::CooldownGuard;
use super::isolator::{AttemptSuccess, FaultIsolator, Verdict};
use crate::config::ExecutionConfig;
use crate::destination::{Destination, ImportRequest};
use crate::error::StoreError;
use crate::interrupt::StopSignal;
use crate::plan::{PlanStore, UnitStatus, UnitUpdate};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Note recorded on units the destination already held.
pub const ALREADY_PRESENT_NOTE: &str = "already present in destination";

/// Progress snapshot sent after each unit resolves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionProgress {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub remaining: usize,
    pub total: usize,
    /// Export-relative path of the unit that just resolved.
    pub current: String,
    pub current_status: UnitStatus,
}

/// Why a pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassEnd {
    /// Every eligible unit was resolved.
    Exhausted,
    /// A stop was requested. A unit caught between retries stays InProgress.
    Stopped,
    /// The configured unit limit was reached.
    LimitReached,
    /// The store refused a write.
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassStats {
    pub end: PassEnd,
    pub units_attempted: usize,
    pub destination_calls: u64,
    pub cooldowns: u32,
}

/// A pass cut short by a store error, with the work done up to that point.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct PassAborted {
    pub error: StoreError,
    pub stats: PassStats,
}

/// Walks eligible units in catalog order and resolves each one before moving on.
///
/// Every status change is persisted through the store before the next step, so
/// an interruption at any point leaves the plan describing what really happened.
pub struct ExecutionDriver<'a> {
    store: &'a mut PlanStore,
    isolator: FaultIsolator,
    guard: CooldownGuard,
    stop: StopSignal,
    progress: Option<mpsc::Sender<ExecutionProgress>>,
    max_units: Option<usize>,
}

impl<'a> ExecutionDriver<'a> {
    pub fn new(store: &'a mut PlanStore, destination: Arc<dyn Destination>, config: &ExecutionConfig) -> Self {
        Self {
            store,
            isolator: FaultIsolator::new(destination, config.attempt_timeout, config.retry.clone()),
            guard: CooldownGuard::new(config.cooldown, config.failure_streak_threshold),
            stop: StopSignal::new(),
            progress: None,
            max_units: config.max_units,
        }
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_progress(mut self, sender: mpsc::Sender<ExecutionProgress>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Run the pass. A store error ends it immediately; the unit being worked
    /// on keeps whatever status was last persisted.
    pub async fn run(mut self) -> Result<PassStats, PassAborted> {
        let eligible: Vec<String> = self
            .store
            .plan()
            .units
            .iter()
            .filter(|u| matches!(u.status, UnitStatus::Pending | UnitStatus::InProgress))
            .map(|u| u.unit_id.clone())
            .collect();

        let held_back = self.store.plan().failed_units().count();
        if held_back > 0 {
            info!(
                "{} failed unit(s) are left alone; use --retry-failed or `retry` to attempt them again",
                held_back
            );
        }
        info!("{} unit(s) to import via {}", eligible.len(), self.isolator.destination().name());

        let mut end = PassEnd::Exhausted;
        let mut attempted = 0usize;
        for unit_id in &eligible {
            if self.stop.is_requested() {
                info!("Stop requested; ending the pass before the next unit");
                end = PassEnd::Stopped;
                break;
            }
            if self.max_units.is_some_and(|limit| attempted >= limit) {
                info!("Unit limit of {} reached", attempted);
                end = PassEnd::LimitReached;
                break;
            }

            attempted += 1;
            match self.process_unit(unit_id).await {
                Ok(Some(status)) => self.report_progress(unit_id, status),
                Ok(None) => {
                    info!("Stop requested; ending the pass between attempts");
                    end = PassEnd::Stopped;
                    break;
                }
                Err(error) => {
                    warn!(unit_id = %unit_id, "Pass aborted: {}", error);
                    return Err(PassAborted {
                        error,
                        stats: self.stats(PassEnd::Aborted, attempted),
                    });
                }
            }
        }

        Ok(self.stats(end, attempted))
    }

    fn stats(&self, end: PassEnd, units_attempted: usize) -> PassStats {
        PassStats {
            end,
            units_attempted,
            destination_calls: self.isolator.calls(),
            cooldowns: self.guard.cooldowns(),
        }
    }

    /// Drive one unit to Completed, Skipped, or Failed.
    ///
    /// Returns `None` when a stop arrives between two attempts; the unit is
    /// then left InProgress with its attempt count persisted.
    async fn process_unit(&mut self, unit_id: &str) -> Result<Option<UnitStatus>, StoreError> {
        let unit = self
            .store
            .plan()
            .unit(unit_id)
            .cloned()
            .ok_or_else(|| StoreError::UnknownUnit {
                unit_id: unit_id.to_string(),
            })?;

        if unit.status == UnitStatus::InProgress {
            warn!(
                unit_id = %unit.unit_id,
                attempt = unit.attempt_count,
                "{} was interrupted during an earlier run; the destination may already hold it",
                unit.relative_path
            );
        }

        let request = ImportRequest::from(&unit);
        let mut attempt_count = unit.attempt_count;
        let mut attempts_this_pass = 0u32;

        loop {
            self.guard.wait_ready(self.isolator.destination()).await;
            if attempts_this_pass > 0 && self.stop.is_requested() {
                return Ok(None);
            }

            attempt_count += 1;
            attempts_this_pass += 1;
            self.store
                .update_unit(unit_id, UnitUpdate::in_progress(attempt_count))?;
            debug!(
                unit_id = %unit.unit_id,
                attempt = attempt_count,
                "Importing {} into {}",
                unit.relative_path,
                unit.folder_label()
            );

            match self.isolator.attempt(&request).await {
                Ok(AttemptSuccess::Imported { asset_id }) => {
                    self.guard.record_success();
                    self.store
                        .update_unit(unit_id, UnitUpdate::completed(attempt_count, asset_id))?;
                    info!("Imported {} into {}", unit.relative_path, unit.folder_label());
                    return Ok(Some(UnitStatus::Completed));
                }
                Ok(AttemptSuccess::AlreadyPresent) => {
                    self.guard.record_success();
                    self.store
                        .update_unit(unit_id, UnitUpdate::skipped(attempt_count, ALREADY_PRESENT_NOTE))?;
                    info!("{} is already in the destination", unit.relative_path);
                    return Ok(Some(UnitStatus::Skipped));
                }
                Err(failure) => {
                    // The helper receives the same Ctrl-C; a failure during a stop is not recorded.
                    if self.stop.is_requested() {
                        info!(
                            unit_id = %unit.unit_id,
                            attempt = attempt_count,
                            "{} stays in progress: {}",
                            unit.relative_path,
                            failure
                        );
                        return Ok(None);
                    }
                    if failure.kind.is_unresponsive() {
                        self.guard.trip(failure.kind.as_str());
                    }
                    match self.isolator.verdict(&failure, attempts_this_pass) {
                        Verdict::RetryAfter(delay) => tokio::time::sleep(delay).await,
                        Verdict::GiveUp => {
                            self.store
                                .update_unit(unit_id, UnitUpdate::failed(attempt_count, failure.to_string()))?;
                            self.guard.record_unit_failed();
                            warn!(
                                unit_id = %unit.unit_id,
                                attempt = attempt_count,
                                kind = %failure.kind,
                                "Giving up on {} after {} attempt(s) this run: {}",
                                unit.relative_path,
                                attempts_this_pass,
                                failure.message
                            );
                            return Ok(Some(UnitStatus::Failed));
                        }
                    }
                }
            }
        }
    }

    fn report_progress(&self, unit_id: &str, status: UnitStatus) {
        let summary = self.store.plan().summary();
        info!(
            "Progress: {} completed, {} failed, {} skipped, {} remaining",
            summary.completed,
            summary.failed,
            summary.skipped,
            summary.remaining()
        );

        let Some(sender) = &self.progress else {
            return;
        };
        let current = self
            .store
            .plan()
            .unit(unit_id)
            .map(|u| u.relative_path.clone())
            .unwrap_or_default();
        let update = ExecutionProgress {
            completed: summary.completed,
            failed: summary.failed,
            skipped: summary.skipped,
            remaining: summary.remaining(),
            total: summary.total,
            current,
            current_status: status,
        };
        // Progress is advisory; a slow or absent listener never holds up the pass.
        if let Err(e) = sender.try_send(update) {
            debug!("Progress update dropped: {}", e);
        }
    }
}
