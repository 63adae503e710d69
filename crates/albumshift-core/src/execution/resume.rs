//! Run-level control for the execute phase.
//!
//! The controller loads the plan, takes its lock, runs one pass, and reports
//! where the run ended. Starting without a plan is an error and never creates one.
//! A dry run passes over an in-memory copy and leaves the plan document as it was.

use super::driver::{ExecutionDriver, ExecutionProgress, PassEnd};
use crate::config::ExecutionConfig;
use crate::destination::Destination;
use crate::error::{MigrateError, Result, StoreError};
use crate::interrupt::StopSignal;
use crate::plan::{PlanStore, PlanSummary};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    LoadingPlan,
    Loaded,
    Running,
    Finished,
    Interrupted,
    Aborted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::LoadingPlan => "loading plan",
            RunState::Loaded => "loaded",
            RunState::Running => "running",
            RunState::Finished => "finished",
            RunState::Interrupted => "interrupted",
            RunState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// No eligible units were left, or the unit limit was reached.
    Finished,
    /// A stop was requested; the plan is consistent up to the last unit.
    Interrupted,
    /// The plan could not be persisted mid-run.
    Aborted(String),
}

impl RunOutcome {
    /// Process exit code for the outcome.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunOutcome::Finished => 0,
            RunOutcome::Interrupted => 130,
            RunOutcome::Aborted(_) => 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub plan_path: PathBuf,
    pub before: PlanSummary,
    pub after: PlanSummary,
    pub outcome: RunOutcome,
    /// Failed units moved back to Pending before the pass.
    pub reset_failed: usize,
    /// Nothing was written back to the plan.
    pub dry_run: bool,
    pub units_attempted: usize,
    pub destination_calls: u64,
    pub cooldowns: u32,
}

pub struct ResumeController {
    plan_path: PathBuf,
    config: ExecutionConfig,
    destination: Arc<dyn Destination>,
    stop: StopSignal,
    progress: Option<mpsc::Sender<ExecutionProgress>>,
    state: RunState,
}

impl ResumeController {
    pub fn new(plan_path: impl Into<PathBuf>, config: ExecutionConfig, destination: Arc<dyn Destination>) -> Self {
        Self {
            plan_path: plan_path.into(),
            config,
            destination,
            stop: StopSignal::new(),
            progress: None,
            state: RunState::Idle,
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

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Load, lock, and run one pass over the plan.
    ///
    /// Errors before the pass starts (missing or corrupt plan, lock held,
    /// bad configuration) are returned as `Err`. A store failure during the
    /// pass is reported as `RunOutcome::Aborted`.
    pub async fn run(&mut self) -> Result<RunReport> {
        self.config.validate()?;

        self.transition(RunState::LoadingPlan);
        let loaded = open_existing(&self.plan_path)?;
        let _lock = loaded.lock()?;
        let mut store = if self.config.dry_run {
            info!(
                "Dry run: working on an in-memory copy of {}; nothing will be saved",
                self.plan_path.display()
            );
            loaded.into_scratch()
        } else {
            loaded
        };
        self.transition(RunState::Loaded);

        let reset_failed = if self.config.retry_failed {
            store.reset_failed(&[])?
        } else {
            0
        };

        let before = store.plan().summary();
        info!("Before: {}", before);
        if !store.plan().units.is_empty() && before.completed + before.skipped == before.total {
            info!("Every unit is already resolved; nothing to do");
        }

        self.transition(RunState::Running);
        let mut driver = ExecutionDriver::new(&mut store, Arc::clone(&self.destination), &self.config)
            .with_stop_signal(self.stop.clone());
        if let Some(sender) = self.progress.take() {
            driver = driver.with_progress(sender);
        }

        let (outcome, stats) = match driver.run().await {
            Ok(stats) => {
                let outcome = match stats.end {
                    PassEnd::Stopped => RunOutcome::Interrupted,
                    PassEnd::Exhausted | PassEnd::LimitReached => RunOutcome::Finished,
                    PassEnd::Aborted => RunOutcome::Aborted("pass aborted".to_string()),
                };
                (outcome, stats)
            }
            Err(aborted) => {
                error!("Could not persist progress, aborting: {}", aborted.error);
                (RunOutcome::Aborted(aborted.error.to_string()), aborted.stats)
            }
        };

        self.transition(match outcome {
            RunOutcome::Finished => RunState::Finished,
            RunOutcome::Interrupted => RunState::Interrupted,
            RunOutcome::Aborted(_) => RunState::Aborted,
        });

        let after = store.plan().summary();
        match outcome {
            RunOutcome::Finished => info!("After: {}", after),
            _ => warn!("After ({}): {}", self.state, after),
        }
        if !store.is_persistent() {
            info!("Dry run over; {} was not changed", self.plan_path.display());
        }

        Ok(RunReport {
            plan_path: self.plan_path.clone(),
            before,
            after,
            outcome,
            reset_failed,
            dry_run: !store.is_persistent(),
            units_attempted: stats.units_attempted,
            destination_calls: stats.destination_calls,
            cooldowns: stats.cooldowns,
        })
    }

    fn transition(&mut self, next: RunState) {
        tracing::debug!("Run state: {} -> {}", self.state, next);
        self.state = next;
    }
}

/// Load a plan that must already exist. A missing plan maps to `NoPlan`.
pub fn open_existing(plan_path: &Path) -> Result<PlanStore> {
    if !PlanStore::exists(plan_path) {
        return Err(MigrateError::NoPlan(plan_path.to_path_buf()));
    }
    match PlanStore::load(plan_path) {
        Ok(store) => Ok(store),
        Err(StoreError::NotFound(path)) => Err(MigrateError::NoPlan(path)),
        Err(e) => Err(e.into()),
    }
}

/// Explicit retry request: move Failed units (all, or just `unit_ids`) back to Pending.
pub fn request_retry(plan_path: &Path, unit_ids: &[String]) -> Result<usize> {
    let mut store = open_existing(plan_path)?;
    let _lock = store.lock()?;
    Ok(store.reset_failed(unit_ids)?)
}
