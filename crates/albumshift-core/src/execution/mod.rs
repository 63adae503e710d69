//! Execute phase: drive the plan's open units into the destination.
//!
//! - `isolator`: one bounded, normalized destination call plus the retry verdict
//! - `cooldown`: pause-and-recover guard for a degraded destination
//! - `driver`: one sequential pass over eligible units
//! - `resume`: load/lock/run/report around a pass

mod cooldown;
mod driver;
mod isolator;
mod resume;

pub use cooldown::{CooldownGuard, GuardState};
pub use driver::{ExecutionDriver, ExecutionProgress, PassAborted, PassEnd, PassStats, ALREADY_PRESENT_NOTE};
pub use isolator::{AttemptSuccess, FaultIsolator, Verdict};
pub use resume::{open_existing, request_retry, ResumeController, RunOutcome, RunReport, RunState};
