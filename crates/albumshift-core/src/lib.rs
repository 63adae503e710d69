//! Albumshift Core - Headless pipeline for moving a photo export into a photo library.
//!
//! The work is split into two phases that share nothing but a plan file:
//!
//! - **plan**: scan an export directory (album tree or flat archive with an
//!   album index) and persist one import unit per asset;
//! - **execute**: walk the open units one at a time, import each through a
//!   `Destination`, and persist every status change before moving on.
//!
//! Any run can be interrupted and restarted; completed work is never repeated.
//!
//! # Example
//!
//! ```rust,ignore
//! use albumshift_core::{
//!     create_plan, CatalogBuilder, DryRunDestination, ExecutionConfig, ResumeController,
//! };
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> albumshift_core::Result<()> {
//!     let plan = Path::new("plan.json");
//!     create_plan(Path::new("/exports/photos"), plan, &CatalogBuilder::new(), false)?;
//!
//!     let mut controller = ResumeController::new(
//!         plan,
//!         ExecutionConfig { dry_run: true, ..ExecutionConfig::default() },
//!         Arc::new(DryRunDestination::new()),
//!     );
//!     let report = controller.run().await?;
//!     println!("{}", report.after);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod destination;
pub mod error;
pub mod execution;
pub mod interrupt;
pub mod metadata;
pub mod plan;

mod planner;

// Re-export commonly used types
pub use catalog::{Catalog, CatalogBuilder, CatalogStats, ExportLayout};
pub use config::{ExecutionConfig, ExecutionDefaults, RetryPolicy};
pub use destination::{
    CommandDestination, Destination, DestinationError, DryRunDestination, ImportOutcome, ImportRequest,
};
pub use error::{BuildError, FailureKind, ImportFailure, MigrateError, Result, StoreError};
pub use execution::{
    request_retry, ExecutionProgress, ResumeController, RunOutcome, RunReport, RunState,
};
pub use interrupt::StopSignal;
pub use metadata::{CaptureTimeSource, ExiftoolCaptureTime, NoCaptureTime};
pub use plan::{GeoLocation, ImportUnit, Plan, PlanStore, PlanSummary, UnitStatus};
pub use planner::{create_plan, PlanCreated};
