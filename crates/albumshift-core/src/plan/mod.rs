//! The plan: data model and durable store.

mod store;
mod types;

pub use store::{PlanLock, PlanStore, UnitUpdate};
pub(crate) use types::folder_label;
pub use types::{GeoLocation, ImportUnit, Plan, PlanSummary, UnitStatus};
