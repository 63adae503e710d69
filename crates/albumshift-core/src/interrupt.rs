//! Cooperative stop requests for the execute phase.
//!
//! The driver checks the signal before each unit and between the attempts of
//! one, never while an attempt is running. A unit caught between retries is
//! left InProgress and picked up again by the next run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag raised by the front end (e.g. on Ctrl-C).
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    requested: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the running pass to stop after the current attempt.
    pub fn request_stop(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}
