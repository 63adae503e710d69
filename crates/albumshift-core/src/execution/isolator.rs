//! Fault isolation around single destination calls.
//!
//! Every call to the destination goes through `FaultIsolator::attempt`. Whatever
//! the destination does (returns an error, returns nothing useful, hangs, or
//! panics) comes back as one `ImportFailure`, so the caller only ever handles
//! one failure shape.

use crate::config::RetryPolicy;
use crate::destination::{Destination, DestinationError, ImportOutcome, ImportRequest};
use crate::error::{FailureKind, ImportFailure};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A call that ended in a usable answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptSuccess {
    Imported { asset_id: String },
    AlreadyPresent,
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Try the same unit again after waiting this long.
    RetryAfter(Duration),
    /// The unit has used up its attempts for this pass.
    GiveUp,
}

pub struct FaultIsolator {
    destination: Arc<dyn Destination>,
    attempt_timeout: Duration,
    retry: RetryPolicy,
    calls: u64,
}

impl FaultIsolator {
    pub fn new(destination: Arc<dyn Destination>, attempt_timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            destination,
            attempt_timeout,
            retry,
            calls: 0,
        }
    }

    pub fn destination(&self) -> &dyn Destination {
        self.destination.as_ref()
    }

    /// Number of times the destination was actually called.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// Run one attempt for `request`, bounded by the attempt timeout.
    ///
    /// The call runs on its own task: a panic inside the destination becomes a
    /// fault, and a call that outlives its budget is cancelled.
    pub async fn attempt(&mut self, request: &ImportRequest) -> Result<AttemptSuccess, ImportFailure> {
        if !request.source_path.is_file() {
            return Err(ImportFailure::new(
                FailureKind::SourceMissing,
                format!("{} no longer exists", request.source_path.display()),
            ));
        }

        self.calls += 1;
        let destination = Arc::clone(&self.destination);
        let owned = request.clone();
        let mut call = tokio::spawn(async move { destination.import_asset(&owned).await });

        match tokio::time::timeout(self.attempt_timeout, &mut call).await {
            Err(_) => {
                call.abort();
                Err(ImportFailure::timeout(self.attempt_timeout))
            }
            Ok(Err(join_error)) => {
                let message = if join_error.is_panic() {
                    format!("destination panicked: {}", panic_message(join_error.into_panic()))
                } else {
                    "destination call was cancelled".to_string()
                };
                Err(ImportFailure::new(FailureKind::Fault, message))
            }
            Ok(Ok(result)) => normalize(result),
        }
    }

    /// Decide whether `failure` on the given attempt of this pass earns another try.
    pub fn verdict(&self, failure: &ImportFailure, attempts_this_pass: u32) -> Verdict {
        if !failure.kind.is_retryable() {
            debug!("{} is not retryable", failure.kind);
            return Verdict::GiveUp;
        }
        if attempts_this_pass >= self.retry.max_attempts {
            return Verdict::GiveUp;
        }
        let delay = self.retry.backoff_after(attempts_this_pass);
        warn!(
            "Attempt {}/{} failed ({}); retrying in {:?}",
            attempts_this_pass, self.retry.max_attempts, failure, delay
        );
        Verdict::RetryAfter(delay)
    }
}

fn normalize(result: Result<ImportOutcome, DestinationError>) -> Result<AttemptSuccess, ImportFailure> {
    match result {
        Ok(ImportOutcome::Imported { asset_id }) => Ok(AttemptSuccess::Imported { asset_id }),
        Ok(ImportOutcome::AlreadyPresent) => Ok(AttemptSuccess::AlreadyPresent),
        Ok(ImportOutcome::NoResult) => Err(ImportFailure::new(
            FailureKind::NoResult,
            "destination returned without confirming the import",
        )),
        Err(DestinationError::Fault(message)) => Err(ImportFailure::new(FailureKind::Fault, message)),
        Err(DestinationError::Unresponsive(message)) => {
            Err(ImportFailure::new(FailureKind::Unresponsive, message))
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
