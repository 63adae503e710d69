//! Cooldown guard for a destination that degrades under load.
//!
//! A small circuit breaker. `Closed` lets attempts through; `Cooling` makes
//! the next attempt wait until the cooldown has elapsed, asking the destination
//! to recover once on the way. The guard opens when an attempt fails in an
//! unresponsive way, or when too many units in a row end Failed.

use crate::config::ExecutionDefaults;
use crate::destination::Destination;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Closed,
    Cooling,
}

impl fmt::Display for GuardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardState::Closed => write!(f, "CLOSED"),
            GuardState::Cooling => write!(f, "COOLING"),
        }
    }
}

#[derive(Debug)]
pub struct CooldownGuard {
    cooldown: Duration,
    /// Consecutive Failed units that open the guard; 0 disables.
    streak_threshold: u32,
    failure_streak: u32,
    cooling_until: Option<Instant>,
    cooldowns: u32,
}

impl CooldownGuard {
    /// Cooldowns longer than `ExecutionDefaults::MAX_DURATION` are clamped.
    pub fn new(cooldown: Duration, streak_threshold: u32) -> Self {
        Self {
            cooldown: cooldown.min(ExecutionDefaults::MAX_DURATION),
            streak_threshold,
            failure_streak: 0,
            cooling_until: None,
            cooldowns: 0,
        }
    }

    pub fn state(&self) -> GuardState {
        if self.cooling_until.is_some() {
            GuardState::Cooling
        } else {
            GuardState::Closed
        }
    }

    /// How many cooldowns this guard has started.
    pub fn cooldowns(&self) -> u32 {
        self.cooldowns
    }

    /// Start a cooldown now. A cooldown already running is extended, not stacked.
    pub fn trip(&mut self, reason: &str) {
        let now = Instant::now();
        let until = now.checked_add(self.cooldown).unwrap_or(now);
        if self.cooling_until.is_none() {
            self.cooldowns += 1;
            warn!(
                "Destination looks unresponsive ({}); cooling down for {:?}",
                reason, self.cooldown
            );
        }
        self.cooling_until = Some(until);
    }

    /// A unit ended Failed.
    pub fn record_unit_failed(&mut self) {
        self.failure_streak += 1;
        if self.streak_threshold > 0 && self.failure_streak >= self.streak_threshold {
            self.trip(&format!("{} units failed in a row", self.failure_streak));
            self.failure_streak = 0;
        }
    }

    /// An attempt succeeded; the destination is healthy again.
    pub fn record_success(&mut self) {
        self.failure_streak = 0;
        if self.cooling_until.take().is_some() {
            debug!("Cooldown guard closed after success");
        }
    }

    /// Wait out an active cooldown, then give the destination one chance to recover.
    pub async fn wait_ready(&mut self, destination: &dyn Destination) {
        let Some(until) = self.cooling_until else {
            return;
        };

        let now = Instant::now();
        if until > now {
            info!("Waiting {:?} for the destination to settle", until - now);
            tokio::time::sleep_until(until).await;
        }

        if let Err(e) = destination.recover().await {
            warn!("Recovery of {} failed: {}", destination.name(), e);
        }
        self.cooling_until = None;
        debug!("Cooldown over; guard {}", self.state());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::{DestinationError, ImportOutcome, ImportRequest};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct Recovering {
        recoveries: AtomicU32,
    }

    #[async_trait]
    impl Destination for Recovering {
        fn name(&self) -> &str {
            "recovering"
        }

        async fn import_asset(&self, _: &ImportRequest) -> Result<ImportOutcome, DestinationError> {
            Ok(ImportOutcome::NoResult)
        }

        async fn recover(&self) -> Result<(), DestinationError> {
            self.recoveries.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_trip_waits_full_cooldown_and_recovers_once() {
        let destination = Recovering::default();
        let mut guard = CooldownGuard::new(Duration::from_secs(60), 0);
        guard.trip("timeout");
        assert_eq!(guard.state(), GuardState::Cooling);

        let started = Instant::now();
        guard.wait_ready(&destination).await;
        assert!(started.elapsed() >= Duration::from_secs(60));
        assert_eq!(guard.state(), GuardState::Closed);
        assert_eq!(destination.recoveries.load(Ordering::SeqCst), 1);

        let started = Instant::now();
        guard.wait_ready(&destination).await;
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(destination.recoveries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_cooldown_is_clamped() {
        let destination = Recovering::default();
        let mut guard = CooldownGuard::new(Duration::from_secs(u64::MAX), 0);
        guard.trip("timeout");
        assert_eq!(guard.state(), GuardState::Cooling);

        let started = Instant::now();
        guard.wait_ready(&destination).await;
        let waited = started.elapsed();
        assert!(waited >= ExecutionDefaults::MAX_DURATION);
        assert!(waited < ExecutionDefaults::MAX_DURATION + Duration::from_secs(1));
        assert_eq!(destination.recoveries.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failure_streak_trips() {
        let mut guard = CooldownGuard::new(Duration::from_secs(5), 3);
        guard.record_unit_failed();
        guard.record_unit_failed();
        assert_eq!(guard.state(), GuardState::Closed);
        guard.record_unit_failed();
        assert_eq!(guard.state(), GuardState::Cooling);
        assert_eq!(guard.cooldowns(), 1);
    }

    #[test]
    fn test_success_resets_streak_and_closes() {
        let mut guard = CooldownGuard::new(Duration::from_secs(5), 2);
        guard.record_unit_failed();
        guard.record_success();
        guard.record_unit_failed();
        assert_eq!(guard.state(), GuardState::Closed);

        guard.trip("x");
        guard.record_success();
        assert_eq!(guard.state(), GuardState::Closed);
    }

    #[test]
    fn test_streak_disabled_with_zero() {
        let mut guard = CooldownGuard::new(Duration::from_secs(5), 0);
        for _ in 0..10 {
            guard.record_unit_failed();
        }
        assert_eq!(guard.state(), GuardState::Closed);
    }
}
