//! Centralized configuration for albumshift.
//!
//! Named constants for catalog building and plan storage, plus the tunable
//! execution settings (retry budget, time budget, cooldown) that operators
//! override from the command line.

use crate::error::{MigrateError, Result};
use rand::Rng;
use std::time::Duration;

/// Catalog-building constants.
pub struct CatalogConfig;

impl CatalogConfig {
    /// Extensions treated as importable media (lowercase, no dot).
    pub const MEDIA_EXTENSIONS: &'static [&'static str] = &[
        "jpg", "jpeg", "png", "gif", "heic", "heif", "tif", "tiff", "webp", "dng", "cr2", "nef",
        "arw", "mov", "mp4", "m4v", "avi",
    ];
    /// Album index file that marks a flat archive export.
    pub const ALBUMS_INDEX_FILENAME: &'static str = "albums.json";
    /// Suffix of per-asset sidecar files in tree exports.
    pub const SIDECAR_SUFFIX: &'static str = ".json";
    /// Album name used when an album has no usable title.
    pub const UNTITLED_ALBUM: &'static str = "Untitled";
    /// Hex characters kept from the path hash for a unit id.
    pub const UNIT_ID_HEX_LEN: usize = 16;
    /// Archive entries known to be broken in upstream exports.
    pub const IGNORED_FILENAMES: &'static [&'static str] = &["r-035_1451016205_o.jpg"];
}

/// Plan storage constants.
pub struct StoreConfig;

impl StoreConfig {
    pub const FORMAT_TAG: &'static str = "albumshift-plan";
    pub const SCHEMA_VERSION: u32 = 1;
    pub const LOCK_SUFFIX: &'static str = "lock";
    pub const BACKUP_SUFFIX: &'static str = "bak";
}

/// Defaults for the execute phase.
pub struct ExecutionDefaults;

impl ExecutionDefaults {
    pub const MAX_ATTEMPTS: u32 = 3;
    pub const BASE_BACKOFF: Duration = Duration::from_secs(2);
    pub const MAX_BACKOFF: Duration = Duration::from_secs(30);
    pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(120);
    pub const COOLDOWN: Duration = Duration::from_secs(60);
    pub const FAILURE_STREAK_THRESHOLD: u32 = 5;
    pub const PROGRESS_CHANNEL_CAPACITY: usize = 64;
    /// Ceiling for every configured wait (timeouts, backoff, cooldown).
    pub const MAX_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);
}

/// Retry budget and backoff for a single unit.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts per unit and pass (including the first one).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// Exponential base (2.0 doubles the delay each retry).
    pub exponential_base: f64,
    /// Whether to randomize delays by a factor in 0.5..1.5.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: ExecutionDefaults::MAX_ATTEMPTS,
            base_delay: ExecutionDefaults::BASE_BACKOFF,
            max_delay: ExecutionDefaults::MAX_BACKOFF,
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30) as i32;
        let delay_secs = self.base_delay.as_secs_f64() * self.exponential_base.powi(exponent);
        let capped_secs = delay_secs.min(self.max_delay.as_secs_f64());

        let final_secs = if self.jitter {
            let factor = rand::rng().random_range(0.5..1.5);
            (capped_secs * factor).min(self.max_delay.as_secs_f64())
        } else {
            capped_secs
        };

        Duration::try_from_secs_f64(final_secs).unwrap_or(self.max_delay)
    }
}

/// Settings for one execute-phase run.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub retry: RetryPolicy,
    /// Time budget for a single import attempt.
    pub attempt_timeout: Duration,
    /// Pause after the destination looks unresponsive.
    pub cooldown: Duration,
    /// Consecutive Failed units that also trigger a cooldown. 0 disables.
    pub failure_streak_threshold: u32,
    /// Move Failed units back to Pending before running.
    pub retry_failed: bool,
    /// Stop after attempting this many units.
    pub max_units: Option<usize>,
    /// Run against an in-memory copy of the plan; nothing is written back.
    pub dry_run: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            attempt_timeout: ExecutionDefaults::ATTEMPT_TIMEOUT,
            cooldown: ExecutionDefaults::COOLDOWN,
            failure_streak_threshold: ExecutionDefaults::FAILURE_STREAK_THRESHOLD,
            retry_failed: false,
            max_units: None,
            dry_run: false,
        }
    }
}

impl ExecutionConfig {
    /// Reject settings that would make the run meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(MigrateError::Config {
                field: "max_attempts".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.attempt_timeout.is_zero() {
            return Err(MigrateError::Config {
                field: "attempt_timeout".into(),
                message: "must be greater than zero".into(),
            });
        }
        if self.retry.max_delay < self.retry.base_delay {
            return Err(MigrateError::Config {
                field: "max_delay".into(),
                message: "must not be below the base backoff".into(),
            });
        }
        for (field, value) in [
            ("attempt_timeout", self.attempt_timeout),
            ("cooldown", self.cooldown),
            ("base_delay", self.retry.base_delay),
            ("max_delay", self.retry.max_delay),
        ] {
            if value > ExecutionDefaults::MAX_DURATION {
                return Err(MigrateError::Config {
                    field: field.into(),
                    message: format!(
                        "{}s is above the limit of {}s",
                        value.as_secs(),
                        ExecutionDefaults::MAX_DURATION.as_secs()
                    ),
                });
            }
        }
        Ok(())
    }
}
