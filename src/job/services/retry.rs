//! Automatic retry policy.

use std::time::Duration;

use crate::config::{MAX_AUTOMATIC_RETRIES_CAP, RunnerConfig};
use crate::job::domain::{Job, JobStatus};

/// Decides whether a failed attempt is re-queued automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    enabled: bool,
    max_automatic_retries: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy. `max_automatic_retries` is clamped to
    /// [`MAX_AUTOMATIC_RETRIES_CAP`].
    #[must_use]
    pub fn new(enabled: bool, max_automatic_retries: u32, delay: Duration) -> Self {
        Self {
            enabled,
            max_automatic_retries: max_automatic_retries.min(MAX_AUTOMATIC_RETRIES_CAP),
            delay,
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            max_automatic_retries: 0,
            delay: Duration::ZERO,
        }
    }

    /// Builds the policy from a configuration snapshot.
    #[must_use]
    pub fn from_config(config: &RunnerConfig) -> Self {
        Self::new(
            config.auto_retry,
            config.max_automatic_retries,
            config.retry_delay,
        )
    }

    /// Returns whether automatic retries are enabled.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the delay before a retried attempt starts.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Returns whether `job`, having just failed, should be re-queued.
    ///
    /// The retry count is shared with manual retries, so a job already
    /// retried by hand is not retried again automatically.
    #[must_use]
    pub fn should_retry(&self, job: &Job) -> bool {
        self.enabled
            && job.status() == JobStatus::Failed
            && job.retry_count() < self.max_automatic_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RunnerConfig::default())
    }
}
