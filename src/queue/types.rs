//! Queue configuration and error definitions.

use std::time::Duration;
use thiserror::Error;

/// Errors produced by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Scheduler parameters rejected at construction time.
    #[error("Invalid queue configuration: {0}")]
    InvalidConfig(String),

    /// No pending task matched the predicate.
    #[error("Specified task was not found")]
    TaskNotFound,

    /// The task was removed from the queue before it started.
    #[error("Task was cancelled before it started")]
    Cancelled,

    /// The task body panicked while running.
    #[error("Task panicked during execution")]
    Panicked,
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Throttle and concurrency limits for a [`RateLimitedScheduler`].
///
/// [`RateLimitedScheduler`]: crate::queue::RateLimitedScheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Length of the sliding throttle window.
    pub interval: Duration,

    /// Maximum task starts inside one window (a count, not a duration).
    pub max_invocations_per_interval: usize,

    /// Maximum simultaneously running tasks. `None` means unbounded.
    pub max_concurrency: Option<usize>,
}

impl SchedulerConfig {
    /// Check the limits are all positive.
    pub fn validate(&self) -> QueueResult<()> {
        if self.max_invocations_per_interval == 0 {
            return Err(QueueError::InvalidConfig(
                "must allow at least one invocation per interval".to_string(),
            ));
        }
        if self.interval.is_zero() {
            return Err(QueueError::InvalidConfig(
                "invocation interval must be positive".to_string(),
            ));
        }
        if self.max_concurrency == Some(0) {
            return Err(QueueError::InvalidConfig(
                "max concurrency must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(200),
            max_invocations_per_interval: 3,
            max_concurrency: Some(10),
        }
    }
}
