//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Calculate exponential backoff delay with jitter.
///
/// Attempt 1 waits `base_ms`, each later attempt multiplies the delay by
/// `factor`, capped at `max_ms`, plus up to 10% jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64, factor: f64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
    let delay_ms = (base_ms as f64 * factor.max(1.0).powi(exponent)).min(max_ms as f64);
    let capped_delay = delay_ms as u64;

    // Apply jitter (0 to 10% of the delay)
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

/// Retry budget and delay curve for polling operations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub retries: u32,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub factor: f64,
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.min_delay_ms, self.max_delay_ms, self.factor)
    }

    /// Whether another retry is allowed after `attempt` retries.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt < self.retries
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            retries: 12,
            min_delay_ms: 2_000,
            max_delay_ms: 60_000,
            factor: 1.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        assert_eq!(calculate_backoff(0, 100, 2000, 2.0), Duration::ZERO);

        let b1 = calculate_backoff(1, 100, 2000, 2.0);
        assert!(b1.as_millis() >= 100 && b1.as_millis() < 110);

        let b2 = calculate_backoff(2, 100, 2000, 2.0);
        assert!(b2.as_millis() >= 200);

        let max = calculate_backoff(10, 100, 1000, 2.0);
        assert!(max.as_millis() >= 1000 && max.as_millis() < 1100);
    }

    #[test]
    fn test_fractional_factor() {
        let policy = BackoffPolicy::default();
        let third = policy.delay(3);
        // 2000 * 1.5^2
        assert!(third.as_millis() >= 4500 && third.as_millis() < 4950);
        assert!(policy.delay(40).as_millis() < 66_000);
    }

    #[test]
    fn test_retry_budget() {
        let policy = BackoffPolicy {
            retries: 2,
            ..BackoffPolicy::default()
        };
        assert!(policy.allows(0));
        assert!(policy.allows(1));
        assert!(!policy.allows(2));
    }
}
