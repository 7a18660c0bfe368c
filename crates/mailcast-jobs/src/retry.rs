//! Retry policies for failed jobs.
//!
//! A policy is attached to every job record when it is enqueued, so the
//! backend can decide on retries without knowing the job type.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Retry strategy enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// No retry.
    None,
    /// Fixed delay between retries.
    Fixed,
    /// Exponential backoff with optional jitter.
    Exponential,
    /// Linear backoff.
    Linear,
}

/// Retry policy configuration.
///
/// `max_attempts` counts the first execution, so `max_attempts = 3` means
/// one initial attempt followed by at most two retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retry strategy.
    pub strategy: RetryStrategy,

    /// Total number of attempts, including the first one.
    pub max_attempts: u32,

    /// Initial delay in milliseconds.
    pub initial_delay_ms: u64,

    /// Maximum delay in milliseconds.
    pub max_delay_ms: u64,

    /// Backoff multiplier (exponential only).
    pub multiplier: f64,

    /// Jitter factor (0.0 disables jitter).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(3)
    }
}

impl RetryPolicy {
    /// Creates a policy that never retries.
    pub fn none() -> Self {
        Self {
            strategy: RetryStrategy::None,
            max_attempts: 1,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    /// Creates a fixed backoff policy.
    pub fn fixed(max_attempts: u32, backoff: Duration) -> Self {
        let delay_ms = duration_ms(backoff);
        Self {
            strategy: RetryStrategy::Fixed,
            max_attempts: max_attempts.max(1),
            initial_delay_ms: delay_ms,
            max_delay_ms: delay_ms,
            multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    /// Creates an exponential backoff policy starting at one second.
    pub fn exponential(max_attempts: u32) -> Self {
        Self {
            strategy: RetryStrategy::Exponential,
            max_attempts: max_attempts.max(1),
            initial_delay_ms: 1_000,
            max_delay_ms: 3_600_000,
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }

    /// Creates a linear backoff policy.
    pub fn linear(max_attempts: u32, increment: Duration) -> Self {
        let increment_ms = duration_ms(increment);
        Self {
            strategy: RetryStrategy::Linear,
            max_attempts: max_attempts.max(1),
            initial_delay_ms: increment_ms,
            max_delay_ms: increment_ms.saturating_mul(u64::from(max_attempts)),
            multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = duration_ms(delay);
        self
    }

    /// Disables jitter.
    pub fn without_jitter(mut self) -> Self {
        self.jitter_factor = 0.0;
        self
    }

    /// Returns true if a job that just failed its `attempt`-th execution
    /// (1-based) may run again.
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.strategy != RetryStrategy::None && attempt < self.max_attempts
    }

    /// Delay to wait after the `attempt`-th execution failed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.strategy == RetryStrategy::None {
            return Duration::ZERO;
        }

        let base_delay = match self.strategy {
            RetryStrategy::None => 0,
            RetryStrategy::Fixed => self.initial_delay_ms,
            RetryStrategy::Exponential => {
                let exp = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let delay = (self.initial_delay_ms as f64 * self.multiplier.powi(exp)) as u64;
                delay
            }
            RetryStrategy::Linear => self.initial_delay_ms.saturating_mul(u64::from(attempt)),
        };

        let capped = base_delay.min(self.max_delay_ms);

        if self.jitter_factor <= 0.0 {
            return Duration::from_millis(capped);
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let range = (capped as f64 * self.jitter_factor.clamp(0.0, 1.0)) as u64;
        Duration::from_millis(capped.saturating_add(jitter(range)).saturating_sub(range / 2))
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn jitter(range: u64) -> u64 {
    if range == 0 {
        return 0;
    }
    #[allow(clippy::cast_possible_truncation)]
    let random = Uuid::new_v4().as_u128() as u64;
    random % range
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_retry() {
        let policy = RetryPolicy::none();
        assert!(!policy.should_retry(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::ZERO);
    }

    #[test]
    fn test_fixed_allows_two_retries_for_three_attempts() {
        let policy = RetryPolicy::fixed(3, Duration::from_secs(60));

        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));

        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(60));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(60));
    }

    #[test]
    fn test_fixed_zero_attempts_is_clamped() {
        let policy = RetryPolicy::fixed(0, Duration::from_secs(1));
        assert_eq!(policy.max_attempts, 1);
        assert!(!policy.should_retry(1));
    }

    #[test]
    fn test_exponential_backoff() {
        let policy = RetryPolicy::exponential(4).without_jitter();

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(4000));
    }

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy::linear(3, Duration::from_secs(1));

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(3000));
    }

    #[test]
    fn test_max_delay_cap() {
        let policy = RetryPolicy::exponential(10)
            .with_max_delay(Duration::from_secs(10))
            .without_jitter();

        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_stays_within_range() {
        let policy = RetryPolicy::exponential(3);
        for _ in 0..50 {
            let delay = policy.delay_for_attempt(1);
            assert!(delay >= Duration::from_millis(950));
            assert!(delay <= Duration::from_millis(1050));
        }
    }
}
