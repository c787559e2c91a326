//! Capped exponential retry delay

use std::time::Duration;

use contracts::RetryPolicy;

/// Retry delay generator
///
/// Doubles from the base delay for `growth_steps` consecutive failures, never
/// exceeds the ceiling, and never gives up: past the last step every retry
/// waits the ceiling.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    failures: u32,
}

impl Backoff {
    /// Create from a policy
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            failures: 0,
        }
    }

    /// Register a failure and return the delay before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let exponent = (self.failures - 1).min(self.policy.growth_steps).min(31);
        self.policy
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.policy.max_delay)
    }

    /// Forget previous failures after a success
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Consecutive failures so far
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(base: u64, max: u64, steps: u32) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_secs(base),
            max_delay: Duration::from_secs(max),
            growth_steps: steps,
        }
    }

    #[test]
    fn test_doubles_then_caps() {
        let mut backoff = Backoff::new(policy(10, 60, 5));
        let delays: Vec<u64> = (0..7).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![10, 20, 40, 60, 60, 60, 60]);
    }

    #[test]
    fn test_growth_steps_limit_doubling() {
        let mut backoff = Backoff::new(policy(1, 1000, 2));
        let delays: Vec<u64> = (0..5).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 4, 4]);
    }

    #[test]
    fn test_reset() {
        let mut backoff = Backoff::new(policy(2, 30, 5));
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.failures(), 2);
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_never_overflows() {
        let mut backoff = Backoff::new(policy(u64::MAX / 4, u64::MAX / 2, u32::MAX));
        for _ in 0..100 {
            assert!(backoff.next_delay() <= Duration::from_secs(u64::MAX / 2));
        }
    }
}
