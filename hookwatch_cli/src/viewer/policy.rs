//! Reconnection backoff schedule

use std::time::Duration;

/// Deterministic exponential backoff with an attempt budget.
///
/// `next_delay(attempt) = min(base_delay * 2^attempt, max_delay)`; no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectionPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectionPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

impl ReconnectionPolicy {
    /// Delay before reconnect attempt `attempt` (0-based)
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Whether attempt `attempt` is still within the budget
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let policy = ReconnectionPolicy::default();
        let delays: Vec<u64> = (0..10).map(|a| policy.next_delay(a).as_secs()).collect();

        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30, 30, 30, 30]);
    }

    #[test]
    fn test_attempt_budget() {
        let policy = ReconnectionPolicy::default();
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(9));
        assert!(!policy.should_retry(10));
    }

    #[test]
    fn test_large_attempts_saturate() {
        let policy = ReconnectionPolicy::default();
        assert_eq!(policy.next_delay(31), Duration::from_secs(30));
        assert_eq!(policy.next_delay(u32::MAX), Duration::from_secs(30));
    }
}
