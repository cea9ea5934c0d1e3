use std::time::Duration;

use crate::config::GovernanceConfig;

/// Bounded retry schedule for optimistic capacity updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentionPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ContentionPolicy {
    fn default() -> Self {
        Self::from_config(&GovernanceConfig::default())
    }
}

impl ContentionPolicy {
    pub fn from_config(config: &GovernanceConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            initial_backoff: Duration::from_millis(config.backoff_ms),
            max_backoff: Duration::from_millis(50),
        }
    }

    /// Retry immediately; used by tests that race threads on purpose.
    pub fn without_backoff(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Exponential delay before retry `attempt` (0-indexed), capped at `max_backoff`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    pub fn is_exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_capped() {
        let policy = ContentionPolicy {
            max_attempts: 8,
            initial_backoff: Duration::from_millis(4),
            max_backoff: Duration::from_millis(20),
        };
        assert_eq!(policy.backoff_delay(0), Duration::from_millis(4));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(8));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(16));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(20));
        assert_eq!(policy.backoff_delay(40), Duration::from_millis(20));
    }

    #[test]
    fn exhaustion_follows_attempt_budget() {
        let policy = ContentionPolicy::without_backoff(3);
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
    }
}
