//! Queue configuration.

use std::time::Duration;

use scoring_core::limits::MAX_JOB_ATTEMPTS;

/// Job queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Delivery attempts before a job is dead-lettered.
    pub max_attempts: u32,
    /// First retry delay; doubles per attempt.
    pub backoff_base: Duration,
    /// Retry delay ceiling.
    pub backoff_max: Duration,
    /// Number of concurrent worker tasks draining the queue.
    pub max_concurrency: usize,
    /// How long an active job may run before the sweep considers it stalled.
    pub stall_timeout: Duration,
    /// Interval of the stalled-job sweep.
    pub sweep_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_JOB_ATTEMPTS,
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_secs(30),
            max_concurrency: 4,
            stall_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(5),
        }
    }
}

impl QueueConfig {
    /// Exponential backoff for a given completed attempt count (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.backoff_base.saturating_mul(2u32.saturating_pow(exp));
        delay.min(self.backoff_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = QueueConfig::default();
        assert_eq!(config.backoff_for(1), Duration::from_millis(100));
        assert_eq!(config.backoff_for(2), Duration::from_millis(200));
        assert_eq!(config.backoff_for(3), Duration::from_millis(400));
        assert_eq!(config.backoff_for(20), Duration::from_secs(30));
    }

    #[test]
    fn test_default_attempt_ceiling() {
        assert_eq!(QueueConfig::default().max_attempts, 5);
    }
}
