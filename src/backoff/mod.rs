//! Exponential backoff bookkeeping for reconnection.

use std::time::Duration;

use rand::Rng;

use crate::config::ReconnectConfig;

/// Tracks consecutive failed connection attempts and computes the delay
/// before the next retry.
///
/// The delay for attempt `k` is `min(base × 2^(k-1), cap)`, with optional
/// multiplicative jitter. The counter resets to zero on every successful
/// connection, so a long-lived connection that later drops starts its
/// backoff from the beginning again.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: ReconnectConfig,
    attempt: u32,
}

impl RetryPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Record a failed or closed connection, returning the new attempt count.
    pub fn next_attempt(&mut self) -> u32 {
        self.attempt = self.attempt.saturating_add(1);
        self.attempt
    }

    /// Delay before retry attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .config
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
        let capped = exp.min(self.config.max_delay_ms);

        let final_ms = if self.config.jitter_factor > 0.0 {
            let span = capped as f64 * self.config.jitter_factor;
            let offset = rand::rng().random_range(-span..=span);
            (capped as f64 + offset).max(1.0) as u64
        } else {
            capped.max(1)
        };

        Duration::from_millis(final_ms)
    }

    /// Whether the retry budget is spent.
    pub fn exhausted(&self) -> bool {
        self.attempt >= self.config.max_attempts
    }

    /// Reset after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ReconnectConfig {
        ReconnectConfig {
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            max_attempts: 5,
            jitter_factor: 0.0,
        }
    }

    #[test]
    fn test_delay_doubles_per_attempt() {
        let policy = RetryPolicy::new(config());
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(5), Duration::from_millis(16_000));
    }

    #[test]
    fn test_delay_caps_at_max() {
        let policy = RetryPolicy::new(config());
        // 2^5 × 1000 = 32000 would exceed the 30s cap
        assert_eq!(policy.delay_for(6), Duration::from_millis(30_000));
        assert_eq!(policy.delay_for(20), Duration::from_millis(30_000));
    }

    #[test]
    fn test_exhaustion_after_max_attempts() {
        let mut policy = RetryPolicy::new(config());
        for _ in 0..4 {
            policy.next_attempt();
            assert!(!policy.exhausted());
        }
        policy.next_attempt();
        assert!(policy.exhausted());
    }

    #[test]
    fn test_reset_restarts_backoff() {
        let mut policy = RetryPolicy::new(config());
        policy.next_attempt();
        policy.next_attempt();
        policy.reset();
        assert_eq!(policy.attempt(), 0);
        assert_eq!(policy.next_attempt(), 1);
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::new(ReconnectConfig {
            jitter_factor: 0.1,
            ..config()
        });
        for _ in 0..50 {
            let delay = policy.delay_for(1).as_millis() as u64;
            assert!((900..=1100).contains(&delay), "delay {delay} out of bounds");
        }
    }
}
