//! Progressive backoff for the child-resolution retry loop.
//!
//! Waits grow linearly with no jitter: `base`, `2 * base`, `3 * base`, ...
//! so every wait is strictly longer than the one before.

use std::time::Duration;

use crate::config::ConfigError;

/// Attempt count and wait schedule for resolver retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    max_attempts: usize,
    base_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    /// Creates a policy of `max_attempts` passes, the first preceded by
    /// `base_delay`.
    ///
    /// Both values must be non-zero.
    pub fn linear(max_attempts: usize, base_delay: Duration) -> Result<Self, ConfigError> {
        if max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_attempts".to_string(),
                message: "at least one resolution attempt is required".to_string(),
            });
        }
        if base_delay.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "base_delay_seconds".to_string(),
                message: "waits between attempts must grow, so the base delay cannot be zero"
                    .to_string(),
            });
        }
        Ok(Self {
            max_attempts,
            base_delay,
        })
    }

    /// Number of passes.
    #[must_use]
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Wait before the zero-based `attempt`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let factor = u32::try_from(attempt.saturating_add(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Every wait, one per attempt, in order.
    #[must_use]
    pub fn schedule(&self) -> Vec<Duration> {
        (0..self.max_attempts)
            .map(|attempt| self.delay_for_attempt(attempt))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_schedule_is_30_60_90() {
        assert_eq!(
            BackoffPolicy::default().schedule(),
            vec![
                Duration::from_secs(30),
                Duration::from_secs(60),
                Duration::from_secs(90),
            ]
        );
    }

    #[test]
    fn test_schedule_strictly_increases() {
        let policy = BackoffPolicy::linear(8, Duration::from_millis(700)).unwrap();
        let schedule = policy.schedule();
        assert_eq!(schedule.len(), 8);
        assert!(schedule.windows(2).all(|w| w[0] < w[1]), "{schedule:?}");
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let err = BackoffPolicy::linear(0, Duration::from_secs(30)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "max_attempts"));
    }

    #[test]
    fn test_zero_base_delay_rejected() {
        let err = BackoffPolicy::linear(3, Duration::ZERO).unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "base_delay_seconds")
        );
    }
}
