//! Retry policy
//!
//! Exponential backoff and retryability classification for capability
//! execution errors.

use std::time::Duration;

/// Retry configuration declared by an extended capability
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts allowed after the first one
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Growth factor per attempt, never below 1.0
    pub backoff_multiplier: f64,
    /// Substrings that mark an error as transient. Empty means every error is.
    pub retryable_error_patterns: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            retryable_error_patterns: Vec::new(),
        }
    }
}

impl RetryPolicy {
    /// Default backoff with a custom retry count
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub fn no_retry() -> Self {
        Self::new(0)
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retryable_error_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Total attempts including the first one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retrying after the zero-based attempt `attempt`:
    /// `min(initial * multiplier^attempt, max)`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if self.initial_backoff.is_zero() {
            return Duration::ZERO;
        }
        let multiplier = if self.backoff_multiplier.is_finite() {
            self.backoff_multiplier.max(1.0)
        } else {
            1.0
        };
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.initial_backoff.as_secs_f64() * multiplier.powi(exponent);
        // f64::min discards NaN and caps overflow to infinity
        let delay = delay.min(self.max_backoff.as_secs_f64());
        // An uncapped policy can exceed what Duration holds
        Duration::try_from_secs_f64(delay.max(0.0)).unwrap_or(self.max_backoff)
    }

    /// Check if an error message is transient under this policy
    pub fn is_retryable(&self, error_msg: &str) -> bool {
        self.retryable_error_patterns.is_empty()
            || self
                .retryable_error_patterns
                .iter()
                .any(|pattern| error_msg.contains(pattern.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_delay() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_for_attempt(0).as_millis(), 100);
        assert_eq!(policy.delay_for_attempt(1).as_millis(), 200);
        assert_eq!(policy.delay_for_attempt(2).as_millis(), 400);
        // Capped at max_backoff
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn test_multiplier_below_one_is_clamped() {
        let policy = RetryPolicy::new(2)
            .with_backoff(Duration::from_millis(50), Duration::from_secs(1))
            .with_multiplier(0.5);
        assert_eq!(policy.delay_for_attempt(3).as_millis(), 50);
    }

    #[test]
    fn test_uncapped_backoff_saturates() {
        let policy = RetryPolicy::new(3)
            .with_backoff(Duration::from_secs(1), Duration::MAX)
            .with_multiplier(1e30);
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::MAX);
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::MAX);
    }

    #[test]
    fn test_empty_patterns_retry_everything() {
        let policy = RetryPolicy::default();
        assert!(policy.is_retryable("permission denied"));
        assert!(policy.is_retryable(""));
    }

    #[test]
    fn test_patterns_match_substrings() {
        let policy = RetryPolicy::new(3).with_patterns(["timeout", "503"]);
        assert!(policy.is_retryable("upstream returned 503 service unavailable"));
        assert!(policy.is_retryable("read timeout"));
        assert!(!policy.is_retryable("401 unauthorized"));
    }

    #[test]
    fn test_max_attempts() {
        assert_eq!(RetryPolicy::no_retry().max_attempts(), 1);
        assert_eq!(RetryPolicy::new(3).max_attempts(), 4);
        assert_eq!(RetryPolicy::new(u32::MAX).max_attempts(), u32::MAX);
    }
}
