//! Backoff Scheduler — exponential delay between retries on one credential.

use std::time::Duration;

/// Retry policy applied per credential: `max_retries` retries after the
/// first attempt, with `base * 2^(attempt-1)` delay before each retry.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max_retries: u32,
}

impl BackoffPolicy {
    pub fn new(base: Duration, max_retries: u32) -> Self {
        Self { base, max_retries }
    }

    /// Delay before attempt `attempt` (0-based). The first attempt is
    /// immediate; attempt n ≥ 1 waits `base * 2^(n-1)`.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        // Shift capped so a misconfigured retry count cannot overflow.
        let factor = 1u32 << (attempt - 1).min(16);
        self.base * factor
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max_retries: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_attempt_has_no_delay() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.next_delay(0), Duration::ZERO);
    }

    #[test]
    fn test_delays_double_from_base() {
        let policy = BackoffPolicy::new(Duration::from_millis(500), 4);
        assert_eq!(policy.next_delay(1), Duration::from_millis(500));
        assert_eq!(policy.next_delay(2), Duration::from_millis(1000));
        assert_eq!(policy.next_delay(3), Duration::from_millis(2000));
        assert_eq!(policy.next_delay(4), Duration::from_millis(4000));
    }

    #[test]
    fn test_alternate_base_scales_the_schedule() {
        let policy = BackoffPolicy::new(Duration::from_millis(1000), 2);
        assert_eq!(policy.next_delay(1), Duration::from_millis(1000));
        assert_eq!(policy.next_delay(2), Duration::from_millis(2000));
    }

    #[test]
    fn test_large_attempt_does_not_overflow() {
        let policy = BackoffPolicy::new(Duration::from_millis(1), 2);
        // Way past any sane retry count; must not panic.
        let _ = policy.next_delay(64);
    }
}
