//! # Exponential Backoff
//!
//! Provides the per-key retry delay policy used by the work queue when a
//! reconciliation fails. Delays double on every consecutive failure of a key
//! and are capped at a configurable maximum, so a persistently failing key
//! settles into a steady retry cadence instead of growing without bound.
//!
//! Sequence with the defaults (5ms base, 1000s cap):
//! 5ms, 10ms, 20ms, 40ms, ... capped at 1000s.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::key::ObjectKey;

/// Default base delay for the first retry of a key.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(5);

/// Default upper bound on any computed retry delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(1000);

/// Exponential delay policy.
///
/// Stateless: the delay is a pure function of the consecutive-failure count,
/// so the same policy value can serve every key.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    base: Duration,
    /// Cap applied to every computed delay.
    max: Duration,
}

impl BackoffPolicy {
    /// Creates a policy with the given base delay and cap.
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before the retry following `retries` consecutive failures.
    ///
    /// `retries` is zero for the first failure. The result is non-decreasing
    /// in `retries` and never exceeds the cap.
    #[must_use]
    pub fn delay(&self, retries: u32) -> Duration {
        // 2^64 already dwarfs any sane cap; clamp the shift to avoid overflow.
        let factor = 1u64 << retries.min(63);
        match self.base.checked_mul(u32::try_from(factor).unwrap_or(u32::MAX)) {
            Some(delay) if delay < self.max => delay,
            _ => self.max,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

/// Per-key rate-limit state: consecutive-failure counters plus the policy
/// that turns a counter into a delay.
///
/// Counters are created on a key's first failure, incremented on each
/// subsequent one, and deleted by [`RateLimiter::forget`] when the key
/// reconciles successfully (or is dropped terminally).
#[derive(Debug, Default)]
pub struct RateLimiter {
    policy: BackoffPolicy,
    failures: Mutex<HashMap<ObjectKey, u32>>,
}

impl RateLimiter {
    /// Creates a limiter with the given policy.
    #[must_use]
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Records a failure for `key` and returns the delay before its retry.
    pub fn next_delay(&self, key: &ObjectKey) -> Duration {
        let mut failures = lock(&self.failures);
        let count = failures.entry(key.clone()).or_insert(0);
        let delay = self.policy.delay(*count);
        *count = count.saturating_add(1);
        delay
    }

    /// Clears the failure streak for `key`, so a later failure starts from
    /// the base delay again.
    pub fn forget(&self, key: &ObjectKey) {
        lock(&self.failures).remove(key);
    }

    /// Number of consecutive failures recorded for `key`.
    #[must_use]
    pub fn retries(&self, key: &ObjectKey) -> u32 {
        lock(&self.failures).get(key).copied().unwrap_or(0)
    }
}

/// Locks a mutex, recovering the data if a holder panicked. The maps here
/// are only ever mutated by short straight-line sections, so the contents
/// stay consistent even across a poisoned lock.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_per_retry() {
        let policy = BackoffPolicy::new(Duration::from_millis(5), Duration::from_secs(1000));

        assert_eq!(policy.delay(0), Duration::from_millis(5));
        assert_eq!(policy.delay(1), Duration::from_millis(10));
        assert_eq!(policy.delay(2), Duration::from_millis(20));
        assert_eq!(policy.delay(3), Duration::from_millis(40));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = BackoffPolicy::new(Duration::from_millis(5), Duration::from_secs(1));

        // 5ms * 2^8 = 1.28s, past the 1s cap.
        assert_eq!(policy.delay(8), Duration::from_secs(1));
        // And it stays there, including shifts that would overflow.
        assert_eq!(policy.delay(40), Duration::from_secs(1));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_delay_is_monotonic() {
        let policy = BackoffPolicy::default();
        let mut last = Duration::ZERO;
        for retries in 0..64 {
            let delay = policy.delay(retries);
            assert!(delay >= last, "delay regressed at retry {retries}");
            last = delay;
        }
    }

    #[test]
    fn test_limiter_tracks_per_key_streaks() {
        let limiter = RateLimiter::default();
        let a = ObjectKey::from("ns/a");
        let b = ObjectKey::from("ns/b");

        assert_eq!(limiter.next_delay(&a), Duration::from_millis(5));
        assert_eq!(limiter.next_delay(&a), Duration::from_millis(10));
        // An unrelated key starts its own streak.
        assert_eq!(limiter.next_delay(&b), Duration::from_millis(5));
        assert_eq!(limiter.retries(&a), 2);
        assert_eq!(limiter.retries(&b), 1);
    }

    #[test]
    fn test_forget_resets_streak() {
        let limiter = RateLimiter::default();
        let key = ObjectKey::from("ns/a");

        limiter.next_delay(&key);
        limiter.next_delay(&key);
        limiter.next_delay(&key);
        assert_eq!(limiter.retries(&key), 3);

        limiter.forget(&key);

        // Should restart from the base delay after a success.
        assert_eq!(limiter.retries(&key), 0);
        assert_eq!(limiter.next_delay(&key), Duration::from_millis(5));
    }
}
