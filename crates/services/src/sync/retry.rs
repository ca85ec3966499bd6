use std::time::Duration;

use rand::Rng;

/// Bounded exponential backoff for attempt-store writes.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 200,
            backoff_factor: 2.0,
            max_delay_ms: 5_000,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that tries exactly once.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_initial_delay_ms(mut self, initial_delay_ms: u64) -> Self {
        self.initial_delay_ms = initial_delay_ms;
        self
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay to wait after failed attempt number `attempt` (1-based), never
    /// more than `max_delay_ms` even with jitter.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let ms = delay_ms(attempt, self, || rand::rng().random_range(0.5..1.5));
        Duration::from_millis(ms)
    }
}

/// Configuration for one sync dispatcher.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyncConfig {
    pub retry: RetryPolicy,
}

impl SyncConfig {
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

fn delay_ms(attempt: u32, policy: &RetryPolicy, jitter: impl FnOnce() -> f64) -> u64 {
    let exp = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
    #[allow(clippy::cast_precision_loss)]
    let base = (policy.initial_delay_ms as f64) * policy.backoff_factor.powi(exp);
    let jittered = if policy.jitter { base * jitter() } else { base };
    #[allow(clippy::cast_precision_loss)]
    let delay = jittered.min(policy.max_delay_ms as f64);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let ms = delay.round().max(0.0) as u64;
    ms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_exponentially_up_to_the_cap() {
        let policy = RetryPolicy::default().with_jitter(false);
        assert_eq!(delay_ms(1, &policy, || 1.0), 200);
        assert_eq!(delay_ms(2, &policy, || 1.0), 400);
        assert_eq!(delay_ms(3, &policy, || 1.0), 800);
        assert_eq!(delay_ms(10, &policy, || 1.0), 5_000);
    }

    #[test]
    fn jitter_scales_the_base_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(delay_ms(2, &policy, || 0.5), 200);
        assert_eq!(delay_ms(2, &policy, || 1.5), 600);

        let sampled = policy.delay_after(2).as_millis();
        assert!((200..=600).contains(&sampled));
    }

    #[test]
    fn jittered_delay_never_exceeds_the_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(delay_ms(10, &policy, || 1.5), 5_000);
        assert_eq!(delay_ms(5, &policy, || 1.5), 4_800);
        assert_eq!(delay_ms(10, &policy, || 0.5), 5_000);

        for _ in 0..50 {
            assert!(policy.delay_after(12).as_millis() <= 5_000);
        }
    }

    #[test]
    fn at_least_one_attempt_is_made() {
        assert_eq!(RetryPolicy::default().with_max_attempts(0).max_attempts, 1);
        assert_eq!(RetryPolicy::no_retry().max_attempts, 1);
    }
}
