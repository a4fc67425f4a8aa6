//! Retry logic with exponential backoff for HTTP requests
//!
//! The delay before retry `n` (1-based) is
//! `initial_delay * multiplier^(n-1)`, capped at `max_delay`, then spread by
//! a symmetric jitter of `± delay * jitter`. A positive integer `Retry-After`
//! header from the server replaces the computed backoff entirely.

use std::collections::BTreeSet;
use std::time::Duration;

use rand::Rng;
use reqwest::header::{HeaderMap, RETRY_AFTER};

/// Status codes retried by the default policy
pub const DEFAULT_RETRYABLE_STATUSES: [u16; 5] = [408, 429, 502, 503, 504];

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on the computed delay, before jitter
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Jitter fraction in `[0, 1]`
    pub jitter: f64,
    /// HTTP status codes that trigger a retry
    pub retryable_statuses: BTreeSet<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.1,
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.into_iter().collect(),
        }
    }
}

/// Decision on whether to retry a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the request after the specified delay
    Retry { delay: Duration },
    /// Do not retry the request
    NoRetry,
}

impl RetryPolicy {
    /// Create a new retry policy with custom settings
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// A policy that makes exactly one attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter: 0.0,
            ..Default::default()
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the jitter fraction, clamped to `[0, 1]`
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = if jitter.is_finite() {
            jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    /// Replace the set of retryable status codes
    pub fn with_retryable_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_statuses = statuses.into_iter().collect();
        self
    }

    /// Whether a response with this status may be retried
    pub fn should_retry(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Exponential delay for `attempt` before jitter. Attempts below 1 are
    /// treated as 1.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        if self.initial_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = f64::from(attempt.max(1) - 1);
        let max = self.max_delay.as_nanos() as f64;
        let mut delay = self.initial_delay.as_nanos() as f64 * self.multiplier.powf(exponent);
        if delay.is_nan() || delay > max {
            delay = max;
        }
        Duration::from_nanos(delay.max(0.0) as u64)
    }

    /// Jittered backoff for `attempt` using the thread-local RNG
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_with(attempt, &mut rand::thread_rng())
    }

    /// Jittered backoff for `attempt` drawing randomness from `rng`
    pub fn backoff_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let delay = self.base_delay(attempt);
        let jitter = if self.jitter.is_finite() {
            self.jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        if jitter == 0.0 || delay.is_zero() {
            return delay;
        }

        let nanos = delay.as_nanos() as f64;
        let range = nanos * jitter;
        let jittered = nanos - range + rng.gen::<f64>() * 2.0 * range;
        Duration::from_nanos(jittered.max(0.0) as u64)
    }

    /// Decide after a transport-level failure on `attempt`
    pub fn decide_after_failure(&self, attempt: u32) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::NoRetry;
        }
        RetryDecision::Retry {
            delay: self.backoff(attempt),
        }
    }

    /// Decide after a response with an error status on `attempt`
    pub fn decide_after_status(
        &self,
        attempt: u32,
        status: u16,
        headers: &HeaderMap,
    ) -> RetryDecision {
        if attempt >= self.max_attempts || !self.should_retry(status) {
            return RetryDecision::NoRetry;
        }
        let delay = retry_after(headers).unwrap_or_else(|| self.backoff(attempt));
        RetryDecision::Retry { delay }
    }
}

/// Parse a `Retry-After` value given as integer seconds.
///
/// HTTP-date values, empty strings and non-positive numbers yield `None`.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    match value.parse::<i64>() {
        Ok(seconds) if seconds > 0 => Some(Duration::from_secs(seconds.unsigned_abs())),
        _ => None,
    }
}

/// The server-requested delay carried in a `Retry-After` header
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_retry_after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use reqwest::header::HeaderValue;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy::default()
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(1))
            .with_jitter(0.0)
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
        assert_eq!(policy.multiplier, 2.0);
        assert_eq!(policy.jitter, 0.1);
        for status in DEFAULT_RETRYABLE_STATUSES {
            assert!(policy.should_retry(status));
        }
    }

    #[test]
    fn test_no_retry_policy() {
        let policy = RetryPolicy::no_retry();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.decide_after_failure(1), RetryDecision::NoRetry);
        assert_eq!(
            policy.decide_after_status(1, 503, &HeaderMap::new()),
            RetryDecision::NoRetry
        );
    }

    #[test]
    fn test_should_retry_statuses() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(429));
        assert!(policy.should_retry(503));
        assert!(!policy.should_retry(400));
        assert!(!policy.should_retry(404));
        assert!(!policy.should_retry(500));

        let custom = policy.with_retryable_statuses([500]);
        assert!(custom.should_retry(500));
        assert!(!custom.should_retry(503));
    }

    #[test]
    fn test_exponential_sequence() {
        let policy = no_jitter();
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(4), Duration::from_millis(800));
        assert_eq!(policy.backoff(5), Duration::from_secs(1));
        assert_eq!(policy.backoff(50), Duration::from_secs(1));
    }

    #[test]
    fn test_attempt_zero_is_treated_as_first() {
        let policy = no_jitter();
        assert_eq!(policy.backoff(0), policy.backoff(1));
    }

    #[test]
    fn test_huge_attempt_saturates_at_cap() {
        let policy = no_jitter();
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_seeded_jitter_is_deterministic() {
        let policy = no_jitter().with_jitter(0.5);
        let a = policy.backoff_with(3, &mut StdRng::seed_from_u64(7));
        let b = policy.backoff_with(3, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
        assert!(a >= Duration::from_millis(200));
        assert!(a <= Duration::from_millis(600));
    }

    #[test]
    fn test_jitter_is_clamped() {
        assert_eq!(RetryPolicy::default().with_jitter(3.0).jitter, 1.0);
        assert_eq!(RetryPolicy::default().with_jitter(-1.0).jitter, 0.0);
        assert_eq!(RetryPolicy::default().with_jitter(f64::NAN).jitter, 0.0);
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("5"), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after(""), None);
        assert_eq!(parse_retry_after("0"), None);
        assert_eq!(parse_retry_after("-3"), None);
        assert_eq!(parse_retry_after("1.5"), None);
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn test_retry_after_overrides_backoff() {
        let policy = no_jitter();
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));

        assert_eq!(
            policy.decide_after_status(1, 429, &headers),
            RetryDecision::Retry {
                delay: Duration::from_secs(7)
            }
        );
    }

    #[test]
    fn test_unparseable_retry_after_falls_back_to_backoff() {
        let policy = no_jitter();
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));

        assert_eq!(
            policy.decide_after_status(2, 503, &headers),
            RetryDecision::Retry {
                delay: Duration::from_millis(200)
            }
        );
    }

    #[test]
    fn test_decisions_stop_at_max_attempts() {
        let policy = no_jitter();
        assert!(matches!(
            policy.decide_after_failure(2),
            RetryDecision::Retry { .. }
        ));
        assert_eq!(policy.decide_after_failure(3), RetryDecision::NoRetry);
        assert_eq!(
            policy.decide_after_status(3, 503, &HeaderMap::new()),
            RetryDecision::NoRetry
        );
        assert_eq!(
            policy.decide_after_status(1, 400, &HeaderMap::new()),
            RetryDecision::NoRetry
        );
    }

    proptest! {
        #[test]
        fn prop_backoff_within_jitter_bounds(
            attempt in 0u32..64,
            initial_ms in 0u64..5_000,
            max_ms in 0u64..60_000,
            multiplier in 0.5f64..4.0,
            jitter in 0.0f64..=1.0,
            seed in any::<u64>(),
        ) {
            let policy = RetryPolicy::default()
                .with_initial_delay(Duration::from_millis(initial_ms))
                .with_max_delay(Duration::from_millis(max_ms))
                .with_multiplier(multiplier)
                .with_jitter(jitter);

            let delay = policy.backoff_with(attempt, &mut StdRng::seed_from_u64(seed));
            let base = policy.base_delay(attempt);
            let upper = base.as_nanos() as f64 * (1.0 + jitter) + 1.0;
            let lower = base.as_nanos() as f64 * (1.0 - jitter) - 1.0;

            prop_assert!(base <= policy.max_delay);
            prop_assert!((delay.as_nanos() as f64) <= upper);
            prop_assert!((delay.as_nanos() as f64) >= lower);
        }

        #[test]
        fn prop_retry_after_integer_seconds(seconds in any::<i64>()) {
            let parsed = parse_retry_after(&seconds.to_string());
            if seconds > 0 {
                prop_assert_eq!(parsed, Some(Duration::from_secs(seconds as u64)));
            } else {
                prop_assert_eq!(parsed, None);
            }
        }

        #[test]
        fn prop_retry_after_non_numeric_is_ignored(value in "[^0-9]*") {
            prop_assert_eq!(parse_retry_after(&value), None);
        }
    }
}
