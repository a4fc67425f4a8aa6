//! Rate limiting implementation using token bucket algorithm
//!
//! One bucket is shared by every request issued through a client. Refill is
//! computed lazily on each admission check, so no background task is needed,
//! and the bucket lock is never held while a caller sleeps.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::context::{ContextError, RequestContext};

/// Rate limiting configuration: `permits` requests per `window`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests admitted per window, also the burst capacity
    pub permits: u32,
    /// Length of the window
    pub window: Duration,
}

impl RateLimitConfig {
    pub fn new(permits: u32, window: Duration) -> Self {
        Self { permits, window }
    }

    pub fn per_second(permits: u32) -> Self {
        Self::new(permits, Duration::from_secs(1))
    }

    pub fn per_minute(permits: u32) -> Self {
        Self::new(permits, Duration::from_secs(60))
    }

    /// Validate the rate limit configuration
    pub fn validate(&self) -> Result<(), RateLimitError> {
        if self.permits == 0 {
            return Err(RateLimitError::InvalidConfig(
                "permits must be greater than zero".to_string(),
            ));
        }
        if self.window.is_zero() {
            return Err(RateLimitError::InvalidConfig(
                "window must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Tokens restored per second
    pub fn refill_rate(&self) -> f64 {
        f64::from(self.permits) / self.window.as_secs_f64()
    }
}

/// Errors that can occur during rate limiting
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// The caller's context ended while waiting for a token
    #[error("rate limit wait aborted: {0}")]
    Aborted(#[from] ContextError),

    #[error("Rate limit configuration error: {0}")]
    InvalidConfig(String),
}

/// Token bucket for rate limiting
#[derive(Debug)]
struct TokenBucket {
    /// Current number of tokens
    tokens: f64,
    /// Maximum number of tokens (burst capacity)
    capacity: f64,
    /// Rate of token refill per second
    refill_rate: f64,
    /// Last refill time
    last_refill: Instant,
}

impl TokenBucket {
    fn new(config: &RateLimitConfig, now: Instant) -> Self {
        let capacity = f64::from(config.permits);
        Self {
            tokens: capacity,
            capacity,
            refill_rate: config.refill_rate(),
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Debit one token, or report how long until one becomes available
    fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Ok(());
        }
        let wait = (1.0 - self.tokens) / self.refill_rate;
        Err(Duration::try_from_secs_f64(wait).unwrap_or(Duration::MAX))
    }
}

/// Token-bucket rate limiter shared by concurrent requests
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    bucket: Mutex<TokenBucket>,
}

impl RateLimiter {
    /// Create a limiter admitting `config.permits` requests per `config.window`
    pub fn new(config: RateLimitConfig) -> Result<Self, RateLimitError> {
        config.validate()?;
        Ok(Self {
            bucket: Mutex::new(TokenBucket::new(&config, Instant::now())),
            config,
        })
    }

    /// Shorthand for `RateLimiter::new(RateLimitConfig::new(permits, window))`
    pub fn per_window(permits: u32, window: Duration) -> Result<Self, RateLimitError> {
        Self::new(RateLimitConfig::new(permits, window))
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Wait until a token is available and consume it.
    ///
    /// Fails without consuming a token if `ctx` is already done or ends while
    /// waiting.
    pub async fn acquire(&self, ctx: &RequestContext) -> Result<(), RateLimitError> {
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }

        loop {
            let wait = match self.try_acquire() {
                Ok(()) => return Ok(()),
                Err(wait) => wait,
            };
            tracing::trace!(wait_ms = wait.as_millis() as u64, "Waiting for rate limit token");
            ctx.run(tokio::time::sleep(wait)).await?;
        }
    }

    /// Consume a token if one is available right now; otherwise return the
    /// time until the next token
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.try_acquire(Instant::now())
    }

    /// Tokens currently in the bucket, after refill
    pub fn available_tokens(&self) -> f64 {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.refill(Instant::now());
        bucket.tokens
    }
}
