//! Sendify HTTP - a resilient outbound HTTP client
//!
//! Every request issued through a [`Client`] runs the same pipeline: the body
//! is encoded once, a token is taken from the shared rate limiter, and the
//! request is attempted through the middleware chain and transport until it
//! succeeds, fails permanently, or runs out of attempts or time.
//!
//! # Main Components
//!
//! - **Rate limiting**: one token bucket shared by every clone of a client
//! - **Retries**: exponential backoff with jitter; `Retry-After` wins
//! - **Middleware**: first registered is outermost
//! - **Errors**: [`HttpError`] classified as timeout, network, HTTP, parse,
//!   rate limit or unknown
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use sendify_http::{Client, RequestContext, RetryPolicy};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::builder()
//!     .base_url("https://api.example.com/v1")
//!     .retry(RetryPolicy::new(3))
//!     .rate_limit(10, Duration::from_secs(1))
//!     .build()?;
//!
//! let ctx = RequestContext::new();
//! let response = client.get("/users").query("page", "2").send(&ctx).await?;
//! println!("{} after {} attempt(s)", response.status_text(), response.attempts());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod mock;

// Re-export main types for convenience
pub use config::ClientConfig;
pub use context::{ContextError, RequestContext};
pub use error::{Error, Result};
pub use http::{
    Body, Client, ClientBuilder, ErrorKind, HttpError, Middleware, Next, RateLimitConfig,
    RateLimiter, Request, RequestBuilder, Response, RetryPolicy, Transport, TransportError,
    WireRequest, WireResponse,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
