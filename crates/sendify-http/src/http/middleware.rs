//! Middleware chain around the transport
//!
//! Middleware registered first is outermost: with `[A, B]` registered, an
//! attempt runs `A` before-logic, `B` before-logic, the transport, then `B`
//! after-logic and `A` after-logic. A middleware may short-circuit by
//! returning without calling [`Next::run`], and may replace the request or
//! the response it passes on.
//!
//! The chain wraps a single attempt. Retries re-enter it from the top with a
//! freshly built request.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::http::redact::{format_body_for_log, redact_credentials, LogBodyConfig, RedactionPolicy};
use crate::http::transport::{Transport, TransportError, WireRequest, WireResponse};

/// Boxed future returned by closure middleware
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A wrapper around one transport attempt
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(
        &self,
        request: WireRequest,
        next: Next<'_>,
    ) -> Result<WireResponse, TransportError>;
}

/// The remainder of the chain after the current middleware
#[derive(Clone, Copy)]
pub struct Next<'a> {
    transport: &'a dyn Transport,
    middlewares: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    pub fn new(transport: &'a dyn Transport, middlewares: &'a [Arc<dyn Middleware>]) -> Self {
        Self {
            transport,
            middlewares,
        }
    }

    /// Pass the request to the next middleware, or to the transport
    pub async fn run(self, request: WireRequest) -> Result<WireResponse, TransportError> {
        match self.middlewares.split_first() {
            Some((current, rest)) => {
                let next = Next {
                    transport: self.transport,
                    middlewares: rest,
                };
                current.handle(request, next).await
            }
            None => self.transport.send(request).await,
        }
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.middlewares.len())
            .finish()
    }
}

/// Middleware built from a closure, see [`from_fn`]
pub struct FnMiddleware<F>(F);

/// Build middleware from a closure returning a boxed future.
///
/// ```ignore
/// let mw = from_fn(|request, next| Box::pin(async move { next.run(request).await }));
/// ```
pub fn from_fn<F>(f: F) -> FnMiddleware<F>
where
    F: for<'a> Fn(WireRequest, Next<'a>) -> BoxFuture<'a, Result<WireResponse, TransportError>>
        + Send
        + Sync,
{
    FnMiddleware(f)
}

#[async_trait]
impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(WireRequest, Next<'a>) -> BoxFuture<'a, Result<WireResponse, TransportError>>
        + Send
        + Sync,
{
    async fn handle(
        &self,
        request: WireRequest,
        next: Next<'_>,
    ) -> Result<WireResponse, TransportError> {
        (self.0)(request, next).await
    }
}

/// Header set by [`RequestIdMiddleware`] unless configured otherwise
pub const DEFAULT_REQUEST_ID_HEADER: &str = "x-request-id";

/// Stamps each attempt with a UUID v4 request id.
///
/// A request that already carries the header keeps its value.
#[derive(Debug, Clone)]
pub struct RequestIdMiddleware {
    header: HeaderName,
}

impl Default for RequestIdMiddleware {
    fn default() -> Self {
        Self {
            header: HeaderName::from_static(DEFAULT_REQUEST_ID_HEADER),
        }
    }
}

impl RequestIdMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom header name
    pub fn with_header(name: &str) -> Result<Self, crate::Error> {
        let header = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| crate::Error::invalid_header(name, err))?;
        Ok(Self { header })
    }
}

#[async_trait]
impl Middleware for RequestIdMiddleware {
    async fn handle(
        &self,
        mut request: WireRequest,
        next: Next<'_>,
    ) -> Result<WireResponse, TransportError> {
        if !request.headers.contains_key(&self.header) {
            let id = Uuid::new_v4().to_string();
            let value = HeaderValue::from_str(&id)
                .map_err(|err| TransportError::Other(err.to_string()))?;
            request.headers.insert(self.header.clone(), value);
        }
        next.run(request).await
    }
}

/// Logs each attempt through `tracing` with sensitive data masked
#[derive(Debug, Clone, Default)]
pub struct LoggingMiddleware {
    policy: RedactionPolicy,
    bodies: Option<LogBodyConfig>,
}

impl LoggingMiddleware {
    pub fn new(policy: RedactionPolicy) -> Self {
        Self {
            policy,
            bodies: None,
        }
    }

    /// Also log request and response bodies at debug level
    pub fn with_body_logging(mut self, config: LogBodyConfig) -> Self {
        self.bodies = Some(config);
        self
    }

    fn log_body(&self, label: &str, body: &[u8], headers: &reqwest::header::HeaderMap) {
        let Some(config) = &self.bodies else {
            return;
        };
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if let Some(rendered) = format_body_for_log(body, content_type, &self.policy, config) {
            debug!(body = %rendered, "{label} body");
        }
    }
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(
        &self,
        request: WireRequest,
        next: Next<'_>,
    ) -> Result<WireResponse, TransportError> {
        let method = request.method.clone();
        let url = self.policy.redact_url(&request.url);
        let headers = self.policy.redact_headers(&request.headers);
        info!(method = %method, url = %url, headers = ?headers, "HTTP request");
        if let Some(body) = &request.body {
            self.log_body("HTTP request", body, &request.headers);
        }

        let start = Instant::now();
        let result = next.run(request).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(response) => {
                let headers = self.policy.redact_headers(&response.headers);
                info!(
                    method = %method,
                    url = %url,
                    status = response.status.as_u16(),
                    duration_ms,
                    headers = ?headers,
                    "HTTP response"
                );
                self.log_body("HTTP response", &response.body, &response.headers);
            }
            Err(err) => {
                warn!(
                    method = %method,
                    url = %url,
                    duration_ms,
                    error = %redact_credentials(&err.to_string()),
                    "HTTP request failed"
                );
            }
        }
        result
    }
}
