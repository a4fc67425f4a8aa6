//! HTTP client, its builder, and the request executor
//!
//! One logical request runs through these steps:
//!
//! 1. resolve the URL and encode the body once
//! 2. take a token from the rate limiter, if one is configured
//! 3. open a timeout scope covering every attempt and backoff wait
//! 4. per attempt: build a fresh wire request, apply auth, run the
//!    middleware chain and transport, then classify the outcome
//! 5. on a retryable outcome with attempts left, wait for `Retry-After` or
//!    the computed backoff, then go again

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::Method;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::http::auth::{AuthError, AuthProvider};
use crate::http::body::{EncodedBody, CONTENT_TYPE_JSON};
use crate::http::error::{ErrorKind, HttpError};
use crate::http::middleware::{Middleware, Next};
use crate::http::rate_limit::{RateLimitConfig, RateLimiter};
use crate::http::request::{Request, RequestBuilder};
use crate::http::response::Response;
use crate::http::retry::{RetryDecision, RetryPolicy};
use crate::http::transport::{
    ReqwestTransport, Transport, TransportError, WireRequest, WireResponse,
};

/// Client timeout when none is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Content type used for bodies that carry no type of their own
pub const DEFAULT_CONTENT_TYPE: &str = CONTENT_TYPE_JSON;

/// `User-Agent` sent unless overridden
pub fn default_user_agent() -> String {
    format!("sendify/{}", crate::VERSION)
}

struct ClientInner {
    base_url: Url,
    transport: Arc<dyn Transport>,
    timeout: Option<Duration>,
    headers: HeaderMap,
    default_content_type: HeaderValue,
    retry_policy: Option<RetryPolicy>,
    rate_limiter: Option<Arc<RateLimiter>>,
    middlewares: Vec<Arc<dyn Middleware>>,
    auth: Option<Arc<dyn AuthProvider>>,
}

/// An HTTP client bound to one base URL.
///
/// Cloning is cheap and clones share the transport pool, rate limiter and
/// middleware chain.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.inner.base_url.as_str())
            .field("timeout", &self.inner.timeout)
            .field("retry_policy", &self.inner.retry_policy)
            .field("rate_limit", &self.inner.rate_limiter.as_ref().map(|l| l.config()))
            .field("middlewares", &self.inner.middlewares.len())
            .field("auth", &self.inner.auth.is_some())
            .finish()
    }
}

/// Builder for [`Client`]. Validation happens in [`ClientBuilder::build`].
pub struct ClientBuilder {
    base_url: Option<String>,
    transport: Option<Arc<dyn Transport>>,
    timeout: Option<Duration>,
    headers: Vec<(String, String)>,
    default_content_type: String,
    retry_policy: Option<RetryPolicy>,
    rate_limit: Option<RateLimitConfig>,
    rate_limiter: Option<Arc<RateLimiter>>,
    middlewares: Vec<Arc<dyn Middleware>>,
    auth: Option<Arc<dyn AuthProvider>>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            base_url: None,
            transport: None,
            timeout: Some(DEFAULT_TIMEOUT),
            headers: Vec::new(),
            default_content_type: DEFAULT_CONTENT_TYPE.to_string(),
            retry_policy: None,
            rate_limit: None,
            rate_limiter: None,
            middlewares: Vec::new(),
            auth: None,
        }
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Base URL every request path is joined onto (required)
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Replace the default `reqwest` transport
    pub fn transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Default timeout for a whole logical request, including retries
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Disable the client-level timeout
    pub fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Set a default header, replacing any earlier value for the same name
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn user_agent(self, user_agent: impl Into<String>) -> Self {
        self.header(USER_AGENT.as_str(), user_agent)
    }

    /// Content type used when a body carries none of its own
    pub fn default_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.default_content_type = content_type.into();
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Admit at most `permits` requests per `window`
    pub fn rate_limit(mut self, permits: u32, window: Duration) -> Self {
        self.rate_limit = Some(RateLimitConfig::new(permits, window));
        self
    }

    /// Share an existing limiter, e.g. between several clients
    pub fn rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Append a middleware; the first one registered is outermost
    pub fn middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn auth<A: AuthProvider + 'static>(mut self, auth: A) -> Self {
        self.auth = Some(Arc::new(auth));
        self
    }

    pub fn build(self) -> Result<Client> {
        let base = self.base_url.ok_or_else(|| {
            Error::configuration("base URL is required: call ClientBuilder::base_url")
        })?;
        if base.trim().is_empty() {
            return Err(Error::configuration("base URL cannot be empty"));
        }
        let base_url = Url::parse(base.trim()).map_err(|source| Error::InvalidBaseUrl {
            url: base.clone(),
            source,
        })?;
        if base_url.cannot_be_a_base() {
            return Err(Error::configuration(format!(
                "base URL '{base}' cannot have paths joined onto it"
            )));
        }

        if self.timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(Error::configuration("timeout must be positive"));
        }

        if self.default_content_type.trim().is_empty() {
            return Err(Error::configuration("content type cannot be empty"));
        }
        let default_content_type = HeaderValue::from_str(&self.default_content_type)
            .map_err(|err| Error::invalid_header(CONTENT_TYPE.as_str(), err))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(CONTENT_TYPE_JSON));
        let user_agent = default_user_agent();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&user_agent)
                .map_err(|err| Error::invalid_header(USER_AGENT.as_str(), err))?,
        );
        for (name, value) in &self.headers {
            if name.trim().is_empty() {
                return Err(Error::configuration("header key cannot be empty"));
            }
            let (name, value) = parse_header(name, value)?;
            headers.insert(name, value);
        }

        let rate_limiter = match (self.rate_limiter, self.rate_limit) {
            (Some(shared), _) => Some(shared),
            (None, Some(config)) => Some(Arc::new(RateLimiter::new(config)?)),
            (None, None) => None,
        };

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new().map_err(Error::Transport)?),
        };

        Ok(Client {
            inner: Arc::new(ClientInner {
                base_url,
                transport,
                timeout: self.timeout,
                headers,
                default_content_type,
                retry_policy: self.retry_policy,
                rate_limiter,
                middlewares: self.middlewares,
                auth: self.auth,
            }),
        })
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let header_name =
        HeaderName::from_bytes(name.as_bytes()).map_err(|err| Error::invalid_header(name, err))?;
    let header_value = HeaderValue::from_str(value).map_err(|err| Error::invalid_header(name, err))?;
    Ok((header_name, header_value))
}

/// Join `path` onto the base URL's path and append `query`
pub(crate) fn resolve_url(base: &Url, path: &str, query: &[(String, String)]) -> Url {
    let mut url = base.clone();
    let relative = path.trim_start_matches('/');
    if !relative.is_empty() {
        let joined = format!("{}/{}", base.path().trim_end_matches('/'), relative);
        url.set_path(&joined);
    }
    if !query.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
    url
}

/// Everything about a request that stays fixed across attempts
struct PreparedRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl PreparedRequest {
    fn wire(&self) -> WireRequest {
        WireRequest {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }
}

/// Why an attempt produced no response
enum AttemptFailure {
    Auth(AuthError),
    Transport(TransportError),
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.inner.timeout
    }

    pub fn default_headers(&self) -> &HeaderMap {
        &self.inner.headers
    }

    pub fn retry_policy(&self) -> Option<&RetryPolicy> {
        self.inner.retry_policy.as_ref()
    }

    pub fn rate_limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.inner.rate_limiter.as_ref()
    }

    pub fn request(&self, method: Method, path: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, method, path)
    }

    pub fn get(&self, path: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::GET, path)
    }

    pub fn post(&self, path: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::POST, path)
    }

    pub fn put(&self, path: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::PUT, path)
    }

    pub fn patch(&self, path: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::PATCH, path)
    }

    pub fn delete(&self, path: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::DELETE, path)
    }

    /// Execute `request` and decode a non-empty success body as JSON.
    ///
    /// A decode failure is a Parse-kind error that still carries the response.
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        request: Request,
    ) -> std::result::Result<(Response, Option<T>), HttpError> {
        let method = request.method.clone();
        let response = self.execute(ctx, request).await?;
        if response.body().is_empty() {
            return Ok((response, None));
        }
        match serde_json::from_slice::<T>(response.body()) {
            Ok(value) => Ok((response, Some(value))),
            Err(err) => Err(HttpError::new(ErrorKind::Parse, method, response.url().as_str())
                .with_attempts(response.attempts())
                .with_source(err)
                .with_response(Some(response))),
        }
    }

    /// Execute `request` with rate limiting, retries and the middleware chain
    pub async fn execute(
        &self,
        ctx: &RequestContext,
        request: Request,
    ) -> std::result::Result<Response, HttpError> {
        let inner = &*self.inner;
        let method = request.method.clone();
        let url = resolve_url(&inner.base_url, &request.path, &request.query);
        let display_url = url.to_string();

        let encoded = match &request.body {
            Some(body) => Some(body.encode().map_err(|err| {
                HttpError::new(ErrorKind::Unknown, method.clone(), display_url.as_str())
                    .with_source(err)
            })?),
            None => None,
        };
        let prepared = self.prepare(&request, url, encoded).map_err(|err| {
            HttpError::new(ErrorKind::Unknown, method.clone(), display_url.as_str())
                .with_source(err)
        })?;

        if let Some(limiter) = &inner.rate_limiter {
            limiter.acquire(ctx).await.map_err(|err| {
                HttpError::new(ErrorKind::RateLimit, method.clone(), display_url.as_str())
                    .with_source(err)
            })?;
        }

        let scope = match request.timeout.or(inner.timeout) {
            Some(timeout) => ctx.with_timeout(timeout),
            None => ctx.child(),
        };
        let max_attempts = inner
            .retry_policy
            .as_ref()
            .map_or(1, |policy| policy.max_attempts.max(1));

        let mut last_error = None;
        for attempt in 1..=max_attempts {
            debug!(method = %method, url = %display_url, attempt, max_attempts, "Sending request");

            let (error, decision) = match self.attempt(&scope, prepared.wire()).await {
                Ok(wire) if wire.status.as_u16() < 400 => {
                    return Ok(Response::from_wire(wire, prepared.url.clone(), attempt));
                }
                Ok(wire) => {
                    let decision = match &inner.retry_policy {
                        Some(policy) => {
                            policy.decide_after_status(attempt, wire.status.as_u16(), &wire.headers)
                        }
                        None => RetryDecision::NoRetry,
                    };
                    let response = Response::from_wire(wire, prepared.url.clone(), attempt);
                    (HttpError::from_response(method.clone(), response), decision)
                }
                Err(AttemptFailure::Auth(err)) => {
                    return Err(HttpError::new(ErrorKind::Unknown, method, display_url)
                        .with_attempts(attempt)
                        .with_source(err));
                }
                Err(AttemptFailure::Transport(err)) => {
                    let decision = match &inner.retry_policy {
                        Some(policy) => policy.decide_after_failure(attempt),
                        None => RetryDecision::NoRetry,
                    };
                    let error = HttpError::from_transport(
                        method.clone(),
                        display_url.as_str(),
                        attempt,
                        err,
                    );
                    (error, decision)
                }
            };

            let delay = match decision {
                RetryDecision::Retry { delay } => delay,
                RetryDecision::NoRetry => return Err(error),
            };
            // a finished scope leaves no budget for another attempt
            if let Some(cause) = scope.err() {
                return Err(HttpError::from_context(method, display_url, attempt, cause)
                    .with_response(error.into_response()));
            }

            warn!(
                method = %method,
                url = %display_url,
                attempt,
                delay_ms = delay.as_millis() as u64,
                reason = %error,
                "Retrying request"
            );
            if let Err(cause) = scope.run(tokio::time::sleep(delay)).await {
                return Err(HttpError::from_context(method, display_url, attempt, cause)
                    .with_response(error.into_response()));
            }
            last_error = Some(error);
        }

        Err(last_error.unwrap_or_else(|| {
            HttpError::new(ErrorKind::Unknown, method, display_url)
                .with_source("no attempt was made")
        }))
    }

    /// Merge headers and fix the content type.
    ///
    /// Precedence, lowest first: client defaults, body-intrinsic headers,
    /// per-request headers. The content type is the per-request override,
    /// else the body's own type, else the client default when a body exists.
    fn prepare(
        &self,
        request: &Request,
        url: Url,
        encoded: Option<EncodedBody>,
    ) -> Result<PreparedRequest> {
        let mut headers = self.inner.headers.clone();
        if let Some(encoded) = &encoded {
            for (name, value) in &encoded.headers {
                headers.insert(name.clone(), value.clone());
            }
        }
        for (name, value) in &request.headers {
            let (name, value) = parse_header(name, value)?;
            headers.insert(name, value);
        }

        let content_type = match (&request.content_type, &encoded) {
            (Some(content_type), _) => Some(
                HeaderValue::from_str(content_type)
                    .map_err(|err| Error::invalid_header(CONTENT_TYPE.as_str(), err))?,
            ),
            (None, Some(EncodedBody { content_type: Some(hint), .. })) => {
                Some(HeaderValue::from_static(*hint))
            }
            (None, Some(_)) => Some(self.inner.default_content_type.clone()),
            (None, None) => None,
        };
        if let Some(content_type) = content_type {
            headers.insert(CONTENT_TYPE, content_type);
        }

        Ok(PreparedRequest {
            method: request.method.clone(),
            url,
            headers,
            body: encoded.map(|encoded| encoded.bytes),
        })
    }

    /// One pass through auth, middleware and transport, bounded by `scope`
    async fn attempt(
        &self,
        scope: &RequestContext,
        mut request: WireRequest,
    ) -> std::result::Result<WireResponse, AttemptFailure> {
        let inner = &*self.inner;
        if let Some(auth) = &inner.auth {
            match scope.run(auth.apply(&mut request)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => return Err(AttemptFailure::Auth(err)),
                Err(cause) => return Err(AttemptFailure::Transport(cause.into())),
            }
        }

        let chain = Next::new(inner.transport.as_ref(), &inner.middlewares);
        match scope.run(chain.run(request)).await {
            Ok(result) => result.map_err(AttemptFailure::Transport),
            Err(cause) => Err(AttemptFailure::Transport(cause.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(url: &str) -> Url {
        Url::parse(url).unwrap()
    }

    #[test]
    fn test_resolve_url_joins_base_path() {
        let url = resolve_url(&base("https://api.example.com/v1"), "/users", &[]);
        assert_eq!(url.as_str(), "https://api.example.com/v1/users");

        let url = resolve_url(&base("https://api.example.com/v1/"), "users/42", &[]);
        assert_eq!(url.as_str(), "https://api.example.com/v1/users/42");

        let url = resolve_url(&base("https://api.example.com"), "/test", &[]);
        assert_eq!(url.as_str(), "https://api.example.com/test");
    }

    #[test]
    fn test_resolve_url_empty_path_keeps_base() {
        let url = resolve_url(&base("https://api.example.com/v1"), "", &[]);
        assert_eq!(url.as_str(), "https://api.example.com/v1");
    }

    #[test]
    fn test_resolve_url_appends_query() {
        let query = vec![
            ("q".to_string(), "rust lang".to_string()),
            ("page".to_string(), "2".to_string()),
        ];
        let url = resolve_url(&base("https://api.example.com?key=1"), "/search", &query);
        assert_eq!(
            url.as_str(),
            "https://api.example.com/search?key=1&q=rust+lang&page=2"
        );
    }

    #[test]
    fn test_builder_requires_base_url() {
        let err = ClientBuilder::new().build().unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));

        let err = Client::builder().base_url("   ").build().unwrap_err();
        assert!(err.to_string().contains("base URL cannot be empty"));

        let err = Client::builder().base_url("not a url").build().unwrap_err();
        assert!(matches!(err, Error::InvalidBaseUrl { .. }));
    }

    #[test]
    fn test_builder_validation() {
        let err = Client::builder()
            .base_url("https://api.example.com")
            .timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("timeout must be positive"));

        let err = Client::builder()
            .base_url("https://api.example.com")
            .header("", "x")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("header key cannot be empty"));

        let err = Client::builder()
            .base_url("https://api.example.com")
            .default_content_type("")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("content type cannot be empty"));

        let err = Client::builder()
            .base_url("https://api.example.com")
            .rate_limit(0, Duration::from_secs(1))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::RateLimit(_)));
    }

    #[test]
    fn test_builder_defaults() {
        let client = Client::builder()
            .base_url("https://api.example.com")
            .build()
            .unwrap();

        assert_eq!(client.timeout(), Some(DEFAULT_TIMEOUT));
        assert_eq!(client.default_headers()[ACCEPT], "application/json");
        assert_eq!(
            client.default_headers()[USER_AGENT],
            default_user_agent().as_str()
        );
        assert!(client.retry_policy().is_none());
        assert!(client.rate_limiter().is_none());
    }

    #[test]
    fn test_configured_headers_override_defaults() {
        let client = Client::builder()
            .base_url("https://api.example.com")
            .user_agent("my-app/2.0")
            .header("Accept", "application/xml")
            .build()
            .unwrap();

        assert_eq!(client.default_headers()[USER_AGENT], "my-app/2.0");
        assert_eq!(client.default_headers()[ACCEPT], "application/xml");
    }
}
