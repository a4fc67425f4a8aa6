//! HTTP error classification
//!
//! Every failed request surfaces as one [`HttpError`] whose [`ErrorKind`]
//! tells callers what went wrong without inspecting the cause chain. HTTP
//! errors carry the final response, so status, headers and body stay
//! available to the caller.

use std::error::Error as StdError;
use std::fmt;

use reqwest::header::HeaderMap;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::context::ContextError;
use crate::http::response::Response;
use crate::http::retry::DEFAULT_RETRYABLE_STATUSES;
use crate::http::transport::TransportError;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Classification of request failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Anything not covered below, including body encoding failures
    Unknown,
    /// The request deadline passed
    Timeout,
    /// Connection failures and cancellation
    Network,
    /// The server answered with status >= 400
    Http,
    /// A successful response could not be decoded
    Parse,
    /// The rate limiter refused admission
    RateLimit,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Http => "http",
            Self::Parse => "parse",
            Self::RateLimit => "rate_limit",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified request failure
#[derive(Debug)]
pub struct HttpError {
    kind: ErrorKind,
    method: Method,
    url: String,
    attempts: u32,
    response: Option<Box<Response>>,
    source: Option<BoxError>,
}

impl HttpError {
    pub(crate) fn new(kind: ErrorKind, method: Method, url: impl Into<String>) -> Self {
        Self {
            kind,
            method,
            url: url.into(),
            attempts: 0,
            response: None,
            source: None,
        }
    }

    pub(crate) fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub(crate) fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub(crate) fn with_response(mut self, response: Option<Response>) -> Self {
        self.response = response.map(Box::new);
        self
    }

    /// An HTTP error for a response with status >= 400
    pub(crate) fn from_response(method: Method, response: Response) -> Self {
        Self::new(ErrorKind::Http, method, response.url().as_str())
            .with_attempts(response.attempts())
            .with_response(Some(response))
    }

    /// A failure where no response was produced
    pub(crate) fn from_transport(
        method: Method,
        url: impl Into<String>,
        attempts: u32,
        err: TransportError,
    ) -> Self {
        Self::new(classify_transport(&err), method, url)
            .with_attempts(attempts)
            .with_source(err)
    }

    pub(crate) fn from_context(
        method: Method,
        url: impl Into<String>,
        attempts: u32,
        err: ContextError,
    ) -> Self {
        Self::new(classify_context(err), method, url)
            .with_attempts(attempts)
            .with_source(err)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Attempts made before giving up; 0 if none were made
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The last response received, if any
    pub fn response(&self) -> Option<&Response> {
        self.response.as_deref()
    }

    pub fn into_response(self) -> Option<Response> {
        self.response.map(|response| *response)
    }

    /// Status code of the response for HTTP errors
    pub fn status_code(&self) -> Option<u16> {
        self.response().map(Response::status_code)
    }

    pub fn status_text(&self) -> Option<&str> {
        self.response().map(Response::status_text)
    }

    pub fn headers(&self) -> Option<&HeaderMap> {
        self.response().map(Response::headers)
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.response().map(|response| response.body().as_ref())
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::Timeout
    }

    pub fn is_network(&self) -> bool {
        self.kind == ErrorKind::Network
    }

    pub fn is_http(&self) -> bool {
        self.kind == ErrorKind::Http
    }

    pub fn is_parse(&self) -> bool {
        self.kind == ErrorKind::Parse
    }

    pub fn is_rate_limit(&self) -> bool {
        self.kind == ErrorKind::RateLimit
    }

    /// Whether a caller could reasonably try again
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            ErrorKind::Timeout | ErrorKind::Network => true,
            ErrorKind::Http => self
                .status_code()
                .is_some_and(|status| DEFAULT_RETRYABLE_STATUSES.contains(&status)),
            _ => false,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status_code()
            .is_some_and(|status| (400..500).contains(&status))
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code()
            .is_some_and(|status| (500..600).contains(&status))
    }

    /// Whether the status code is any of `codes`
    pub fn is_status(&self, codes: &[u16]) -> bool {
        self.status_code()
            .is_some_and(|status| codes.contains(&status))
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.source, self.status_text()) {
            (Some(source), _) => write!(f, "{} {}: {}", self.method, self.url, source),
            (None, Some(status)) => write!(f, "{} {}: {}", self.method, self.url, status),
            (None, None) => write!(f, "{} {}: {} error", self.method, self.url, self.kind),
        }
    }
}

impl StdError for HttpError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn StdError + 'static))
    }
}

fn classify_context(err: ContextError) -> ErrorKind {
    match err {
        ContextError::DeadlineExceeded => ErrorKind::Timeout,
        ContextError::Cancelled => ErrorKind::Network,
    }
}

/// Map a transport failure onto an [`ErrorKind`]
pub fn classify_transport(err: &TransportError) -> ErrorKind {
    match err {
        TransportError::Context(cause) => classify_context(*cause),
        TransportError::Request(err) if err.is_timeout() => ErrorKind::Timeout,
        TransportError::Request(err) if err.is_connect() || err.is_request() || err.is_body() => {
            ErrorKind::Network
        }
        TransportError::Connection(_) => ErrorKind::Network,
        _ => ErrorKind::Unknown,
    }
}
