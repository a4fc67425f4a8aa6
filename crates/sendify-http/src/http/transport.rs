//! The transport seam
//!
//! Everything above this module works with [`WireRequest`] and
//! [`WireResponse`]; a [`Transport`] is whatever moves one across the network
//! and brings the other back. Response bodies are buffered in full, so a
//! response can be inspected by middleware, retried against and decoded
//! without anyone racing to drain a stream.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use url::Url;

use crate::context::ContextError;

/// A fully-built outbound request, rebuilt fresh for every attempt
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl WireRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// First value of header `name` if it is valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// The request path plus query, as it would appear on the request line
    pub fn path_and_query(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        }
    }
}

/// A response with its body read to completion
#[derive(Debug, Clone)]
pub struct WireResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl WireResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Add a header. Names or values that are not valid on the wire are
    /// ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

/// Failures below the HTTP status line: no response was produced
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(transparent)]
    Request(#[from] reqwest::Error),

    /// The request's context ended while the attempt was in flight
    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("middleware failed: {0}")]
    Middleware(#[source] anyhow::Error),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Request(err) => err.is_timeout(),
            Self::Context(err) => *err == ContextError::DeadlineExceeded,
            _ => false,
        }
    }
}

/// Moves a [`WireRequest`] across the network
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: WireRequest) -> Result<WireResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: WireRequest) -> Result<WireResponse, TransportError> {
        (**self).send(request).await
    }
}

/// The production transport backed by a pooled `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client })
    }

    /// Wrap an existing client, keeping its pool and TLS settings
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: WireRequest) -> Result<WireResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(WireResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_response_builder() {
        let response = WireResponse::new(StatusCode::TOO_MANY_REQUESTS)
            .with_header("Retry-After", "2")
            .with_header("bad header", "ignored")
            .with_body("slow down");

        assert_eq!(response.header("retry-after"), Some("2"));
        assert_eq!(response.headers.len(), 1);
        assert_eq!(response.body, Bytes::from_static(b"slow down"));
    }

    #[test]
    fn test_path_and_query() {
        let url = Url::parse("https://api.example.com/v1/users?page=2").unwrap();
        let request = WireRequest::new(Method::GET, url);
        assert_eq!(request.path_and_query(), "/v1/users?page=2");
    }

    #[test]
    fn test_context_timeout_is_timeout() {
        assert!(TransportError::Context(ContextError::DeadlineExceeded).is_timeout());
        assert!(!TransportError::Context(ContextError::Cancelled).is_timeout());
        assert!(!TransportError::Connection("refused".into()).is_timeout());
    }
}
