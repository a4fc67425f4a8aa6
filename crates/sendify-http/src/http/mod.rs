//! HTTP client implementation
//!
//! This module provides a resilient outbound HTTP client with:
//! - A shared token-bucket rate limiter
//! - Retry with exponential backoff, jitter and `Retry-After`
//! - An onion-ordered middleware chain around a pluggable transport
//! - JSON, form, XML and SOAP request bodies
//! - Classified errors for callers to branch on

pub mod auth;
pub mod body;
pub mod client;
pub mod error;
pub mod middleware;
pub mod rate_limit;
pub mod redact;
pub mod request;
pub mod response;
pub mod retry;
pub mod transport;
pub mod xml;

pub use auth::{
    ApiKeyAuth, ApiKeyQueryAuth, AuthError, AuthProvider, BasicAuth, BearerAuth, TokenAuth,
    TokenSource,
};
pub use body::{Body, EncodeError, EncodedBody, JsonBody};
pub use client::{Client, ClientBuilder};
pub use error::{classify_transport, ErrorKind, HttpError};
pub use middleware::{from_fn, LoggingMiddleware, Middleware, Next, RequestIdMiddleware};
pub use rate_limit::{RateLimitConfig, RateLimitError, RateLimiter};
pub use redact::{LogBodyConfig, RedactionPolicy};
pub use request::{Request, RequestBuilder};
pub use response::Response;
pub use retry::{RetryDecision, RetryPolicy};
pub use transport::{ReqwestTransport, Transport, TransportError, WireRequest, WireResponse};
pub use xml::{parse_soap_fault, parse_soap_response, SoapBody, SoapFault, SoapVersion, XmlBody, XmlError};

// Re-export commonly used types
pub use reqwest::{Method, StatusCode};
