//! Logical requests and the fluent request builder

use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::context::RequestContext;
use crate::http::body::Body;
use crate::http::client::Client;
use crate::http::error::HttpError;
use crate::http::response::Response;
use crate::http::xml::{SoapBody, XmlBody};

/// A logical request: what the caller wants, before it is turned into wire
/// requests
#[derive(Debug, Clone)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) body: Option<Body>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) content_type: Option<String>,
}

impl Request {
    /// A request for `path`, resolved against the client's base URL
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: Vec::new(),
            query: Vec::new(),
            timeout: None,
            content_type: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set a header for this request only; it overrides client defaults
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Append a query parameter
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Override the client timeout; the budget spans every attempt
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the content type implied by the body
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }
}

/// Fluent builder for a request issued through a [`Client`]
#[derive(Debug)]
#[must_use = "a RequestBuilder does nothing until it is sent"]
pub struct RequestBuilder<'a> {
    client: &'a Client,
    request: Request,
}

impl<'a> RequestBuilder<'a> {
    pub(crate) fn new(client: &'a Client, method: Method, path: impl Into<String>) -> Self {
        Self {
            client,
            request: Request::new(method, path),
        }
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request = self.request.with_query(name, value);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request = self.request.with_header(name, value);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.request = self.request.with_timeout(timeout);
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.request = self.request.with_content_type(content_type);
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.request = self.request.with_body(body);
        self
    }

    /// Send `value` serialized as JSON
    pub fn json<T>(self, value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        self.body(Body::json(value))
    }

    /// Send URL-encoded form pairs
    pub fn form<I, K, V>(self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.body(Body::form(pairs))
    }

    pub fn xml(self, xml: XmlBody) -> Self {
        self.body(xml)
    }

    pub fn soap(self, soap: SoapBody) -> Self {
        self.body(soap)
    }

    /// The logical request built so far
    pub fn build(self) -> Request {
        self.request
    }

    pub async fn send(self, ctx: &RequestContext) -> Result<Response, HttpError> {
        self.client.execute(ctx, self.request).await
    }

    /// Send, then decode a non-empty body as JSON
    pub async fn send_json<T: DeserializeOwned>(
        self,
        ctx: &RequestContext,
    ) -> Result<(Response, Option<T>), HttpError> {
        self.client.execute_json(ctx, self.request).await
    }
}
