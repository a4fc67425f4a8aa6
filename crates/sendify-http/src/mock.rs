//! In-memory transport for tests
//!
//! [`MockTransport`] answers requests from registered handlers instead of the
//! network and records every request it sees. Lookup order for a request is:
//! the path's response sequence (until exhausted), then a method+path
//! handler, then a path handler. Anything unmatched fails as a transport
//! error.
//!
//! ```
//! use sendify_http::mock::{MockResponse, MockTransport};
//!
//! let mock = MockTransport::new();
//! mock.add_response("/users", 200, serde_json::json!([{"id": 1}]));
//! mock.add_sequence("/flaky", vec![MockResponse::error(503, "busy"), MockResponse::empty(204)]);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use serde::Serialize;

use crate::http::body::CONTENT_TYPE_JSON;
use crate::http::transport::{Transport, TransportError, WireRequest, WireResponse};

/// Produces a canned answer for a request
pub type MockHandler =
    Arc<dyn Fn(&WireRequest) -> Result<WireResponse, TransportError> + Send + Sync>;

/// A canned response
#[derive(Debug, Clone)]
pub struct MockResponse {
    inner: WireResponse,
}

impl MockResponse {
    /// A response with no body
    pub fn empty(status: u16) -> Self {
        Self {
            inner: WireResponse::new(status_code(status)),
        }
    }

    /// A JSON response; a value that fails to serialize yields
    /// `{"error":"marshal failed"}`
    pub fn json<T: Serialize>(status: u16, body: T) -> Self {
        let bytes = serde_json::to_vec(&body)
            .unwrap_or_else(|_| br#"{"error":"marshal failed"}"#.to_vec());
        Self::empty(status)
            .with_header(CONTENT_TYPE.as_str(), CONTENT_TYPE_JSON)
            .with_body(bytes)
    }

    /// `{"error": message}` with the given status
    pub fn error(status: u16, message: &str) -> Self {
        Self::json(status, serde_json::json!({ "error": message }))
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self::empty(status)
            .with_header(CONTENT_TYPE.as_str(), "text/plain; charset=utf-8")
            .with_body(body.into())
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.inner = self.inner.with_header(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<bytes::Bytes>) -> Self {
        self.inner = self.inner.with_body(body);
        self
    }

    pub fn into_wire(self) -> WireResponse {
        self.inner
    }
}

impl From<MockResponse> for WireResponse {
    fn from(response: MockResponse) -> Self {
        response.inner
    }
}

fn status_code(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

#[derive(Default)]
struct Sequence {
    responses: Vec<WireResponse>,
    next: usize,
}

#[derive(Default)]
struct MockState {
    handlers: HashMap<String, MockHandler>,
    method_routes: HashMap<(Method, String), MockHandler>,
    sequences: HashMap<String, Sequence>,
    requests: Vec<WireRequest>,
}

/// A [`Transport`] serving registered responses
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MockTransport")
            .field("handlers", &state.handlers.len())
            .field("method_routes", &state.method_routes.len())
            .field("sequences", &state.sequences.len())
            .field("requests", &state.requests.len())
            .finish()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answer every request for `path` with `body` as JSON
    pub fn add_response<T: Serialize>(&self, path: &str, status: u16, body: T) {
        let response = MockResponse::json(status, body).into_wire();
        self.add_handler(path, move |_| Ok(response.clone()));
    }

    /// Answer `method` requests for `path` with `body` as JSON
    pub fn add_response_for_method<T: Serialize>(
        &self,
        method: Method,
        path: &str,
        status: u16,
        body: T,
    ) {
        let response = MockResponse::json(status, body).into_wire();
        let handler: MockHandler = Arc::new(move |_| Ok(response.clone()));
        self.lock()
            .method_routes
            .insert((method, path.to_string()), handler);
    }

    pub fn add_handler<F>(&self, path: &str, handler: F)
    where
        F: Fn(&WireRequest) -> Result<WireResponse, TransportError> + Send + Sync + 'static,
    {
        self.lock()
            .handlers
            .insert(path.to_string(), Arc::new(handler));
    }

    /// Answer successive requests for `path` with `responses` in order, then
    /// fall through to the other handlers
    pub fn add_sequence(&self, path: &str, responses: Vec<MockResponse>) {
        let responses = responses.into_iter().map(MockResponse::into_wire).collect();
        self.lock()
            .sequences
            .insert(path.to_string(), Sequence { responses, next: 0 });
    }

    /// Fail every request for `path` as if the connection dropped
    pub fn add_network_error(&self, path: &str, message: &str) {
        let message = message.to_string();
        self.add_handler(path, move |_| {
            Err(TransportError::Connection(message.clone()))
        });
    }

    /// Every request seen, oldest first
    pub fn requests(&self) -> Vec<WireRequest> {
        self.lock().requests.clone()
    }

    pub fn last_request(&self) -> Option<WireRequest> {
        self.lock().requests.last().cloned()
    }

    pub fn call_count(&self, path: &str) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|request| request.url.path() == path)
            .count()
    }

    pub fn was_called(&self, path: &str) -> bool {
        self.call_count(path) > 0
    }

    /// Forget recorded requests and rewind every sequence
    pub fn reset(&self) {
        let mut state = self.lock();
        state.requests.clear();
        for sequence in state.sequences.values_mut() {
            sequence.next = 0;
        }
    }

    fn route(&self, request: &WireRequest) -> Result<WireResponse, TransportError> {
        let path = request.url.path().to_string();
        let handler = {
            let mut state = self.lock();
            state.requests.push(request.clone());

            if let Some(sequence) = state.sequences.get_mut(&path) {
                if let Some(response) = sequence.responses.get(sequence.next).cloned() {
                    sequence.next += 1;
                    return Ok(response);
                }
            }

            state
                .method_routes
                .get(&(request.method.clone(), path.clone()))
                .or_else(|| state.handlers.get(&path))
                .cloned()
        };

        match handler {
            Some(handler) => handler(request),
            None => Err(TransportError::Other(format!(
                "mock: no handler registered for {} {}",
                request.method, path
            ))),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: WireRequest) -> Result<WireResponse, TransportError> {
        self.route(&request)
    }
}
