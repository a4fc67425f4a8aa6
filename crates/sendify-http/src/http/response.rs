//! Buffered HTTP responses

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use url::Url;

use crate::http::transport::WireResponse;
use crate::http::xml::{parse_soap_fault, parse_soap_response, SoapFault, XmlError};

/// A completed response with its body read in full
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    status_text: String,
    headers: HeaderMap,
    body: Bytes,
    url: Url,
    attempts: u32,
}

impl Response {
    pub(crate) fn from_wire(wire: WireResponse, url: Url, attempts: u32) -> Self {
        let status_text = match wire.status.canonical_reason() {
            Some(reason) => format!("{} {}", wire.status.as_u16(), reason),
            None => wire.status.as_u16().to_string(),
        };
        Self {
            status: wire.status,
            status_text,
            headers: wire.headers,
            body: wire.body,
            url,
            attempts,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Status line text, e.g. `503 Service Unavailable`
    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The final request URL, including query parameters
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Number of attempts made to obtain this response
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Body decoded as UTF-8, with invalid sequences replaced
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn xml<T: DeserializeOwned>(&self) -> Result<T, XmlError> {
        let text = std::str::from_utf8(&self.body)?;
        Ok(quick_xml::de::from_str(text)?)
    }

    /// Deserialize the payload inside a SOAP envelope
    pub fn soap<T: DeserializeOwned>(&self) -> Result<T, XmlError> {
        parse_soap_response(&self.body)
    }

    pub fn soap_fault(&self) -> Option<SoapFault> {
        parse_soap_fault(&self.body)
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_client_error(&self) -> bool {
        self.status.is_client_error()
    }

    pub fn is_server_error(&self) -> bool {
        self.status.is_server_error()
    }
}
