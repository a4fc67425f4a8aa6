//! Request bodies and their one-time encoding
//!
//! A [`Body`] is encoded exactly once per logical request into an
//! [`EncodedBody`]; every attempt then sends the same immutable bytes.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;

use crate::http::xml::{SoapBody, XmlBody, XmlError, CONTENT_TYPE_XML};

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";

/// Errors raised while encoding a request body
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("failed to encode JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error("invalid body header '{name}'")]
    InvalidHeader { name: String },
}

type JsonSerializer = Arc<dyn Fn() -> Result<Vec<u8>, serde_json::Error> + Send + Sync>;

/// A value serialized as JSON when the request is sent
#[derive(Clone)]
pub struct JsonBody {
    serialize: JsonSerializer,
}

impl JsonBody {
    pub fn new<T>(value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        Self {
            serialize: Arc::new(move || serde_json::to_vec(&value)),
        }
    }
}

/// Request payload variants
#[derive(Clone)]
pub enum Body {
    /// Raw bytes, sent as-is without a content type hint
    Bytes(Bytes),
    /// Text, sent as-is without a content type hint
    Text(String),
    /// `application/x-www-form-urlencoded` pairs
    Form(Vec<(String, String)>),
    Json(JsonBody),
    Xml(XmlBody),
    Soap(SoapBody),
}

impl Body {
    pub fn bytes(bytes: impl Into<Bytes>) -> Self {
        Self::Bytes(bytes.into())
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn json<T>(value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        Self::Json(JsonBody::new(value))
    }

    pub fn form<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Form(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Encode to bytes plus an optional content type hint and extra headers
    pub fn encode(&self) -> Result<EncodedBody, EncodeError> {
        let encoded = match self {
            Self::Bytes(bytes) => EncodedBody::new(bytes.clone(), None),
            Self::Text(text) => EncodedBody::new(Bytes::from(text.clone()), None),
            Self::Form(pairs) => {
                let encoded = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(pairs)
                    .finish();
                EncodedBody::new(Bytes::from(encoded), Some(CONTENT_TYPE_FORM))
            }
            Self::Json(json) => {
                let bytes = (json.serialize)()?;
                EncodedBody::new(Bytes::from(bytes), Some(CONTENT_TYPE_JSON))
            }
            Self::Xml(xml) => EncodedBody::new(Bytes::from(xml.encode()?), Some(CONTENT_TYPE_XML)),
            Self::Soap(soap) => {
                let mut encoded = EncodedBody::new(
                    Bytes::from(soap.encode()?),
                    Some(soap.version().content_type()),
                );
                if let Some(action) = soap.action_header() {
                    let value = HeaderValue::from_str(&action).map_err(|_| {
                        EncodeError::InvalidHeader {
                            name: "SOAPAction".to_string(),
                        }
                    })?;
                    encoded
                        .headers
                        .insert(HeaderName::from_static("soapaction"), value);
                }
                encoded
            }
        };
        Ok(encoded)
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => write!(f, "Body::Bytes({} bytes)", bytes.len()),
            Self::Text(text) => write!(f, "Body::Text({} bytes)", text.len()),
            Self::Form(pairs) => write!(f, "Body::Form({} pairs)", pairs.len()),
            Self::Json(_) => f.write_str("Body::Json"),
            Self::Xml(xml) => write!(f, "Body::{xml:?}"),
            Self::Soap(soap) => write!(f, "Body::{soap:?}"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Self::json(value)
    }
}

impl From<XmlBody> for Body {
    fn from(xml: XmlBody) -> Self {
        Self::Xml(xml)
    }
}

impl From<SoapBody> for Body {
    fn from(soap: SoapBody) -> Self {
        Self::Soap(soap)
    }
}

/// The encoded form of a [`Body`]
#[derive(Debug, Clone)]
pub struct EncodedBody {
    pub bytes: Bytes,
    /// Content type implied by the body kind, if any
    pub content_type: Option<&'static str>,
    /// Headers the body kind requires, such as `SOAPAction`
    pub headers: HeaderMap,
}

impl EncodedBody {
    fn new(bytes: Bytes, content_type: Option<&'static str>) -> Self {
        Self {
            bytes,
            content_type,
            headers: HeaderMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::xml::CONTENT_TYPE_SOAP11;
    use serde_json::json;

    #[test]
    fn test_bytes_and_text_have_no_hint() {
        let encoded = Body::from(vec![1u8, 2, 3]).encode().unwrap();
        assert_eq!(encoded.bytes.as_ref(), &[1, 2, 3]);
        assert_eq!(encoded.content_type, None);

        let encoded = Body::from("hello").encode().unwrap();
        assert_eq!(encoded.bytes, "hello");
        assert_eq!(encoded.content_type, None);
    }

    #[test]
    fn test_json_body() {
        let encoded = Body::json(json!({"name": "Ada"})).encode().unwrap();
        assert_eq!(encoded.bytes, r#"{"name":"Ada"}"#);
        assert_eq!(encoded.content_type, Some(CONTENT_TYPE_JSON));
    }

    #[test]
    fn test_form_body() {
        let encoded = Body::form([("q", "rust lang"), ("page", "2")])
            .encode()
            .unwrap();
        assert_eq!(encoded.bytes, "q=rust+lang&page=2");
        assert_eq!(encoded.content_type, Some(CONTENT_TYPE_FORM));
    }

    #[test]
    fn test_soap_body_sets_action_header() {
        #[derive(Serialize)]
        struct Ping;

        let encoded = Body::from(SoapBody::new(Ping).with_action("urn:Ping"))
            .encode()
            .unwrap();
        assert_eq!(encoded.content_type, Some(CONTENT_TYPE_SOAP11));
        assert_eq!(encoded.headers["soapaction"], "\"urn:Ping\"");
    }

    #[test]
    fn test_json_failure_is_reported() {
        use std::collections::HashMap;

        // Non-string map keys cannot be represented in JSON
        let mut map = HashMap::new();
        map.insert((1, 2), "value");
        assert!(matches!(
            Body::json(map).encode(),
            Err(EncodeError::Json(_))
        ));
    }

    #[test]
    fn test_encoding_is_repeatable() {
        let body = Body::json(json!({"id": 1}));
        let first = body.encode().unwrap();
        let second = body.clone().encode().unwrap();
        assert_eq!(first.bytes, second.bytes);
    }
}
