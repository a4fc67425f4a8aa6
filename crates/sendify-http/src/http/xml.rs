//! XML and SOAP request bodies, and SOAP response parsing
//!
//! Serialization goes through `quick_xml::se`, so any `Serialize` type can be
//! sent. Its root element is named after the type unless a root wrapper is
//! configured.

use std::fmt;
use std::sync::Arc;

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const CONTENT_TYPE_XML: &str = "application/xml";
pub const CONTENT_TYPE_SOAP11: &str = "text/xml; charset=utf-8";
pub const CONTENT_TYPE_SOAP12: &str = "application/soap+xml; charset=utf-8";

pub const SOAP11_NAMESPACE: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP12_NAMESPACE: &str = "http://www.w3.org/2003/05/soap-envelope";

pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Errors from XML encoding and decoding
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("failed to serialize XML: {0}")]
    Serialize(#[from] quick_xml::SeError),

    #[error("failed to deserialize XML: {0}")]
    Deserialize(#[from] quick_xml::DeError),

    #[error("malformed XML: {0}")]
    Parse(#[from] quick_xml::Error),

    #[error("XML is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("SOAP envelope has no Body element")]
    MissingBody,
}

type XmlSerializer = Arc<dyn Fn() -> Result<String, quick_xml::SeError> + Send + Sync>;

fn serializer<T>(value: T) -> XmlSerializer
where
    T: Serialize + Send + Sync + 'static,
{
    Arc::new(move || quick_xml::se::to_string(&value))
}

/// A value sent as an `application/xml` body
#[derive(Clone)]
pub struct XmlBody {
    serialize: XmlSerializer,
    root: Option<String>,
    declaration: bool,
}

impl XmlBody {
    pub fn new<T>(value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        Self {
            serialize: serializer(value),
            root: None,
            declaration: false,
        }
    }

    /// Wrap the serialized value in `<root>...</root>`
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Prefix the document with an XML declaration
    pub fn with_declaration(mut self) -> Self {
        self.declaration = true;
        self
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>, XmlError> {
        let inner = (self.serialize)()?;
        let mut out = String::with_capacity(inner.len() + 64);
        if self.declaration {
            out.push_str(XML_DECLARATION);
        }
        match &self.root {
            Some(root) => {
                out.push('<');
                out.push_str(root);
                out.push('>');
                out.push_str(&inner);
                out.push_str("</");
                out.push_str(root);
                out.push('>');
            }
            None => out.push_str(&inner),
        }
        Ok(out.into_bytes())
    }
}

impl fmt::Debug for XmlBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XmlBody")
            .field("root", &self.root)
            .field("declaration", &self.declaration)
            .finish_non_exhaustive()
    }
}

/// SOAP protocol version, which fixes the envelope namespace and content type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SoapVersion {
    #[default]
    Soap11,
    Soap12,
}

impl SoapVersion {
    pub fn namespace(self) -> &'static str {
        match self {
            Self::Soap11 => SOAP11_NAMESPACE,
            Self::Soap12 => SOAP12_NAMESPACE,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Soap11 => CONTENT_TYPE_SOAP11,
            Self::Soap12 => CONTENT_TYPE_SOAP12,
        }
    }
}

/// A value sent inside a SOAP envelope
#[derive(Clone)]
pub struct SoapBody {
    serialize: XmlSerializer,
    action: Option<String>,
    version: SoapVersion,
}

impl SoapBody {
    /// A SOAP 1.1 body
    pub fn new<T>(value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        Self {
            serialize: serializer(value),
            action: None,
            version: SoapVersion::Soap11,
        }
    }

    /// A SOAP 1.2 body
    pub fn soap12<T>(value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        Self::new(value).with_version(SoapVersion::Soap12)
    }

    pub fn with_version(mut self, version: SoapVersion) -> Self {
        self.version = version;
        self
    }

    /// Send a `SOAPAction` header with this action
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn version(&self) -> SoapVersion {
        self.version
    }

    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    /// The `SOAPAction` header value: the action in double quotes
    pub(crate) fn action_header(&self) -> Option<String> {
        self.action
            .as_deref()
            .filter(|action| !action.is_empty())
            .map(|action| format!("\"{action}\""))
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>, XmlError> {
        let inner = (self.serialize)()?;
        let envelope = format!(
            "{XML_DECLARATION}\n<soap:Envelope xmlns:soap=\"{}\"><soap:Body>{inner}</soap:Body></soap:Envelope>",
            self.version.namespace()
        );
        Ok(envelope.into_bytes())
    }
}

impl fmt::Debug for SoapBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoapBody")
            .field("action", &self.action)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// A SOAP fault, from either protocol version
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SoapFault {
    pub code: String,
    pub string: String,
    pub detail: String,
}

impl fmt::Display for SoapFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SOAP fault {}: {}", self.code, self.string)
    }
}

/// Extract a fault from a SOAP envelope.
///
/// Returns `None` for non-fault envelopes and for anything that is not
/// well-formed XML.
pub fn parse_soap_fault(body: &[u8]) -> Option<SoapFault> {
    let text = std::str::from_utf8(body).ok()?;
    if !text.contains("Fault") {
        return None;
    }

    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut fault = SoapFault::default();

    loop {
        let value = match reader.read_event() {
            Ok(Event::Start(e)) => {
                path.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                continue;
            }
            Ok(Event::End(_)) => {
                path.pop();
                continue;
            }
            Ok(Event::Text(e)) => e.unescape().ok()?.into_owned(),
            Ok(Event::CData(e)) => String::from_utf8_lossy(&e.into_inner()).into_owned(),
            Ok(Event::Eof) => break,
            Ok(_) => continue,
            Err(_) => return None,
        };

        let Some(fault_at) = path.iter().position(|name| name == "Fault") else {
            continue;
        };
        if fault_at == 0 || path[fault_at - 1] != "Body" {
            continue;
        }
        let inner: Vec<&str> = path[fault_at + 1..].iter().map(String::as_str).collect();
        match inner.as_slice() {
            ["faultcode"] | ["Code", "Value"] => fault.code = value,
            ["faultstring"] | ["Reason", "Text"] => fault.string = value,
            ["detail"] => fault.detail = value,
            _ => {}
        }
    }

    if fault.code.is_empty() && fault.string.is_empty() {
        None
    } else {
        Some(fault)
    }
}

/// Deserialize the first element inside a SOAP envelope's `Body`
pub fn parse_soap_response<T: DeserializeOwned>(body: &[u8]) -> Result<T, XmlError> {
    let text = std::str::from_utf8(body)?;
    let mut reader = Reader::from_str(text);

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"Body" => {
                let end = e.to_end().into_owned();
                let span = reader.read_to_end(end.name())?;
                let inner = &text[span.start as usize..span.end as usize];
                return Ok(quick_xml::de::from_str(inner.trim())?);
            }
            Event::Eof => return Err(XmlError::MissingBody),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize)]
    struct GetUser {
        id: u32,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct GetUserResponse {
        name: String,
        email: String,
    }

    #[test]
    fn test_plain_xml_body() {
        let encoded = XmlBody::new(GetUser { id: 7 }).encode().unwrap();
        assert_eq!(
            String::from_utf8(encoded).unwrap(),
            "<GetUser><id>7</id></GetUser>"
        );
    }

    #[test]
    fn test_xml_body_with_root_and_declaration() {
        let encoded = XmlBody::new(GetUser { id: 7 })
            .with_root("Request")
            .with_declaration()
            .encode()
            .unwrap();
        assert_eq!(
            String::from_utf8(encoded).unwrap(),
            format!("{XML_DECLARATION}<Request><GetUser><id>7</id></GetUser></Request>")
        );
    }

    #[test]
    fn test_soap11_envelope() {
        let body = SoapBody::new(GetUser { id: 1 }).with_action("urn:GetUser");
        let encoded = String::from_utf8(body.encode().unwrap()).unwrap();

        assert!(encoded.starts_with(XML_DECLARATION));
        assert!(encoded.contains(&format!("xmlns:soap=\"{SOAP11_NAMESPACE}\"")));
        assert!(encoded.contains("<soap:Body><GetUser><id>1</id></GetUser></soap:Body>"));
        assert_eq!(body.action_header().as_deref(), Some("\"urn:GetUser\""));
        assert_eq!(body.version().content_type(), CONTENT_TYPE_SOAP11);
    }

    #[test]
    fn test_soap12_envelope() {
        let body = SoapBody::soap12(GetUser { id: 1 });
        let encoded = String::from_utf8(body.encode().unwrap()).unwrap();

        assert!(encoded.contains(SOAP12_NAMESPACE));
        assert_eq!(body.version().content_type(), CONTENT_TYPE_SOAP12);
        assert_eq!(body.action_header(), None);
    }

    #[test]
    fn test_parse_soap11_fault() {
        let xml = br#"<?xml version="1.0"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
    <soap:Fault>
      <faultcode>soap:Server</faultcode>
      <faultstring>Internal error</faultstring>
      <detail>Database unavailable</detail>
    </soap:Fault>
  </soap:Body>
</soap:Envelope>"#;

        let fault = parse_soap_fault(xml).unwrap();
        assert_eq!(fault.code, "soap:Server");
        assert_eq!(fault.string, "Internal error");
        assert_eq!(fault.detail, "Database unavailable");
    }

    #[test]
    fn test_parse_soap12_fault() {
        let xml = br#"<env:Envelope xmlns:env="http://www.w3.org/2003/05/soap-envelope">
  <env:Body>
    <env:Fault>
      <env:Code><env:Value>env:Sender</env:Value></env:Code>
      <env:Reason><env:Text xml:lang="en">Bad request</env:Text></env:Reason>
    </env:Fault>
  </env:Body>
</env:Envelope>"#;

        let fault = parse_soap_fault(xml).unwrap();
        assert_eq!(fault.code, "env:Sender");
        assert_eq!(fault.string, "Bad request");
        assert!(fault.detail.is_empty());
    }

    #[test]
    fn test_non_fault_is_none() {
        let xml = br#"<soap:Envelope xmlns:soap="x"><soap:Body><Ok/></soap:Body></soap:Envelope>"#;
        assert_eq!(parse_soap_fault(xml), None);
        assert_eq!(parse_soap_fault(b"<Fault><unclosed>"), None);
        assert_eq!(parse_soap_fault(b"not xml at all, Fault"), None);
    }

    #[test]
    fn test_parse_soap_response() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
    <GetUserResponse>
      <name>Ada</name>
      <email>ada@example.com</email>
    </GetUserResponse>
  </soap:Body>
</soap:Envelope>"#;

        let parsed: GetUserResponse = parse_soap_response(xml).unwrap();
        assert_eq!(
            parsed,
            GetUserResponse {
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_soap_response_without_body() {
        let result: Result<GetUserResponse, _> =
            parse_soap_response(b"<soap:Envelope xmlns:soap=\"x\"></soap:Envelope>");
        assert!(matches!(result, Err(XmlError::MissingBody)));
    }
}
