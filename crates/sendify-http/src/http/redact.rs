//! Sensitive data redaction for request/response logging
//!
//! A [`RedactionPolicy`] decides which header names and query parameters are
//! sensitive. Body logging is bounded: binary and oversized payloads are
//! summarised by size, and JSON payloads have long strings replaced and
//! sensitive keys masked.

use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use reqwest::header::HeaderMap;
use serde_json::Value;
use url::Url;

/// Replacement text for redacted values
pub const REDACTED: &str = "[REDACTED]";

/// Header names always treated as sensitive (case-insensitive)
pub const DEFAULT_SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "proxy-authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
    "x-auth-token",
];

/// Substrings that mark a header or query parameter name as sensitive
pub const DEFAULT_SENSITIVE_PATTERNS: &[&str] = &["token", "secret", "password", "key"];

/// Content type prefixes whose bodies are never logged verbatim
pub const BINARY_CONTENT_TYPES: &[&str] = &[
    "image/",
    "video/",
    "audio/",
    "application/octet-stream",
    "application/pdf",
    "application/zip",
    "application/gzip",
    "application/x-tar",
];

/// Which names are sensitive
#[derive(Debug, Clone)]
pub struct RedactionPolicy {
    headers: HashSet<String>,
    patterns: Vec<String>,
}

impl Default for RedactionPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_SENSITIVE_HEADERS.iter().copied(),
            DEFAULT_SENSITIVE_PATTERNS.iter().copied(),
        )
    }
}

impl RedactionPolicy {
    /// Build a policy from exact header names and name substrings
    pub fn new<H, P>(headers: H, patterns: P) -> Self
    where
        H: IntoIterator,
        H::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        Self {
            headers: headers
                .into_iter()
                .map(|h| h.as_ref().to_ascii_lowercase())
                .collect(),
            patterns: patterns
                .into_iter()
                .map(|p| p.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    /// A policy that redacts nothing
    pub fn none() -> Self {
        Self::new(std::iter::empty::<&str>(), std::iter::empty::<&str>())
    }

    pub fn with_header(mut self, name: impl AsRef<str>) -> Self {
        self.headers.insert(name.as_ref().to_ascii_lowercase());
        self
    }

    pub fn with_pattern(mut self, pattern: impl AsRef<str>) -> Self {
        self.patterns.push(pattern.as_ref().to_ascii_lowercase());
        self
    }

    /// Whether a header, query parameter or JSON key name is sensitive
    pub fn is_sensitive(&self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        self.headers.contains(&name) || self.patterns.iter().any(|p| name.contains(p.as_str()))
    }

    /// Header map rendered for logging, sensitive values masked
    pub fn redact_headers(&self, headers: &HeaderMap) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for name in headers.keys() {
            let value = if self.is_sensitive(name.as_str()) {
                REDACTED.to_string()
            } else {
                headers
                    .get_all(name)
                    .iter()
                    .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            out.insert(name.as_str().to_string(), value);
        }
        out
    }

    /// URL rendered for logging with sensitive query values masked
    pub fn redact_url(&self, url: &Url) -> String {
        let sensitive = url.query_pairs().any(|(name, _)| self.is_sensitive(&name));
        if !sensitive {
            return url.to_string();
        }

        let query = url
            .query_pairs()
            .map(|(name, value)| {
                let value = if self.is_sensitive(&name) {
                    REDACTED.to_string()
                } else {
                    value.into_owned()
                };
                format!("{name}={value}")
            })
            .collect::<Vec<_>>()
            .join("&");

        let mut base = url.clone();
        base.set_query(None);
        base.set_fragment(None);
        format!("{base}?{query}")
    }

    /// Mask sensitive keys anywhere in a JSON document
    pub fn redact_json(&self, value: &mut Value) {
        match value {
            Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    if self.is_sensitive(key) {
                        *val = Value::String(REDACTED.to_string());
                    } else {
                        self.redact_json(val);
                    }
                }
            }
            Value::Array(items) => {
                for item in items.iter_mut() {
                    self.redact_json(item);
                }
            }
            _ => {}
        }
    }
}

/// Limits applied when logging bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogBodyConfig {
    /// Bodies larger than this are summarised by size
    pub max_body_size: usize,
    /// JSON string values longer than this are summarised by size
    pub max_string_value: usize,
}

impl Default for LogBodyConfig {
    fn default() -> Self {
        Self {
            max_body_size: 4096,
            max_string_value: 1024,
        }
    }
}

/// Whether a content type names a binary payload
pub fn is_binary_content_type(content_type: &str) -> bool {
    let content_type = content_type.trim().to_ascii_lowercase();
    BINARY_CONTENT_TYPES
        .iter()
        .any(|binary| content_type.starts_with(binary))
}

/// Render a body for a log line, or `None` if it is empty
pub fn format_body_for_log(
    body: &[u8],
    content_type: &str,
    policy: &RedactionPolicy,
    config: &LogBodyConfig,
) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    if is_binary_content_type(content_type) {
        return Some(format!("[binary: {}]", format_bytes(body.len())));
    }
    if body.len() > config.max_body_size {
        return Some(format!("[body: {} truncated]", format_bytes(body.len())));
    }

    if content_type.to_ascii_lowercase().contains("json") {
        if let Ok(mut value) = serde_json::from_slice::<Value>(body) {
            truncate_strings(&mut value, config.max_string_value);
            policy.redact_json(&mut value);
            return Some(value.to_string());
        }
    }

    Some(redact_credentials(&String::from_utf8_lossy(body)))
}

fn truncate_strings(value: &mut Value, max: usize) {
    match value {
        Value::String(s) => {
            if s.len() > max {
                *s = format!("[string: {} truncated]", format_bytes(s.len()));
            }
        }
        Value::Object(map) => map.values_mut().for_each(|v| truncate_strings(v, max)),
        Value::Array(items) => items.iter_mut().for_each(|v| truncate_strings(v, max)),
        _ => {}
    }
}

/// Human-readable byte count: `512B`, `1.5KB`, `2.0MB`
pub fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;
    if bytes >= MB {
        format!("{:.1}MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1}KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes}B")
    }
}

static CREDENTIAL_REGEX: OnceLock<Option<Regex>> = OnceLock::new();

/// Mask `key=value` style credentials in free text
pub fn redact_credentials(input: &str) -> String {
    let regex = CREDENTIAL_REGEX.get_or_init(|| {
        Regex::new(
            r#"(?i)(api[_-]?key|apikey|token|bearer|secret|password|passwd)(["']?\s*[=:]\s*["']?|\s+)([^\s"'&,;]{3,})"#,
        )
        .ok()
    });
    match regex {
        Some(regex) => regex
            .replace_all(input, format!("${{1}}${{2}}{REDACTED}"))
            .into_owned(),
        None => input.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_default_sensitive_names() {
        let policy = RedactionPolicy::default();
        assert!(policy.is_sensitive("Authorization"));
        assert!(policy.is_sensitive("Set-Cookie"));
        assert!(policy.is_sensitive("X-Refresh-Token"));
        assert!(policy.is_sensitive("client_secret"));
        assert!(policy.is_sensitive("api_key"));
        assert!(!policy.is_sensitive("Content-Type"));
        assert!(!policy.is_sensitive("Accept"));
    }

    #[test]
    fn test_redact_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc123"));
        headers.insert("accept", HeaderValue::from_static("application/json"));

        let redacted = RedactionPolicy::default().redact_headers(&headers);
        assert_eq!(redacted["authorization"], REDACTED);
        assert_eq!(redacted["accept"], "application/json");
    }

    #[test]
    fn test_custom_policy() {
        let policy = RedactionPolicy::none().with_header("X-Tenant");
        assert!(policy.is_sensitive("x-tenant"));
        assert!(!policy.is_sensitive("authorization"));
    }

    #[test]
    fn test_redact_url_query() {
        let policy = RedactionPolicy::default();
        let url = Url::parse("https://api.example.com/v1?page=2&api_key=s3cr3t").unwrap();
        let rendered = policy.redact_url(&url);
        assert_eq!(
            rendered,
            "https://api.example.com/v1?page=2&api_key=[REDACTED]"
        );

        let clean = Url::parse("https://api.example.com/v1?page=2").unwrap();
        assert_eq!(policy.redact_url(&clean), clean.to_string());
    }

    #[test]
    fn test_json_body_is_redacted_and_truncated() {
        let body = serde_json::json!({
            "user": "ada",
            "password": "hunter2",
            "bio": "x".repeat(20),
        })
        .to_string();
        let config = LogBodyConfig {
            max_body_size: 4096,
            max_string_value: 5,
        };

        let rendered = format_body_for_log(
            body.as_bytes(),
            "application/json",
            &RedactionPolicy::default(),
            &config,
        )
        .unwrap();
        assert!(rendered.contains(REDACTED));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("[string: 20B truncated]"));
    }

    #[test]
    fn test_binary_body_is_summarised() {
        let body = vec![0u8; 2048];
        let rendered = format_body_for_log(
            &body,
            "image/png",
            &RedactionPolicy::default(),
            &LogBodyConfig::default(),
        );
        assert_eq!(rendered.as_deref(), Some("[binary: 2.0KB]"));
    }

    #[test]
    fn test_large_text_body_is_cut() {
        let body = "a".repeat(100);
        let config = LogBodyConfig {
            max_body_size: 10,
            max_string_value: 10,
        };
        let rendered = format_body_for_log(
            body.as_bytes(),
            "text/plain",
            &RedactionPolicy::default(),
            &config,
        )
        .unwrap();
        assert_eq!(rendered, "[body: 100B truncated]");
    }

    #[test]
    fn test_empty_body_is_not_logged() {
        assert!(format_body_for_log(
            b"",
            "application/json",
            &RedactionPolicy::default(),
            &LogBodyConfig::default()
        )
        .is_none());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(1536), "1.5KB");
        assert_eq!(format_bytes(2 * 1024 * 1024), "2.0MB");
    }

    #[test]
    fn test_redact_credentials_in_text() {
        let redacted = redact_credentials("token=abcdef123 password: hunter2 user=ada");
        assert!(!redacted.contains("abcdef123"));
        assert!(!redacted.contains("hunter2"));
        assert!(redacted.contains("user=ada"));
    }
}
