//! Error types for client construction and configuration
//!
//! Failures of an individual request are reported through
//! [`HttpError`](crate::http::HttpError); this module covers everything that
//! can go wrong before a request is ever issued.

use thiserror::Error;

use crate::http::rate_limit::RateLimitError;

/// Main error type for building and configuring clients
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration values
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// The base URL could not be parsed
    #[error("Invalid base URL '{url}': {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// A header name or value is not valid on the wire
    #[error("Invalid header '{name}': {message}")]
    InvalidHeader { name: String, message: String },

    /// Rate limiter construction failed
    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    /// The default transport could not be created
    #[error("Failed to create HTTP transport: {0}")]
    Transport(#[source] reqwest::Error),
}

/// Convenience type alias for Results using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a configuration error without an underlying cause
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn invalid_header(name: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidHeader {
            name: name.into(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_display() {
        let err = Error::configuration("base URL is required");
        assert_eq!(err.to_string(), "Configuration error: base URL is required");
    }

    #[test]
    fn test_invalid_header_display() {
        let err = Error::invalid_header("X Bad", "invalid HTTP header name");
        assert_eq!(
            err.to_string(),
            "Invalid header 'X Bad': invalid HTTP header name"
        );
    }

    #[test]
    fn test_invalid_base_url_keeps_source() {
        let source = url::Url::parse("://invalid").unwrap_err();
        let err = Error::InvalidBaseUrl {
            url: "://invalid".to_string(),
            source,
        };
        assert!(err.to_string().contains("://invalid"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
