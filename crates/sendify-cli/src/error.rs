//! Error types and handling for the CLI
//!
//! This module provides error types and utilities for handling
//! various failure modes in the CLI application.

use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;

use sendify_http::{ErrorKind, HttpError};

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for CLI operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Client could not be configured
    #[error(transparent)]
    Client(#[from] sendify_http::Error),

    /// The request itself failed
    #[error(transparent)]
    Request(#[from] HttpError),

    /// File not found
    #[error("File not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// Invalid file format
    #[error("Invalid file format for {}: {}", path.display(), message)]
    InvalidFormat { path: PathBuf, message: String },

    /// Invalid argument value or combination
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create an invalid arguments error
    pub fn invalid_args(message: impl Into<String>) -> Self {
        Self::InvalidArgs(message.into())
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Io(_) => 1,
            Self::FileNotFound { .. } => 3,
            Self::InvalidFormat { .. } => 4,
            Self::Client(_) => 5,
            Self::InvalidArgs(_) => 6,
            Self::Json(_) => 12,
            Self::Request(err) => match err.kind() {
                ErrorKind::Timeout => 20,
                ErrorKind::Network => 21,
                ErrorKind::Http => 22,
                ErrorKind::Parse => 23,
                ErrorKind::RateLimit => 24,
                ErrorKind::Unknown => 25,
            },
            Self::Other(_) => 99,
        }
    }

    /// Check if this error should display usage help
    pub fn should_show_help(&self) -> bool {
        matches!(self, Self::InvalidArgs(_))
    }
}

/// Format an error and its causes for display to the user
pub fn format_error(error: &Error) -> String {
    let mut message = format!("Error: {error}");
    if let Error::Request(err) = error {
        message.push_str(&format!(" [{}]", err.kind()));
    }

    let mut source = error.source();
    // an HttpError already prints its direct cause
    if matches!(error, Error::Request(_)) {
        source = source.and_then(StdError::source);
    }
    while let Some(cause) = source {
        message.push_str(&format!("\n  caused by: {cause}"));
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let errors = [
            Error::Io(io::Error::new(io::ErrorKind::Other, "disk")),
            Error::FileNotFound {
                path: PathBuf::from("missing.toml"),
            },
            Error::InvalidFormat {
                path: PathBuf::from("bad.toml"),
                message: "expected table".into(),
            },
            Error::Client(sendify_http::Error::configuration("base URL is required")),
            Error::invalid_args("bad header"),
            Error::Other(anyhow::anyhow!("boom")),
        ];
        let mut codes: Vec<i32> = errors.iter().map(Error::exit_code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_only_invalid_args_shows_help() {
        assert!(Error::invalid_args("x").should_show_help());
        assert!(!Error::Other(anyhow::anyhow!("x")).should_show_help());
    }

    #[test]
    fn test_format_error_includes_causes() {
        let inner = io::Error::new(io::ErrorKind::NotFound, "no such file");
        let error = Error::Other(anyhow::Error::new(inner).context("reading body file"));
        let formatted = format_error(&error);
        assert!(formatted.starts_with("Error: reading body file"));
        assert!(formatted.contains("caused by: no such file"));
    }
}
