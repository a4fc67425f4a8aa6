//! Authentication handling for outbound requests
//!
//! Supports multiple authentication schemes:
//! - Bearer tokens, static or from a [`TokenSource`]
//! - HTTP Basic credentials
//! - API keys in a header or a query parameter
//!
//! Providers run once per attempt, after the request is built and before the
//! middleware chain sees it. Credential headers are marked sensitive so they
//! never show up in `Debug` output.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{HeaderName, HeaderValue, AUTHORIZATION};

use crate::http::transport::WireRequest;

/// Authentication errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Invalid authentication header '{0}'")]
    InvalidHeader(String),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Token source failed: {0}")]
    TokenSource(#[source] anyhow::Error),
}

/// Applies credentials to an outgoing request
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Apply authentication to the request in place
    async fn apply(&self, request: &mut WireRequest) -> Result<(), AuthError>;

    /// Validate that required credentials are available
    fn validate_credentials(&self) -> Result<(), AuthError> {
        Ok(())
    }
}

fn sensitive_value(header: &str, value: &str) -> Result<HeaderValue, AuthError> {
    let mut value =
        HeaderValue::from_str(value).map_err(|_| AuthError::InvalidHeader(header.to_string()))?;
    value.set_sensitive(true);
    Ok(value)
}

fn env_credential(var: &str) -> Result<String, AuthError> {
    std::env::var(var).map_err(|_| AuthError::EnvVarNotFound(var.to_string()))
}

/// `Authorization: Bearer <token>`
#[derive(Debug, Clone)]
pub struct BearerAuth {
    token: String,
}

impl BearerAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Read the token from an environment variable
    pub fn from_env(var: &str) -> Result<Self, AuthError> {
        env_credential(var).map(Self::new)
    }
}

#[async_trait]
impl AuthProvider for BearerAuth {
    async fn apply(&self, request: &mut WireRequest) -> Result<(), AuthError> {
        let value = sensitive_value("Authorization", &format!("Bearer {}", self.token))?;
        request.headers.insert(AUTHORIZATION, value);
        Ok(())
    }

    fn validate_credentials(&self) -> Result<(), AuthError> {
        if self.token.is_empty() {
            return Err(AuthError::MissingCredentials("bearer token is empty".into()));
        }
        Ok(())
    }
}

/// `Authorization: Basic <base64(user:password)>`
#[derive(Debug, Clone)]
pub struct BasicAuth {
    encoded: String,
}

impl BasicAuth {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            encoded: STANDARD.encode(format!("{username}:{password}")),
        }
    }
}

#[async_trait]
impl AuthProvider for BasicAuth {
    async fn apply(&self, request: &mut WireRequest) -> Result<(), AuthError> {
        let value = sensitive_value("Authorization", &format!("Basic {}", self.encoded))?;
        request.headers.insert(AUTHORIZATION, value);
        Ok(())
    }
}

/// An API key sent in a named header
#[derive(Debug, Clone)]
pub struct ApiKeyAuth {
    header: String,
    key: String,
}

impl ApiKeyAuth {
    pub fn new(header: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            key: key.into(),
        }
    }

    /// Read the key from an environment variable
    pub fn from_env(header: impl Into<String>, var: &str) -> Result<Self, AuthError> {
        Ok(Self::new(header, env_credential(var)?))
    }
}

#[async_trait]
impl AuthProvider for ApiKeyAuth {
    async fn apply(&self, request: &mut WireRequest) -> Result<(), AuthError> {
        let name = HeaderName::from_bytes(self.header.as_bytes())
            .map_err(|_| AuthError::InvalidHeader(self.header.clone()))?;
        let value = sensitive_value(&self.header, &self.key)?;
        request.headers.insert(name, value);
        Ok(())
    }

    fn validate_credentials(&self) -> Result<(), AuthError> {
        if self.key.is_empty() {
            return Err(AuthError::MissingCredentials(format!(
                "API key for header {} is empty",
                self.header
            )));
        }
        Ok(())
    }
}

/// An API key sent as a query parameter, replacing any existing value
#[derive(Debug, Clone)]
pub struct ApiKeyQueryAuth {
    param: String,
    key: String,
}

impl ApiKeyQueryAuth {
    pub fn new(param: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            param: param.into(),
            key: key.into(),
        }
    }
}

#[async_trait]
impl AuthProvider for ApiKeyQueryAuth {
    async fn apply(&self, request: &mut WireRequest) -> Result<(), AuthError> {
        let kept: Vec<(String, String)> = request
            .url
            .query_pairs()
            .filter(|(name, _)| name != self.param.as_str())
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect();

        request
            .url
            .query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair(&self.param, &self.key);
        Ok(())
    }
}

/// Supplies bearer tokens on demand, e.g. from a refreshing OAuth flow
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> anyhow::Result<String>;
}

/// Bearer authentication with a token fetched for every attempt
#[derive(Debug, Clone)]
pub struct TokenAuth<S> {
    source: S,
}

impl<S: TokenSource> TokenAuth<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

#[async_trait]
impl<S: TokenSource> AuthProvider for TokenAuth<S> {
    async fn apply(&self, request: &mut WireRequest) -> Result<(), AuthError> {
        let token = self.source.token().await.map_err(AuthError::TokenSource)?;
        let value = sensitive_value("Authorization", &format!("Bearer {token}"))?;
        request.headers.insert(AUTHORIZATION, value);
        Ok(())
    }
}
