//! Client configuration from files and the environment
//!
//! [`ClientConfig`] is a plain serde structure mirroring [`ClientBuilder`].
//! It can be deserialized from any format (the CLI uses TOML), loaded from
//! `SENDIFY_*` environment variables, and layered with [`ClientConfig::merge`].
//! Header values may reference environment variables as `${ENV:NAME}`; they
//! are expanded when the config is turned into a builder.

use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::http::client::{Client, ClientBuilder};
use crate::http::retry::RetryPolicy;

pub const ENV_BASE_URL: &str = "SENDIFY_BASE_URL";
pub const ENV_TIMEOUT_MS: &str = "SENDIFY_TIMEOUT_MS";
pub const ENV_USER_AGENT: &str = "SENDIFY_USER_AGENT";
pub const ENV_MAX_ATTEMPTS: &str = "SENDIFY_MAX_ATTEMPTS";
/// `N/SECONDS`, e.g. `10/1` for ten requests per second
pub const ENV_RATE_LIMIT: &str = "SENDIFY_RATE_LIMIT";

/// Serializable client configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: Option<String>,
    pub timeout_ms: Option<u64>,
    pub user_agent: Option<String>,
    pub default_content_type: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub retry: Option<RetrySettings>,
    pub rate_limit: Option<RateLimitSettings>,
}

/// Retry settings; unset fields take [`RetryPolicy::default`] values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: Option<u32>,
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub multiplier: Option<f64>,
    pub jitter: Option<f64>,
    pub retryable_statuses: Option<Vec<u16>>,
}

impl RetrySettings {
    pub fn to_policy(&self) -> RetryPolicy {
        let mut policy = RetryPolicy::default();
        if let Some(max_attempts) = self.max_attempts {
            policy.max_attempts = max_attempts;
        }
        if let Some(ms) = self.initial_delay_ms {
            policy = policy.with_initial_delay(Duration::from_millis(ms));
        }
        if let Some(ms) = self.max_delay_ms {
            policy = policy.with_max_delay(Duration::from_millis(ms));
        }
        if let Some(multiplier) = self.multiplier {
            policy = policy.with_multiplier(multiplier);
        }
        if let Some(jitter) = self.jitter {
            policy = policy.with_jitter(jitter);
        }
        if let Some(statuses) = &self.retryable_statuses {
            policy = policy.with_retryable_statuses(statuses.iter().copied());
        }
        policy
    }

    /// Layer `other` on top of `self` field by field; values set in `other`
    /// win
    pub fn merge(self, other: RetrySettings) -> Self {
        Self {
            max_attempts: other.max_attempts.or(self.max_attempts),
            initial_delay_ms: other.initial_delay_ms.or(self.initial_delay_ms),
            max_delay_ms: other.max_delay_ms.or(self.max_delay_ms),
            multiplier: other.multiplier.or(self.multiplier),
            jitter: other.jitter.or(self.jitter),
            retryable_statuses: other.retryable_statuses.or(self.retryable_statuses),
        }
    }
}

/// `permits` requests per `window_ms` milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub permits: u32,
    pub window_ms: u64,
}

impl RateLimitSettings {
    /// Parse `N/SECONDS`, e.g. `100/60`
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = || {
            Error::configuration(format!(
                "invalid rate limit '{value}': expected N/SECONDS, e.g. 10/1"
            ))
        };
        let (permits, seconds) = value.split_once('/').ok_or_else(invalid)?;
        let permits: u32 = permits.trim().parse().map_err(|_| invalid())?;
        let seconds: f64 = seconds.trim().parse().map_err(|_| invalid())?;
        if permits == 0 || !seconds.is_finite() || seconds <= 0.0 {
            return Err(invalid());
        }
        Ok(Self {
            permits,
            window_ms: (seconds * 1000.0).round() as u64,
        })
    }
}

impl ClientConfig {
    /// Load from the process environment, reading `.env` first if present
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self {
            base_url: lookup(ENV_BASE_URL),
            user_agent: lookup(ENV_USER_AGENT),
            ..Default::default()
        };

        if let Some(value) = lookup(ENV_TIMEOUT_MS) {
            let ms = value.trim().parse::<u64>().map_err(|err| Error::Configuration {
                message: format!("{ENV_TIMEOUT_MS} must be a whole number of milliseconds"),
                source: Some(err.into()),
            })?;
            config.timeout_ms = Some(ms);
        }
        if let Some(value) = lookup(ENV_MAX_ATTEMPTS) {
            let attempts = value.trim().parse::<u32>().map_err(|err| Error::Configuration {
                message: format!("{ENV_MAX_ATTEMPTS} must be a positive integer"),
                source: Some(err.into()),
            })?;
            config.retry = Some(RetrySettings {
                max_attempts: Some(attempts),
                ..Default::default()
            });
        }
        if let Some(value) = lookup(ENV_RATE_LIMIT) {
            config.rate_limit = Some(RateLimitSettings::parse(&value)?);
        }
        Ok(config)
    }

    /// Layer `other` on top of `self`; values set in `other` win
    pub fn merge(mut self, other: ClientConfig) -> Self {
        if other.base_url.is_some() {
            self.base_url = other.base_url;
        }
        if other.timeout_ms.is_some() {
            self.timeout_ms = other.timeout_ms;
        }
        if other.user_agent.is_some() {
            self.user_agent = other.user_agent;
        }
        if other.default_content_type.is_some() {
            self.default_content_type = other.default_content_type;
        }
        self.headers.extend(other.headers);
        self.retry = match (self.retry, other.retry) {
            (Some(base), Some(over)) => Some(base.merge(over)),
            (base, over) => over.or(base),
        };
        if other.rate_limit.is_some() {
            self.rate_limit = other.rate_limit;
        }
        self
    }

    /// A builder carrying every configured value, with header placeholders
    /// expanded
    pub fn into_builder(self) -> Result<ClientBuilder> {
        let mut builder = Client::builder();
        if let Some(base_url) = self.base_url {
            builder = builder.base_url(base_url);
        }
        if let Some(ms) = self.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        if let Some(user_agent) = self.user_agent {
            builder = builder.user_agent(user_agent);
        }
        if let Some(content_type) = self.default_content_type {
            builder = builder.default_content_type(content_type);
        }
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), expand_env_vars(value)?);
        }
        if let Some(retry) = &self.retry {
            builder = builder.retry(retry.to_policy());
        }
        if let Some(limit) = self.rate_limit {
            builder = builder.rate_limit(limit.permits, Duration::from_millis(limit.window_ms));
        }
        Ok(builder)
    }
}

static ENV_PLACEHOLDER: OnceLock<Option<Regex>> = OnceLock::new();

/// Replace every `${ENV:NAME}` in `value` with the variable's value.
///
/// A referenced variable that is not set is a configuration error.
pub fn expand_env_vars(value: &str) -> Result<String> {
    expand_with(value, |name| std::env::var(name).ok())
}

fn expand_with<F>(value: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(re) = ENV_PLACEHOLDER
        .get_or_init(|| Regex::new(r"\$\{ENV:([^}]+)\}").ok())
        .as_ref()
    else {
        return Ok(value.to_string());
    };

    let mut result = String::with_capacity(value.len());
    let mut last = 0;
    for caps in re.captures_iter(value) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let resolved = lookup(name.as_str()).ok_or_else(|| {
            Error::configuration(format!("Environment variable {} not found", name.as_str()))
        })?;
        result.push_str(&value[last..whole.start()]);
        result.push_str(&resolved);
        last = whole.end();
    }
    result.push_str(&value[last..]);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_from_lookup() {
        let config = ClientConfig::from_lookup(lookup(&[
            (ENV_BASE_URL, "https://api.example.com"),
            (ENV_TIMEOUT_MS, "2500"),
            (ENV_MAX_ATTEMPTS, "5"),
            (ENV_RATE_LIMIT, "10/2"),
        ]))
        .unwrap();

        assert_eq!(config.base_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(config.timeout_ms, Some(2500));
        assert_eq!(config.retry.unwrap().max_attempts, Some(5));
        assert_eq!(
            config.rate_limit,
            Some(RateLimitSettings {
                permits: 10,
                window_ms: 2000
            })
        );
    }

    #[test]
    fn test_from_lookup_rejects_bad_numbers() {
        let result = ClientConfig::from_lookup(lookup(&[(ENV_TIMEOUT_MS, "soon")]));
        assert!(matches!(result, Err(Error::Configuration { .. })));
    }

    #[test]
    fn test_parse_rate_limit() {
        assert_eq!(
            RateLimitSettings::parse("100/60").unwrap(),
            RateLimitSettings {
                permits: 100,
                window_ms: 60_000
            }
        );
        assert_eq!(RateLimitSettings::parse("5/0.5").unwrap().window_ms, 500);
        assert!(RateLimitSettings::parse("0/1").is_err());
        assert!(RateLimitSettings::parse("10").is_err());
        assert!(RateLimitSettings::parse("10/0").is_err());
        assert!(RateLimitSettings::parse("ten/1").is_err());
    }

    #[test]
    fn test_expand_env_placeholders() {
        let vars = lookup(&[("API_TOKEN", "s3cr3t"), ("TENANT", "acme")]);
        assert_eq!(
            expand_with("Bearer ${ENV:API_TOKEN}", &vars).unwrap(),
            "Bearer s3cr3t"
        );
        assert_eq!(
            expand_with("${ENV:TENANT}-${ENV:TENANT}", &vars).unwrap(),
            "acme-acme"
        );
        assert_eq!(expand_with("plain", &vars).unwrap(), "plain");
    }

    #[test]
    fn test_missing_env_var_is_error() {
        let err = expand_with("${ENV:NOPE}", lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("NOPE"));
    }

    #[test]
    fn test_merge_prefers_overrides() {
        let file = ClientConfig {
            base_url: Some("https://file.example.com".into()),
            timeout_ms: Some(1000),
            headers: BTreeMap::from([("X-A".to_string(), "1".to_string())]),
            ..Default::default()
        };
        let flags = ClientConfig {
            base_url: Some("https://flag.example.com".into()),
            headers: BTreeMap::from([("X-B".to_string(), "2".to_string())]),
            ..Default::default()
        };

        let merged = file.merge(flags);
        assert_eq!(merged.base_url.as_deref(), Some("https://flag.example.com"));
        assert_eq!(merged.timeout_ms, Some(1000));
        assert_eq!(merged.headers.len(), 2);
    }

    #[test]
    fn test_merge_keeps_file_retry_settings() {
        let file = ClientConfig {
            retry: Some(RetrySettings {
                max_attempts: Some(2),
                initial_delay_ms: Some(50),
                retryable_statuses: Some(vec![500]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let flags = ClientConfig {
            retry: Some(RetrySettings {
                max_attempts: Some(5),
                ..Default::default()
            }),
            ..Default::default()
        };

        let retry = file.merge(flags).retry.unwrap();
        assert_eq!(retry.max_attempts, Some(5));
        assert_eq!(retry.initial_delay_ms, Some(50));
        assert_eq!(retry.retryable_statuses, Some(vec![500]));

        let policy = retry.to_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_delay, Duration::from_millis(50));
        assert!(policy.should_retry(500));
        assert!(!policy.should_retry(503));
    }

    #[test]
    fn test_merge_retry_from_one_side_only() {
        let retry = RetrySettings {
            jitter: Some(0.0),
            ..Default::default()
        };
        let with_retry = ClientConfig {
            retry: Some(retry.clone()),
            ..Default::default()
        };

        let merged = with_retry.clone().merge(ClientConfig::default());
        assert_eq!(merged.retry, Some(retry.clone()));
        let merged = ClientConfig::default().merge(with_retry);
        assert_eq!(merged.retry, Some(retry));
    }

    #[test]
    fn test_into_builder_builds_client() {
        let config = ClientConfig {
            base_url: Some("https://api.example.com/v2".into()),
            timeout_ms: Some(1500),
            retry: Some(RetrySettings {
                max_attempts: Some(4),
                initial_delay_ms: Some(10),
                ..Default::default()
            }),
            rate_limit: Some(RateLimitSettings {
                permits: 5,
                window_ms: 1000,
            }),
            ..Default::default()
        };

        let client = config.into_builder().unwrap().build().unwrap();
        assert_eq!(client.timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(client.retry_policy().unwrap().max_attempts, 4);
        assert_eq!(client.rate_limiter().unwrap().config().permits, 5);
    }

    #[test]
    fn test_deserialize_from_json() {
        let config: ClientConfig = serde_json::from_str(
            r#"{"base_url": "https://x", "retry": {"max_attempts": 2}, "headers": {"X-Env": "${ENV:HOME}"}}"#,
        )
        .unwrap();
        assert_eq!(config.retry.unwrap().max_attempts, Some(2));
        assert_eq!(config.headers["X-Env"], "${ENV:HOME}");
    }
}
