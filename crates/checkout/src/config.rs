//! Checkout client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `POMELO_API_BASE_URL` - Base URL of the commerce backend's JSON:API root
//!
//! ## Optional
//! - `POMELO_API_TIMEOUT_SECS` - Per-request timeout in seconds (default: 30)
//! - `POMELO_USER_AGENT` - User-Agent header value (default: `Pomelo/<version>`)
//!
//! The embedding application is responsible for loading `.env` files (e.g.
//! via `dotenvy`) before calling [`CommerceConfig::from_env`].

use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Commerce backend client configuration.
#[derive(Debug, Clone)]
pub struct CommerceConfig {
    /// Base URL of the JSON:API root, e.g. `https://shop.example.com/api/`
    pub base_url: Url,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// User-Agent header sent with every request
    pub user_agent: String,
}

impl CommerceConfig {
    /// Create a configuration with default timeout and user agent.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: format!("Pomelo/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    ///
    /// Used by `from_env` and by tests that need deterministic input.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw_url = lookup("POMELO_API_BASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("POMELO_API_BASE_URL".to_string()))?;
        let base_url = Url::parse(&raw_url).map_err(|e| {
            ConfigError::InvalidEnvVar("POMELO_API_BASE_URL".to_string(), e.to_string())
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::InvalidEnvVar(
                "POMELO_API_BASE_URL".to_string(),
                "URL cannot be a base".to_string(),
            ));
        }

        let timeout_secs = match lookup("POMELO_API_TIMEOUT_SECS") {
            Some(raw) => raw.parse::<u64>().map_err(|e| {
                ConfigError::InvalidEnvVar("POMELO_API_TIMEOUT_SECS".to_string(), e.to_string())
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let mut config = Self::new(base_url);
        config.request_timeout = Duration::from_secs(timeout_secs);
        if let Some(agent) = lookup("POMELO_USER_AGENT") {
            config.user_agent = agent;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_from_lookup_defaults() {
        let vars = vars(&[("POMELO_API_BASE_URL", "https://shop.example.com/api/")]);
        let config = CommerceConfig::from_lookup(|k| vars.get(k).cloned()).expect("valid config");
        assert_eq!(config.base_url.as_str(), "https://shop.example.com/api/");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.user_agent.starts_with("Pomelo/"));
    }

    #[test]
    fn test_from_lookup_overrides() {
        let vars = vars(&[
            ("POMELO_API_BASE_URL", "https://shop.example.com/api/"),
            ("POMELO_API_TIMEOUT_SECS", "5"),
            ("POMELO_USER_AGENT", "TestAgent/1.0"),
        ]);
        let config = CommerceConfig::from_lookup(|k| vars.get(k).cloned()).expect("valid config");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.user_agent, "TestAgent/1.0");
    }

    #[test]
    fn test_missing_base_url() {
        let err = CommerceConfig::from_lookup(|_| None).expect_err("should fail");
        assert!(matches!(err, ConfigError::MissingEnvVar(name) if name == "POMELO_API_BASE_URL"));
    }

    #[test]
    fn test_invalid_base_url() {
        let vars = vars(&[("POMELO_API_BASE_URL", "not a url")]);
        let err =
            CommerceConfig::from_lookup(|k| vars.get(k).cloned()).expect_err("should fail");
        assert!(matches!(err, ConfigError::InvalidEnvVar(name, _) if name == "POMELO_API_BASE_URL"));
    }
}
