//! Storefront client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CAMSTORE_IDENTITY_API_KEY` - Identity provider web API key
//!
//! ## Optional
//! - `CAMSTORE_API_URL` - REST backend base URL (default: `http://localhost:5000/api`)
//! - `CAMSTORE_IDENTITY_URL` - Password sign-in endpoint
//! - `CAMSTORE_SIGN_UP_URL` - Account creation endpoint
//! - `CAMSTORE_TOKEN_URL` - Token refresh endpoint
//! - `CAMSTORE_REQUEST_TIMEOUT_SECS` - Per-request timeout (default: 10)
//! - `CAMSTORE_CATALOG_TTL_SECS` - Catalog cache lifetime (default: 300)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

const DEFAULT_API_URL: &str = "http://localhost:5000/api";
const DEFAULT_IDENTITY_URL: &str =
    "https://identitytoolkit.googleapis.com/v1/accounts:signInWithPassword";
const DEFAULT_SIGN_UP_URL: &str = "https://identitytoolkit.googleapis.com/v1/accounts:signUp";
const DEFAULT_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1/token";
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "insert",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront client configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// REST backend base URL; cart, order, role and catalog paths hang off it
    pub api_url: Url,
    /// Identity provider endpoints and key
    pub identity: IdentityConfig,
    /// Timeout applied to every HTTP request
    pub request_timeout: Duration,
    /// How long catalog listings are cached
    pub catalog_ttl: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Identity provider configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct IdentityConfig {
    /// Password sign-in endpoint
    pub sign_in_url: Url,
    /// Account creation endpoint
    pub sign_up_url: Url,
    /// Refresh-token exchange endpoint
    pub token_url: Url,
    /// Web API key appended as `?key=`
    pub api_key: SecretString,
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("sign_in_url", &self.sign_in_url.as_str())
            .field("sign_up_url", &self.sign_up_url.as_str())
            .field("token_url", &self.token_url.as_str())
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the API key fails validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`StorefrontConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let mut api_url = env.url("CAMSTORE_API_URL", DEFAULT_API_URL)?;
        // Url::join drops the last segment unless the base ends with '/'
        if !api_url.path().ends_with('/') {
            let path = format!("{}/", api_url.path());
            api_url.set_path(&path);
        }

        let identity = IdentityConfig {
            sign_in_url: env.url("CAMSTORE_IDENTITY_URL", DEFAULT_IDENTITY_URL)?,
            sign_up_url: env.url("CAMSTORE_SIGN_UP_URL", DEFAULT_SIGN_UP_URL)?,
            token_url: env.url("CAMSTORE_TOKEN_URL", DEFAULT_TOKEN_URL)?,
            api_key: env.validated_secret("CAMSTORE_IDENTITY_API_KEY")?,
        };

        let request_timeout = Duration::from_secs(env.number("CAMSTORE_REQUEST_TIMEOUT_SECS", 10)?);
        let catalog_ttl = Duration::from_secs(env.number("CAMSTORE_CATALOG_TTL_SECS", 300)?);

        Ok(Self {
            api_url,
            identity,
            request_timeout,
            catalog_ttl,
            sentry_dsn: env.optional("SENTRY_DSN"),
            sentry_environment: env.optional("SENTRY_ENVIRONMENT"),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    /// Get an optional, non-blank variable.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    /// Get a required variable.
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    /// Get a URL variable with a default value.
    fn url(&self, key: &str, default: &str) -> Result<Url, ConfigError> {
        let raw = self.optional(key).unwrap_or_else(|| default.to_string());
        Url::parse(&raw).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    }

    /// Get a numeric variable with a default value.
    fn number(&self, key: &str, default: u64) -> Result<u64, ConfigError> {
        self.optional(key).map_or(Ok(default), |raw| {
            raw.trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
        })
    }

    /// Load and validate a secret.
    fn validated_secret(&self, key: &str) -> Result<SecretString, ConfigError> {
        let value = SecretString::from(self.required(key)?);
        validate_secret_strength(value.expose_secret(), key)?;
        Ok(value)
    }
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // Key length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const KEY: &str = "AIzaSyB7q2kLm9Xc4Rt8Vw1Pz6Hn3Jd5Fg0Qe";

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config =
            StorefrontConfig::from_lookup(lookup(&[("CAMSTORE_IDENTITY_API_KEY", KEY)])).unwrap();
        assert_eq!(config.api_url.as_str(), "http://localhost:5000/api/");
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.catalog_ttl, Duration::from_secs(300));
        assert!(config.identity.sign_up_url.path().ends_with("accounts:signUp"));
        assert!(config.sentry_dsn.is_none());
    }

    #[test]
    fn test_missing_api_key() {
        let err = StorefrontConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(key) if key == "CAMSTORE_IDENTITY_API_KEY"));
    }

    #[test]
    fn test_invalid_api_url() {
        let err = StorefrontConfig::from_lookup(lookup(&[
            ("CAMSTORE_IDENTITY_API_KEY", KEY),
            ("CAMSTORE_API_URL", "not a url"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(key, _) if key == "CAMSTORE_API_URL"));
    }

    #[test]
    fn test_invalid_timeout() {
        let err = StorefrontConfig::from_lookup(lookup(&[
            ("CAMSTORE_IDENTITY_API_KEY", KEY),
            ("CAMSTORE_REQUEST_TIMEOUT_SECS", "ten"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(_, _)));
    }

    #[test]
    fn test_api_key_redacted_in_debug() {
        let config =
            StorefrontConfig::from_lookup(lookup(&[("CAMSTORE_IDENTITY_API_KEY", KEY)])).unwrap();
        assert!(!format!("{config:?}").contains(KEY));
    }

    #[test]
    fn test_placeholder_key_rejected() {
        let result = validate_secret_strength("your-api-key-here", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_low_entropy_key_rejected() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        assert!((shannon_entropy("ab") - 1.0).abs() < 0.01);
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }
}
