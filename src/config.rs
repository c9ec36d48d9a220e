use std::fmt;
use std::str::FromStr;

use crate::{gemini::generate_content_url, RelayError, Result, RetryPolicy};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_ALLOWED_ORIGIN: &str = "*";

/// Relay configuration: upstream location, credential, CORS origin, retry policy.
#[derive(Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Server-held Gemini API key. Absence is reported per request.
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
    /// Value of `Access-Control-Allow-Origin` on every response.
    pub allowed_origin: String,
    pub policy: RetryPolicy,
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("allowed_origin", &self.allowed_origin)
            .field("policy", &self.policy)
            .finish()
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_owned(),
            api_base: DEFAULT_API_BASE.to_owned(),
            allowed_origin: DEFAULT_ALLOWED_ORIGIN.to_owned(),
            policy: RetryPolicy::default(),
        }
    }
}

impl RelayConfig {
    /// Creates a configuration with defaults and the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// Reads configuration from environment variables.
    ///
    /// Reads:
    /// - `GEMINI_API_KEY` — upstream credential (may be absent)
    /// - `GEMINI_MODEL` — model name (default `gemini-2.5-flash`)
    /// - `GEMINI_API_BASE` — API origin (default `https://generativelanguage.googleapis.com`)
    /// - `RELAY_ALLOWED_ORIGIN` — CORS origin (default `*`)
    /// - `RELAY_MAX_ATTEMPTS`, `RELAY_BASE_DELAY_MS`, `RELAY_JITTER_MS`,
    ///   `RELAY_ATTEMPT_TIMEOUT_MS` — retry policy overrides
    ///
    /// Returns an error for malformed numbers or an invalid resulting policy.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`RelayConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        let defaults = RetryPolicy::default();
        let number = |key: &str, default: u64| parse_or(var(key), key, default);

        let config = Self {
            api_key: var("GEMINI_API_KEY"),
            model: var("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            api_base: var("GEMINI_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_owned()),
            allowed_origin: var("RELAY_ALLOWED_ORIGIN")
                .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGIN.to_owned()),
            policy: RetryPolicy {
                max_attempts: parse_or(
                    var("RELAY_MAX_ATTEMPTS"),
                    "RELAY_MAX_ATTEMPTS",
                    defaults.max_attempts,
                )?,
                base_delay_ms: number("RELAY_BASE_DELAY_MS", defaults.base_delay_ms)?,
                attempt_timeout_ms: number("RELAY_ATTEMPT_TIMEOUT_MS", defaults.attempt_timeout_ms)?,
                jitter_ms: number("RELAY_JITTER_MS", defaults.jitter_ms)?,
            },
        };
        config.policy.validate()?;
        Ok(config)
    }

    /// Returns the credential, or a configuration error when it is unset.
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                RelayError::Configuration("GEMINI_API_KEY is not configured".to_owned())
            })
    }

    /// Full `generateContent` URL for the configured model.
    pub fn endpoint(&self) -> String {
        generate_content_url(&self.api_base, &self.model)
    }
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T::Err: fmt::Display,
{
    match value {
        Some(raw) => raw.parse().map_err(|err| {
            RelayError::Configuration(format!("{key} has invalid value '{raw}': {err}"))
        }),
        None => Ok(default),
    }
}
