use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment};
use log::{debug, info};
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Retry budget and delays for one poll sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub max_attempts: u32,
    /// Wait after a pending response.
    pub pending_delay: Duration,
    /// Wait after a transient error.
    pub error_delay: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            pending_delay: Duration::from_millis(1000),
            error_delay: Duration::from_millis(2000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub request_timeout: Option<Duration>,
    pub poller: PollerConfig,
}

/// `MOCKMATE_API_BASE_URL`, `MOCKMATE_REQUEST_TIMEOUT_MS`, `MOCKMATE_POLLER__MAX_ATTEMPTS`, ...
fn environment() -> Environment {
    Environment::with_prefix("MOCKMATE")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

#[derive(Deserialize)]
struct RawConfig {
    api_base_url: String,
    #[serde(default)]
    api_token: Option<String>,
    #[serde(default)]
    request_timeout_ms: Option<u64>,
    poller: RawPollerConfig,
}

#[derive(Deserialize)]
struct RawPollerConfig {
    max_attempts: u32,
    pending_delay_ms: u64,
    error_delay_ms: u64,
}

impl AppConfig {
    /// Loads `.env` (if present), then `MOCKMATE_*` environment variables over the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let builder = Self::defaults()?.add_source(environment());

        let config = Self::from_builder(builder)?;
        info!("⚙️ Evaluation API: {} (max {} attempts)", config.api_base_url, config.poller.max_attempts);
        Ok(config)
    }

    pub(crate) fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let defaults = PollerConfig::default();

        // Values embedded by build.rs take the place of the compiled-in default.
        let base_url = option_env!("MOCKMATE_API_BASE_URL")
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_API_BASE_URL);

        Ok(Config::builder()
            .set_default("api_base_url", base_url)?
            .set_default("poller.max_attempts", i64::from(defaults.max_attempts))?
            .set_default("poller.pending_delay_ms", defaults.pending_delay.as_millis() as i64)?
            .set_default("poller.error_delay_ms", defaults.error_delay.as_millis() as i64)?)
    }

    pub(crate) fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let raw: RawConfig = builder.build()?.try_deserialize()?;

        if raw.poller.max_attempts == 0 {
            return Err(ConfigError::Invalid("poller.max_attempts must be at least 1".to_string()));
        }

        let base_url = raw.api_base_url.trim().trim_end_matches('/').to_string();
        let parsed = url::Url::parse(&base_url)
            .map_err(|e| ConfigError::Invalid(format!("api_base_url '{}': {}", base_url, e)))?;
        if parsed.cannot_be_a_base() || !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!("api_base_url '{}' is not an http(s) URL", base_url)));
        }

        let api_token = raw
            .api_token
            .or_else(|| option_env!("MOCKMATE_API_TOKEN").map(String::from))
            .filter(|t| !t.trim().is_empty());

        debug!("API token configured: {}", api_token.is_some());

        Ok(Self {
            api_base_url: base_url,
            api_token,
            request_timeout: raw.request_timeout_ms.map(Duration::from_millis),
            poller: PollerConfig {
                max_attempts: raw.poller.max_attempts,
                pending_delay: Duration::from_millis(raw.poller.pending_delay_ms),
                error_delay: Duration::from_millis(raw.poller.error_delay_ms),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat, Map};

    fn load_json(json: &str) -> Result<AppConfig, ConfigError> {
        let builder = AppConfig::defaults()?.add_source(File::from_str(json, FileFormat::Json));
        AppConfig::from_builder(builder)
    }

    #[test]
    fn test_defaults_match_poller_defaults() {
        let config = load_json("{}").unwrap();
        assert_eq!(config.poller, PollerConfig::default());
        assert_eq!(config.poller.max_attempts, 60);
        assert_eq!(config.poller.pending_delay, Duration::from_millis(1000));
        assert_eq!(config.poller.error_delay, Duration::from_millis(2000));
        assert!(config.request_timeout.is_none());
    }

    #[test]
    fn test_overrides_and_trailing_slash() {
        let config = load_json(
            r#"{
                "api_base_url": "https://mockmate.example.com/api/",
                "api_token": "abc",
                "request_timeout_ms": 5000,
                "poller": {"max_attempts": 5, "pending_delay_ms": 250}
            }"#,
        )
        .unwrap();

        assert_eq!(config.api_base_url, "https://mockmate.example.com/api");
        assert_eq!(config.api_token.as_deref(), Some("abc"));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.poller.max_attempts, 5);
        assert_eq!(config.poller.pending_delay, Duration::from_millis(250));
        assert_eq!(config.poller.error_delay, Duration::from_millis(2000));
    }

    #[test]
    fn test_rejects_zero_budget_and_bad_url() {
        assert!(matches!(
            load_json(r#"{"poller": {"max_attempts": 0}}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            load_json(r#"{"api_base_url": "not a url"}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            load_json(r#"{"api_base_url": "ftp://example.com"}"#),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_environment_variable_names() {
        let vars: Map<String, String> = [
            ("MOCKMATE_API_BASE_URL", "https://env.example.com/api/"),
            ("MOCKMATE_REQUEST_TIMEOUT_MS", "1500"),
            ("MOCKMATE_POLLER__MAX_ATTEMPTS", "7"),
            ("MOCKMATE_POLLER__ERROR_DELAY_MS", "500"),
            ("OTHER_POLLER__MAX_ATTEMPTS", "99"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let builder = AppConfig::defaults()
            .unwrap()
            .add_source(environment().source(Some(vars)));
        let config = AppConfig::from_builder(builder).unwrap();

        assert_eq!(config.api_base_url, "https://env.example.com/api");
        assert_eq!(config.request_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.poller.max_attempts, 7);
        assert_eq!(config.poller.error_delay, Duration::from_millis(500));
        assert_eq!(config.poller.pending_delay, Duration::from_millis(1000));
    }
}
