use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_LOG_FILTER: &str = "info";

/// Credentials and runtime settings loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub immoscout24_api_key: Option<String>,
    pub idealista_api_key: Option<String>,
    pub idealista_api_secret: Option<String>,
    pub daft_api_key: Option<String>,
    /// Timeout applied to every outbound source request
    pub request_timeout: Duration,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            immoscout24_api_key: None,
            idealista_api_key: None,
            idealista_api_secret: None,
            daft_api_key: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Blank values count as missing credentials
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let timeout_secs = match var("REQUEST_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .context("REQUEST_TIMEOUT_SECS must be a whole number of seconds")?,
            None => DEFAULT_REQUEST_TIMEOUT_SECS,
        };
        if timeout_secs == 0 {
            bail!("REQUEST_TIMEOUT_SECS must be at least 1 second");
        }

        Ok(Self {
            immoscout24_api_key: var("IMMOSCOUT24_API_KEY"),
            idealista_api_key: var("IDEALISTA_API_KEY"),
            idealista_api_secret: var("IDEALISTA_API_SECRET"),
            daft_api_key: var("DAFT_API_KEY"),
            request_timeout: Duration::from_secs(timeout_secs),
            log_filter: var("RUST_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        })
    }
}
