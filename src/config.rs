use serde::Deserialize;
use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_EXTRACTION_URL: &str = "http://localhost:3005";
const DEFAULT_API_VERSION: &str = "v1";
const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 30;
const DEFAULT_POLL_DELAY_MS: u64 = 1000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the extraction client and gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the extraction backend.
    pub extraction_url: String,
    /// Versioned path segment inserted after `/api/` (for example `v1`).
    pub api_version: String,
    /// Maximum number of status polls before a task is declared timed out.
    pub poll_max_attempts: u32,
    /// Delay between two consecutive status polls, in milliseconds.
    pub poll_delay_ms: u64,
    /// Timeout applied to each individual HTTP request, in seconds.
    pub request_timeout_secs: u64,
    /// Optional capacity of the in-process result cache (unbounded when unset).
    pub cache_max_entries: Option<usize>,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Interface the HTTP server binds to (loopback unless overridden).
    pub server_host: IpAddr,
    /// Directory HTTP callers may read local `path` sources from; path sources are refused
    /// over HTTP when unset.
    pub source_root: Option<PathBuf>,
    /// Whether HTTP callers may ask the server to download `url` sources.
    pub allow_url_sources: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            extraction_url: DEFAULT_EXTRACTION_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            poll_max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
            poll_delay_ms: DEFAULT_POLL_DELAY_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            cache_max_entries: None,
            server_port: None,
            server_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            source_root: None,
            allow_url_sources: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup (used by tests to avoid touching the
    /// process environment).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let poll_max_attempts = parse_optional::<u32>(
            optional("EXTRACTION_POLL_MAX_ATTEMPTS"),
            "EXTRACTION_POLL_MAX_ATTEMPTS",
        )?
        .unwrap_or(defaults.poll_max_attempts);
        if poll_max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "EXTRACTION_POLL_MAX_ATTEMPTS".to_string(),
            ));
        }

        let request_timeout_secs = parse_optional::<u64>(
            optional("EXTRACTION_REQUEST_TIMEOUT_SECS"),
            "EXTRACTION_REQUEST_TIMEOUT_SECS",
        )?
        .unwrap_or(defaults.request_timeout_secs);
        if request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "EXTRACTION_REQUEST_TIMEOUT_SECS".to_string(),
            ));
        }

        let cache_max_entries = parse_optional::<usize>(
            optional("EXTRACTION_CACHE_MAX_ENTRIES"),
            "EXTRACTION_CACHE_MAX_ENTRIES",
        )?;
        if cache_max_entries == Some(0) {
            return Err(ConfigError::InvalidValue(
                "EXTRACTION_CACHE_MAX_ENTRIES".to_string(),
            ));
        }

        Ok(Self {
            extraction_url: optional("TEXT_EXTRACTION_URL").unwrap_or(defaults.extraction_url),
            api_version: optional("TEXT_EXTRACTION_API_VERSION")
                .map(|value| normalize_api_version(&value))
                .unwrap_or(defaults.api_version),
            poll_max_attempts,
            poll_delay_ms: parse_optional(
                optional("EXTRACTION_POLL_DELAY_MS"),
                "EXTRACTION_POLL_DELAY_MS",
            )?
            .unwrap_or(defaults.poll_delay_ms),
            request_timeout_secs,
            cache_max_entries,
            server_port: parse_optional(optional("SERVER_PORT"), "SERVER_PORT")?,
            server_host: parse_optional(optional("SERVER_HOST"), "SERVER_HOST")?
                .unwrap_or(defaults.server_host),
            source_root: optional("EXTRACTION_SOURCE_ROOT").map(PathBuf::from),
            allow_url_sources: parse_optional(
                optional("EXTRACTION_ALLOW_URL_SOURCES"),
                "EXTRACTION_ALLOW_URL_SOURCES",
            )?
            .unwrap_or(defaults.allow_url_sources),
        })
    }

    /// Delay between status polls as a [`Duration`].
    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.poll_delay_ms)
    }

    /// Per-request HTTP timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_optional<T: std::str::FromStr>(
    value: Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    value
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

/// Accept both `v2` and `2` for the API version segment.
fn normalize_api_version(value: &str) -> String {
    let trimmed = value.trim().trim_matches('/');
    if trimmed.chars().all(|c| c.is_ascii_digit()) {
        format!("v{trimmed}")
    } else {
        trimmed.to_string()
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        extraction_url = %config.extraction_url,
        api_version = %config.api_version,
        poll_max_attempts = config.poll_max_attempts,
        poll_delay_ms = config.poll_delay_ms,
        cache_max_entries = ?config.cache_max_entries,
        server_port = ?config.server_port,
        server_host = %config.server_host,
        source_root = ?config.source_root,
        allow_url_sources = config.allow_url_sources,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
