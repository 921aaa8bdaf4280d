//! Connection and cache configuration
//!
//! The hosting process owns configuration loading. [`ProxyConfig::from_env`] is a
//! convenience for processes that take their settings from the environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::{ProxyError, Result};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8001";
pub const DEFAULT_ACCESS_KEY: &str = "admin";
pub const DEFAULT_SECRET_KEY: &str = "password";
pub const DEFAULT_CACHE_DIR_NAME: &str = "openathena_opens3_cache";
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

pub const ENV_ENDPOINT: &str = "OPENS3_ENDPOINT";
pub const ENV_ACCESS_KEY: &str = "OPENS3_ACCESS_KEY";
pub const ENV_SECRET_KEY: &str = "OPENS3_SECRET_KEY";
pub const ENV_CACHE_DIR: &str = "OPENATHENA_CACHE_DIR";
pub const ENV_CACHE_TTL_SECS: &str = "OPENATHENA_CACHE_EXPIRATION";
pub const ENV_SWEEP_INTERVAL_SECS: &str = "OPENATHENA_CACHE_SWEEP_INTERVAL";

/// What to do with a query whose remote URI literals could not all be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnresolvedUriPolicy {
    /// Keep the original literal and let the engine fail on it if it must
    #[default]
    LeaveInPlace,
    /// Fail the query before it reaches the engine
    Reject,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProxyConfig {
    /// Base URL of the object-store HTTP API, without trailing slash
    pub endpoint: String,
    /// Basic-auth user name
    pub access_key: String,
    /// Basic-auth password
    pub secret_key: String,
    /// Directory holding cached objects and the index document
    pub cache_dir: PathBuf,
    /// Maximum age since last access before an entry is stale
    pub cache_ttl: Duration,
    /// Per-request timeout for the HTTP client; `None` keeps the client default
    pub request_timeout: Option<Duration>,
    /// Sweep expired entries from fetches at most this often; `None` leaves
    /// sweeping to the startup pass and explicit `CacheManager::sweep` calls
    pub sweep_interval: Option<Duration>,
    pub unresolved_uri_policy: UnresolvedUriPolicy,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            access_key: DEFAULT_ACCESS_KEY.to_string(),
            secret_key: DEFAULT_SECRET_KEY.to_string(),
            cache_dir: std::env::temp_dir().join(DEFAULT_CACHE_DIR_NAME),
            cache_ttl: DEFAULT_CACHE_TTL,
            request_timeout: None,
            sweep_interval: None,
            unresolved_uri_policy: UnresolvedUriPolicy::default(),
        }
    }
}

impl ProxyConfig {
    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable name
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(endpoint) = non_empty(ENV_ENDPOINT) {
            config = config.with_endpoint(endpoint);
        }
        if let Some(access_key) = non_empty(ENV_ACCESS_KEY) {
            config.access_key = access_key;
        }
        if let Some(secret_key) = non_empty(ENV_SECRET_KEY) {
            config.secret_key = secret_key;
        }
        if let Some(cache_dir) = non_empty(ENV_CACHE_DIR) {
            config.cache_dir = PathBuf::from(cache_dir);
        }
        if let Some(ttl) = non_empty(ENV_CACHE_TTL_SECS) {
            config.cache_ttl = parse_secs(ENV_CACHE_TTL_SECS, &ttl)?;
        }
        if let Some(interval) = non_empty(ENV_SWEEP_INTERVAL_SECS) {
            config.sweep_interval = Some(parse_secs(ENV_SWEEP_INTERVAL_SECS, &interval)?);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_credentials(
        mut self,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.access_key = access_key.into();
        self.secret_key = secret_key.into();
        self
    }

    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    pub fn with_unresolved_uri_policy(mut self, policy: UnresolvedUriPolicy) -> Self {
        self.unresolved_uri_policy = policy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(ProxyError::InvalidConfig(
                "endpoint cannot be empty".to_string(),
            ));
        }
        if self.cache_ttl.is_zero() {
            return Err(ProxyError::InvalidConfig(
                "cache TTL must be greater than zero".to_string(),
            ));
        }
        if self.sweep_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(ProxyError::InvalidConfig(
                "sweep interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_secs(name: &str, value: &str) -> Result<Duration> {
    let secs: u64 = value.trim().parse().map_err(|e| {
        ProxyError::InvalidConfig(format!(
            "{name} must be a whole number of seconds, got '{value}': {e}"
        ))
    })?;
    Ok(Duration::from_secs(secs))
}
