//! Configuration management for Floodgate.

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{FloodgateError, Result};
use crate::gate::{
    default_rules, parse_header_name, FailurePolicy, IdentityExtractor, Rule, RuleConfig,
    RuleHeaders, DEFAULT_FORWARDED_HEADER, DEFAULT_TOKEN_HEADER,
};
use crate::ratelimit::{Enforcement, Policy, DEFAULT_LIMIT, DEFAULT_WINDOW_SECS};
use crate::store::RedisStoreConfig;

/// Prefix for environment variable overrides, e.g. `FLOODGATE__RATE_LIMITING__LIMIT`.
const ENV_PREFIX: &str = "FLOODGATE";

/// Main configuration for the Floodgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FloodgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Counter store configuration
    #[serde(default)]
    pub store: StoreConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8000))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Maximum requests per window per identifier
    #[serde(default = "default_limit")]
    pub limit: u64,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Header carrying the credential token
    #[serde(default = "default_token_header")]
    pub token_header: String,

    /// Header carrying the originating client address
    #[serde(default = "default_forwarded_header")]
    pub forwarded_header: String,

    #[serde(default)]
    pub enforcement: Enforcement,

    /// Behaviour while the counter store is unavailable
    #[serde(default = "default_failure_policy")]
    pub failure_policy: FailurePolicy,

    /// Prepended to identifiers to form counter keys
    #[serde(default)]
    pub key_prefix: String,

    /// Explicit ordered rules; empty means address then token
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            window_secs: default_window_secs(),
            token_header: default_token_header(),
            forwarded_header: default_forwarded_header(),
            enforcement: Enforcement::default(),
            failure_policy: default_failure_policy(),
            key_prefix: String::new(),
            rules: Vec::new(),
        }
    }
}

fn default_limit() -> u64 {
    DEFAULT_LIMIT
}

fn default_window_secs() -> u64 {
    DEFAULT_WINDOW_SECS
}

fn default_token_header() -> String {
    DEFAULT_TOKEN_HEADER.to_string()
}

fn default_forwarded_header() -> String {
    DEFAULT_FORWARDED_HEADER.to_string()
}

fn default_failure_policy() -> FailurePolicy {
    FailurePolicy::Open
}

impl RateLimitingConfig {
    /// The top-level policy, inherited by rules that do not set their own.
    pub fn policy(&self) -> Result<Policy> {
        Policy::per_seconds(self.limit, self.window_secs)
    }

    fn headers(&self) -> Result<RuleHeaders> {
        Ok(RuleHeaders {
            forwarded: parse_header_name(&self.forwarded_header)?,
            token: parse_header_name(&self.token_header)?,
        })
    }

    pub fn extractor(&self) -> Result<IdentityExtractor> {
        let headers = self.headers()?;
        Ok(IdentityExtractor::new(headers.forwarded, headers.token))
    }

    /// Compile the ordered rule list.
    pub fn rules(&self) -> Result<Vec<Rule>> {
        let policy = self.policy()?;
        if self.rules.is_empty() {
            return Ok(default_rules(&self.extractor()?, policy));
        }

        let headers = self.headers()?;
        self.rules
            .iter()
            .map(|rule| rule.compile(&policy, &headers))
            .collect()
    }
}

/// Which counter store to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Redis,
    /// In-process counters, not shared between instances
    Memory,
}

/// Counter store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Redis URL; the local default instance when omitted
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Per-call timeout in milliseconds
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            url: default_store_url(),
            timeout_ms: default_store_timeout_ms(),
        }
    }
}

fn default_store_url() -> String {
    RedisStoreConfig::default().url
}

fn default_store_timeout_ms() -> u64 {
    500
}

impl StoreConfig {
    pub fn redis(&self) -> RedisStoreConfig {
        RedisStoreConfig {
            url: self.url.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

impl FloodgateConfig {
    /// Load configuration from a YAML file path.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: FloodgateConfig =
            serde_yaml::from_str(yaml).map_err(|e| FloodgateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Layer an optional YAML file under `FLOODGATE__*` environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::new(path, FileFormat::Yaml).required(true));
        }

        let config: FloodgateConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|raw| raw.try_deserialize())
            .map_err(|e| FloodgateError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject policies and header names that would fail at request time.
    pub fn validate(&self) -> Result<()> {
        self.rate_limiting.rules().map(|_| ())
    }
}
