//! Configuration management for docgate.
//!
//! Configuration is read from an optional YAML file and then overridden by
//! `DOCGATE__`-prefixed environment variables, e.g.
//! `DOCGATE__RATE_LIMIT__REQUESTS_PER_UNIT=20`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{DocgateError, Result};
use crate::ratelimit::{ReleasePolicy, TimeWindow};

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "DOCGATE";

/// Main configuration for a document client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Remote service configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
}

/// Remote service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Endpoint accepting new documents
    #[serde(default = "default_create_document_url")]
    pub create_document_url: String,

    /// Endpoint exchanging username and password for a token
    #[serde(default)]
    pub auth_url: Option<String>,

    /// Per-exchange timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            create_document_url: default_create_document_url(),
            auth_url: None,
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl ApiConfig {
    /// Per-exchange timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_create_document_url() -> String {
    "https://ismp.crpt.ru/api/v3/lk/documents/create".to_string()
}

fn default_request_timeout() -> u64 {
    30_000
}

/// Rate limiting configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Submissions admitted per window
    #[serde(default = "default_requests_per_unit")]
    pub requests_per_unit: u32,

    /// Window unit
    #[serde(default)]
    pub unit: TimeWindow,

    /// Explicit window length in milliseconds; overrides `unit` when set
    #[serde(default)]
    pub window_ms: Option<u64>,

    /// What happens to a slot when its submission finishes
    #[serde(default)]
    pub release_policy: ReleasePolicy,

    /// Default maximum wait for a slot in milliseconds; unset waits forever
    #[serde(default)]
    pub max_wait_ms: Option<u64>,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_unit: default_requests_per_unit(),
            unit: TimeWindow::default(),
            window_ms: None,
            release_policy: ReleasePolicy::default(),
            max_wait_ms: None,
        }
    }
}

impl RateLimitSettings {
    /// Length of one window.
    pub fn window(&self) -> Duration {
        match self.window_ms {
            Some(ms) => Duration::from_millis(ms),
            None => self.unit.duration(),
        }
    }

    /// Default maximum wait for a slot.
    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_ms.map(Duration::from_millis)
    }
}

fn default_requests_per_unit() -> u32 {
    10
}

impl ClientConfig {
    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ClientConfig = serde_yaml::from_str(yaml)
            .map_err(|e| DocgateError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from an optional YAML file layered under
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration");
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }

        let config: ClientConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| DocgateError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limit.requests_per_unit == 0 {
            return Err(DocgateError::Config(
                "rate_limit.requests_per_unit must be at least 1".to_string(),
            ));
        }
        if self.rate_limit.window().is_zero() {
            return Err(DocgateError::Config(
                "rate limit window must be longer than zero".to_string(),
            ));
        }
        if self.api.request_timeout_ms == 0 {
            return Err(DocgateError::Config(
                "api.request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.api.create_document_url.trim().is_empty() {
            return Err(DocgateError::Config(
                "api.create_document_url must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
