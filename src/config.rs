//! Configuration management for ratewindow.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{RateWindowError, Result};
use crate::ratelimit::{AdmissionMode, WindowPolicy};

/// Environment variable prefix, e.g. `RATEWINDOW__STORE__URL`.
const ENV_PREFIX: &str = "RATEWINDOW";

/// URL scheme selecting the in-process store.
pub const MEMORY_STORE_URL: &str = "memory://";

/// Main configuration for ratewindow.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateWindowConfig {
    /// Shared store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Limiter policy configuration
    #[serde(default)]
    pub limiter: LimiterConfig,
}

/// Shared store configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    /// Redis URL, or `memory://` for the in-process store
    #[serde(default = "default_store_url")]
    pub url: String,

    /// How each admission reaches the store
    #[serde(default)]
    pub admission_mode: AdmissionMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            admission_mode: AdmissionMode::default(),
        }
    }
}

impl StoreConfig {
    pub fn is_memory(&self) -> bool {
        self.url == MEMORY_STORE_URL
    }
}

fn default_store_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

/// Limiter policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LimiterConfig {
    /// Label of the rate-limited resource
    #[serde(default = "default_label")]
    pub label: String,

    /// Maximum admitted events per window
    #[serde(default = "default_max_request_count")]
    pub max_request_count: u64,

    /// Window width in seconds
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            label: default_label(),
            max_request_count: default_max_request_count(),
            window_seconds: default_window_seconds(),
        }
    }
}

impl LimiterConfig {
    /// Validate into a limiter policy.
    pub fn policy(&self) -> Result<WindowPolicy> {
        WindowPolicy::new(self.max_request_count, self.window_seconds)
    }
}

fn default_label() -> String {
    "pr_rate".to_string()
}

fn default_max_request_count() -> u64 {
    1
}

fn default_window_seconds() -> u64 {
    1
}

impl RateWindowConfig {
    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| RateWindowError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Layered load: defaults, then the optional file, then `RATEWINDOW__*`
    /// environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .and_then(|settings| settings.try_deserialize::<RateWindowConfig>())
            .map_err(|e| RateWindowError::Config(e.to_string()))
    }
}
