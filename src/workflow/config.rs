//! Application configuration
//!
//! Loaded from a YAML file (default `fleet.yaml`); credentials may also come
//! from the environment, which takes precedence over the file:
//!
//! ```yaml
//! provider:
//!   base_url: "https://api.openai.com/v1"
//!   embedding_model: text-embedding-3-small
//!   completion_model: gpt-4o-mini
//!   retry:
//!     max_attempts: 3
//!
//! store:
//!   host: gateway01.us-east-1.prod.aws.tidbcloud.com
//!   database: logistics
//!
//! engine:
//!   on_provider_error: fallback
//!   deadline_ms: 60000
//!   similar_limit: 5
//!
//! monitor:
//!   enabled: true
//!   interval_ms: 30000
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::provider::ProviderErrorPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error in {file}: {error}")]
    Yaml {
        file: String,
        error: serde_yaml::Error,
    },
}

/// Embedding/completion provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key; `None` means the guarded providers run on fallbacks only
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_completion_model")]
    pub completion_model: String,

    /// Request timeout in milliseconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_completion_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_timeout() -> u64 {
    30000
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            embedding_model: default_embedding_model(),
            completion_model: default_completion_model(),
            timeout: default_timeout(),
            retry: None,
        }
    }
}

impl ProviderConfig {
    pub fn has_credentials(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

/// Retry configuration for provider requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_attempts: u32,

    /// Initial delay between retries in milliseconds
    #[serde(default = "default_retry_initial_delay")]
    pub initial_delay: u64,

    /// Maximum delay between retries in milliseconds
    #[serde(default = "default_retry_max_delay")]
    pub max_delay: u64,

    #[serde(default = "default_retry_status_codes")]
    pub retry_on_status: Vec<u16>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_initial_delay() -> u64 {
    1000
}

fn default_retry_max_delay() -> u64 {
    10000
}

fn default_retry_status_codes() -> Vec<u16> {
    vec![429, 500, 502, 503, 504]
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_retries(),
            initial_delay: default_retry_initial_delay(),
            max_delay: default_retry_max_delay(),
            retry_on_status: default_retry_status_codes(),
        }
    }
}

/// Similarity store connection credentials
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    pub host: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

impl StoreConfig {
    /// Names of the credential fields that are absent or blank
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("host", &self.host),
            ("user", &self.user),
            ("password", &self.password),
            ("database", &self.database),
        ]
        .into_iter()
        .filter(|(_, v)| v.as_deref().map_or(true, |s| s.trim().is_empty()))
        .map(|(name, _)| name)
        .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

/// Orchestrator behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub on_provider_error: ProviderErrorPolicy,

    /// Overall deadline per run in milliseconds, checked between steps
    #[serde(default)]
    pub deadline_ms: Option<u64>,

    /// Maximum number of neighbours requested from the similarity store
    #[serde(default = "default_similar_limit")]
    pub similar_limit: usize,

    /// Seed for synthetic telemetry; entropy when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_similar_limit() -> usize {
    5
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            on_provider_error: ProviderErrorPolicy::default(),
            deadline_ms: None,
            similar_limit: default_similar_limit(),
            seed: None,
        }
    }
}

/// Background fleet monitor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Also scan the fleet in the background during `run` and `demo`
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_monitor_interval")]
    pub interval_ms: u64,
}

fn default_monitor_interval() -> u64 {
    30000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: default_monitor_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_yaml::from_str(&content).map_err(|e| ConfigError::Yaml {
            file: path.display().to_string(),
            error: e,
        })?;
        Ok(config)
    }

    /// Overlay credentials from the process environment
    pub fn with_env(self) -> Self {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay credentials from an arbitrary lookup (used by tests)
    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("OPENAI_API_KEY") {
            self.provider.api_key = Some(key);
        }
        if let Some(url) = non_empty("OPENAI_BASE_URL") {
            self.provider.base_url = url;
        }
        if let Some(host) = non_empty("TIDB_HOST") {
            self.store.host = Some(host);
        }
        if let Some(user) = non_empty("TIDB_USER") {
            self.store.user = Some(user);
        }
        if let Some(password) = non_empty("TIDB_PASSWORD") {
            self.store.password = Some(password);
        }
        if let Some(database) = non_empty("TIDB_DATABASE") {
            self.store.database = Some(database);
        }
        self
    }
}
