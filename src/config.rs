//! Service configuration.
//!
//! Configuration is loaded from a TOML file with environment variable
//! overrides. Every field has a default, so an empty file (or no file at all)
//! yields the documented behaviour.
//!
//! Environment overrides use the `LYRA_RESILIENCE` prefix and a double
//! underscore between path segments, e.g.
//! `LYRA_RESILIENCE__NETWORK__RETRY__MAX_RETRIES=5`.

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "LYRA_RESILIENCE";

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    /// The path is not valid UTF-8.
    #[error("Invalid configuration path: {0}")]
    InvalidPath(String),

    /// The sources could not be merged or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// The effective configuration could not be rendered.
    #[error("Failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Top-level configuration for all three services.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub logger: LoggerConfig,
    pub network: NetworkConfig,
    pub recovery: RecoveryConfig,
}

impl ResilienceConfig {
    /// Loads configuration from a TOML file, applying environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let path_str = path
            .to_str()
            .ok_or_else(|| ConfigError::InvalidPath(format!("{:?}", path)))?;

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path_str.to_string()));
        }

        let config = Config::builder()
            .add_source(File::new(path_str, FileFormat::Toml))
            .add_source(Self::environment())
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Builds configuration from defaults plus environment overrides only.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Config::builder().add_source(Self::environment()).build()?;
        Ok(config.try_deserialize()?)
    }

    /// Parses configuration from a TOML string (no environment overrides).
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from_str(toml_str, FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Renders the effective configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
    }
}

/// Error logger settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// In-memory queue capacity; the oldest record is dropped beyond it.
    pub queue_capacity: usize,
    /// Maximum records kept in the persisted error log.
    pub persisted_capacity: usize,
    /// Records forwarded per flush.
    pub batch_size: usize,
    /// Period of the background flush timer.
    pub flush_interval_ms: u64,
    /// Print a colored summary of each record to stderr.
    pub development_mode: bool,
    /// Number of records returned in `recent` by the stats call.
    pub recent_limit: usize,
    /// Local storage key of the persisted error log.
    pub storage_key: String,
    /// Session storage key holding the session identifier.
    pub session_key: String,
    /// Local storage key of the auth blob the user id is read from.
    pub auth_storage_key: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            persisted_capacity: 50,
            batch_size: 10,
            flush_interval_ms: 30_000,
            development_mode: false,
            recent_limit: 10,
            storage_key: "error_logs".to_string(),
            session_key: "error-boundary-session-id".to_string(),
            auth_storage_key: DEFAULT_AUTH_KEY.to_string(),
        }
    }
}

impl LoggerConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

const DEFAULT_AUTH_KEY: &str = "supabase.auth.token";

/// Default retry policy for orchestrated requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Cap on total attempts for one request, the first one included.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Upper bound of the random jitter, as a fraction of the computed delay.
    pub jitter_ratio: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter_ratio: 0.3,
        }
    }
}

/// Per-attempt timeouts by connection quality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub poor_ms: u64,
    pub good_ms: u64,
    pub excellent_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            poor_ms: 30_000,
            good_ms: 15_000,
            excellent_ms: 10_000,
        }
    }
}

/// Network orchestrator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub retry: RetrySettings,
    pub timeouts: TimeoutSettings,
    /// Period of the connection-quality reassessment.
    pub quality_check_interval_ms: u64,
    /// Same-origin resource probed with `HEAD` during recovery.
    pub probe_url: String,
    /// Cross-origin resource probed when the same-origin probe fails.
    pub external_probe_url: String,
    /// Base URL of the backend function endpoints.
    pub functions_base_url: String,
    /// Local storage key of the auth blob holding the bearer token.
    pub auth_storage_key: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            retry: RetrySettings::default(),
            timeouts: TimeoutSettings::default(),
            quality_check_interval_ms: 30_000,
            probe_url: "http://localhost/favicon.ico".to_string(),
            external_probe_url: "https://www.google.com/favicon.ico".to_string(),
            functions_base_url: "http://localhost:54321/functions/v1".to_string(),
            auth_storage_key: DEFAULT_AUTH_KEY.to_string(),
        }
    }
}

impl NetworkConfig {
    pub fn quality_check_interval(&self) -> Duration {
        Duration::from_millis(self.quality_check_interval_ms)
    }
}

/// Recovery manager settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Maximum entries kept in the recovery history.
    pub history_capacity: usize,
    /// Number of most recent attempts a success rate is computed over.
    pub success_window: usize,
    /// Local storage key of the recovery history.
    pub history_key: String,
    /// Prefix of the per-strategy success-rate keys.
    pub success_rate_prefix: String,
    /// Local storage keys removed by the application state reset.
    pub local_state_keys: Vec<String>,
    /// Session storage keys removed by the application state reset.
    pub session_state_keys: Vec<String>,
    /// Key prefixes of the store/query caches removed by the application state reset.
    pub state_cache_prefixes: Vec<String>,
    /// Cache names containing any of these fragments hold script chunks.
    pub chunk_cache_markers: Vec<String>,
    /// Message sent to the service worker when entering offline mode.
    pub offline_message: String,
    /// Same-origin probe used by the connectivity test.
    pub probe_url: String,
    /// Cross-origin probe used by the DNS refresh.
    pub external_probe_url: String,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        let network = NetworkConfig::default();
        Self {
            history_capacity: 50,
            success_window: 10,
            history_key: "recovery_history".to_string(),
            success_rate_prefix: "recovery_success_".to_string(),
            local_state_keys: vec![
                "app_state".to_string(),
                "lesson_progress_cache".to_string(),
                "interaction_state".to_string(),
                "user_preferences_cache".to_string(),
            ],
            session_state_keys: vec![
                "current_lesson".to_string(),
                "navigation_state".to_string(),
                "form_drafts".to_string(),
            ],
            state_cache_prefixes: vec!["query_cache".to_string(), "store_cache".to_string()],
            chunk_cache_markers: vec![
                "chunk".to_string(),
                "script".to_string(),
                "static".to_string(),
                "assets".to_string(),
            ],
            offline_message: "Network unavailable, serving cached lessons".to_string(),
            probe_url: network.probe_url,
            external_probe_url: network.external_probe_url,
        }
    }
}
