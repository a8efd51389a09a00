//! # Configuration Management
//!
//! Layered configuration for the processing core: built-in defaults, an
//! optional TOML file, and `SCRIBE_*` environment overrides, in that order.
//! Every section validates itself; the daemon refuses to start on an invalid
//! configuration rather than limping along.

pub mod timeouts;

use crate::error::{Result, ScribeError};
use crate::resilience::{RateLimit, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use timeouts::{ProviderOperation, ProviderTimeoutsConfig};

/// Top-level configuration for the Scribe core
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScribeConfig {
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub retry: RetryConfig,
    pub rate_limits: RateLimitsConfig,
    pub provider_timeouts: ProviderTimeoutsConfig,
    pub providers: ProvidersConfig,
    pub paths: PathsConfig,
}

/// SQLite database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    pub path: String,

    /// Connection pool size
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "scribe.db".to_string(),
            max_connections: 5,
        }
    }
}

/// Processing queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum tasks executing concurrently
    pub max_concurrency: usize,

    /// Maximum recordings accepted per batch
    pub max_batch_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrency: crate::constants::system::DEFAULT_MAX_CONCURRENCY,
            max_batch_size: crate::constants::system::MAX_BATCH_SIZE,
        }
    }
}

/// Retry policy settings (deserialized form of [`RetryPolicy`])
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            backoff_factor: self.backoff_factor,
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: self.jitter,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            backoff_factor: 2.0,
            max_delay_ms: 60_000,
            jitter: true,
        }
    }
}

/// Rate limiter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitsConfig {
    /// File the window state persists to (relative to data_dir unless absolute)
    pub state_file: String,

    /// Minimum seconds between state writes
    pub save_interval_secs: u64,

    /// Seconds of inactivity before a key's window entry is collected
    pub idle_expiry_secs: u64,

    /// Budget for providers without an explicit entry
    pub default: RateLimit,

    /// Per-provider budget overrides
    #[serde(default)]
    pub providers: HashMap<String, RateLimit>,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            state_file: "rate_limits.json".to_string(),
            save_interval_secs: crate::constants::system::RATE_LIMIT_SAVE_INTERVAL_SECS,
            idle_expiry_secs: crate::constants::system::RATE_LIMIT_IDLE_EXPIRY_SECS,
            default: RateLimit::default(),
            providers: HashMap::new(),
        }
    }
}

/// A single configured provider endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    /// Provider name, used for rate limiter keys and log fields
    pub name: String,

    /// Base URL of the provider API
    pub base_url: String,

    /// Environment variable holding the API key (never stored inline)
    pub api_key_env: String,

    /// Model identifier passed on generation requests
    pub model: String,
}

impl ProviderEndpoint {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.name.is_empty() {
            return Err("provider name must not be empty".to_string());
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(format!(
                "provider {} base_url must be an http(s) URL",
                self.name
            ));
        }
        Ok(())
    }

    /// Resolve the API key from the configured environment variable.
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env).map_err(|_| {
            ScribeError::Configuration(format!(
                "API key environment variable {} is not set for provider {}",
                self.api_key_env, self.name
            ))
        })
    }
}

/// Provider endpoints per operation family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    pub transcription: ProviderEndpoint,
    pub generation: ProviderEndpoint,
    pub speech_synthesis: ProviderEndpoint,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            transcription: ProviderEndpoint {
                name: "deepgram".to_string(),
                base_url: "https://api.deepgram.com".to_string(),
                api_key_env: "DEEPGRAM_API_KEY".to_string(),
                model: "nova-2-medical".to_string(),
            },
            generation: ProviderEndpoint {
                name: "openai".to_string(),
                base_url: "https://api.openai.com".to_string(),
                api_key_env: "OPENAI_API_KEY".to_string(),
                model: "gpt-4o".to_string(),
            },
            speech_synthesis: ProviderEndpoint {
                name: "elevenlabs".to_string(),
                base_url: "https://api.elevenlabs.io".to_string(),
                api_key_env: "ELEVENLABS_API_KEY".to_string(),
                model: "eleven_turbo_v2".to_string(),
            },
        }
    }
}

/// Filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory for the database, PID file, and persisted state
    pub data_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: ".".to_string(),
        }
    }
}

impl PathsConfig {
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    /// Resolve a possibly-relative file name against the data directory.
    pub fn resolve(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir().join(path)
        }
    }
}

impl ScribeConfig {
    /// Load configuration: defaults, then an optional TOML file, then
    /// `SCRIBE_*` environment overrides (`SCRIBE_QUEUE__MAX_CONCURRENCY=8`).
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        let defaults = config::Config::try_from(&ScribeConfig::default())?;
        builder = builder.add_source(defaults);

        if let Some(path) = config_file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("SCRIBE")
                .separator("__")
                .try_parsing(true),
        );

        let loaded: ScribeConfig = builder.build()?.try_deserialize()?;
        Ok(loaded)
    }

    /// Validate every section; collects the first failure into a
    /// `Configuration` error naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.database.path.is_empty() {
            return Err(ScribeError::Configuration(
                "database.path must not be empty".to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ScribeError::Configuration(
                "database.max_connections must be greater than 0".to_string(),
            ));
        }
        if self.queue.max_concurrency == 0 {
            return Err(ScribeError::Configuration(
                "queue.max_concurrency must be greater than 0".to_string(),
            ));
        }
        if self.queue.max_batch_size == 0 {
            return Err(ScribeError::Configuration(
                "queue.max_batch_size must be greater than 0".to_string(),
            ));
        }

        self.retry
            .to_policy()
            .validate()
            .map_err(|e| ScribeError::Configuration(format!("retry: {e}")))?;

        self.rate_limits
            .default
            .validate()
            .map_err(|e| ScribeError::Configuration(format!("rate_limits.default: {e}")))?;
        for (provider, limit) in &self.rate_limits.providers {
            limit.validate().map_err(|e| {
                ScribeError::Configuration(format!("rate_limits.providers.{provider}: {e}"))
            })?;
        }

        self.provider_timeouts
            .validate()
            .map_err(|e| ScribeError::Configuration(format!("provider_timeouts: {e}")))?;

        for endpoint in [
            &self.providers.transcription,
            &self.providers.generation,
            &self.providers.speech_synthesis,
        ] {
            endpoint
                .validate()
                .map_err(|e| ScribeError::Configuration(format!("providers: {e}")))?;
        }

        Ok(())
    }

    /// Absolute path of the SQLite database file.
    pub fn database_path(&self) -> PathBuf {
        self.paths.resolve(&self.database.path)
    }

    /// Absolute path of the persisted rate limiter state.
    pub fn rate_limit_state_path(&self) -> PathBuf {
        self.paths.resolve(&self.rate_limits.state_file)
    }

    /// Absolute path of the single-instance PID file.
    pub fn pid_file_path(&self) -> PathBuf {
        self.paths
            .resolve(crate::constants::system::PID_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ScribeConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_concurrency_rejected() {
        let mut config = ScribeConfig::default();
        config.queue.max_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_provider_url_rejected() {
        let mut config = ScribeConfig::default();
        config.providers.generation.base_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_paths_resolution() {
        let paths = PathsConfig {
            data_dir: "/var/lib/scribe".to_string(),
        };
        assert_eq!(
            paths.resolve("scribe.db"),
            PathBuf::from("/var/lib/scribe/scribe.db")
        );
        assert_eq!(
            paths.resolve("/tmp/other.db"),
            PathBuf::from("/tmp/other.db")
        );
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scribe.toml");
        std::fs::write(
            &path,
            r#"
[queue]
max_concurrency = 8
max_batch_size = 25

[retry]
max_retries = 5
initial_delay_ms = 500
backoff_factor = 1.5
max_delay_ms = 30000
jitter = false
"#,
        )
        .unwrap();

        let config = ScribeConfig::load(Some(&path)).unwrap();
        assert_eq!(config.queue.max_concurrency, 8);
        assert_eq!(config.queue.max_batch_size, 25);
        assert_eq!(config.retry.max_retries, 5);
        assert!(!config.retry.jitter);
        // Sections absent from the file keep their defaults.
        assert_eq!(config.database.max_connections, 5);
    }
}
