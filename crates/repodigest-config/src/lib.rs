#![deny(unsafe_code)]

//! Configuration loading and validation for repodigest.
//!
//! Loads TOML configuration files and validates them against expected ranges.
//! Provides the [`AppConfig`] type as the central configuration structure.
//! Every section is optional; an empty file yields the defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote hosting API configuration.
    #[serde(default)]
    pub github: GitHubConfig,

    /// Retry/backoff policy for remote calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Digest synthesis limits.
    #[serde(default)]
    pub synth: SynthConfig,

    /// Disk cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Daemon configuration.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// GitHub REST API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Base URL of the REST API (GitHub Enterprise installs differ).
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Environment variable holding the token used when the caller does
    /// not supply one.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Per-call timeout in seconds, independent of the retry loop.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token_env: default_token_env(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl GitHubConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Retry/backoff configuration.
///
/// Delay before attempt `n + 1` is `min(base_delay * 2^(n-1), max_delay)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts for repository metadata and tree calls.
    #[serde(default = "default_metadata_attempts")]
    pub metadata_attempts: u32,

    /// Attempts for individual blob calls.
    #[serde(default = "default_blob_attempts")]
    pub blob_attempts: u32,

    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on any single backoff delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            metadata_attempts: default_metadata_attempts(),
            blob_attempts: default_blob_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

fn default_metadata_attempts() -> u32 {
    3
}

fn default_blob_attempts() -> u32 {
    2
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    10_000
}

/// Digest synthesis limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthConfig {
    /// Size of the working set (top-K ranked files).
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Files reporting this many bytes or more are skipped before ranking.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    /// Per-file content cap in characters; longer content is truncated.
    #[serde(default = "default_truncate_chars")]
    pub truncate_chars: usize,

    /// Maximum number of blob fetches in flight at once.
    #[serde(default = "default_blob_concurrency")]
    pub blob_concurrency: usize,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            max_file_bytes: default_max_file_bytes(),
            truncate_chars: default_truncate_chars(),
            blob_concurrency: default_blob_concurrency(),
        }
    }
}

fn default_max_files() -> usize {
    20
}

fn default_max_file_bytes() -> u64 {
    100_000
}

fn default_truncate_chars() -> usize {
    2_000
}

fn default_blob_concurrency() -> usize {
    4
}

/// Disk cache configuration.
///
/// The record TTL is deliberately absent: it is a fixed constant of the
/// cache store and is never read from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding one record file per repository.
    #[serde(default = "default_cache_dir")]
    pub dir: String,

    /// Delay before the startup sweep of expired records, in seconds.
    #[serde(default = "default_startup_cleanup_delay_secs")]
    pub startup_cleanup_delay_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            startup_cleanup_delay_secs: default_startup_cleanup_delay_secs(),
        }
    }
}

impl CacheConfig {
    pub fn startup_cleanup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_cleanup_delay_secs)
    }
}

fn default_cache_dir() -> String {
    "cache/digests".to_string()
}

fn default_startup_cleanup_delay_secs() -> u64 {
    5
}

/// Configuration for the daemon process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Unix socket path for the IPC server.
    #[serde(default)]
    pub socket_path: Option<String>,

    /// Overall deadline for a single digest request, in seconds.
    #[serde(default = "default_request_deadline_secs")]
    pub request_deadline_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            request_deadline_secs: default_request_deadline_secs(),
        }
    }
}

impl DaemonConfig {
    pub fn request_deadline(&self) -> Duration {
        Duration::from_secs(self.request_deadline_secs)
    }
}

fn default_request_deadline_secs() -> u64 {
    120
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config = Self::parse(&content)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let api_url = &self.github.api_url;
        if api_url.is_empty() {
            return Err(ConfigError::Validation(
                "github.api_url must not be empty".to_string(),
            ));
        }
        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "github.api_url must be an http(s) URL, got {api_url:?}"
            )));
        }
        if self.github.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "github.request_timeout_secs must be non-zero".to_string(),
            ));
        }

        if self.retry.metadata_attempts == 0 {
            return Err(ConfigError::Validation(
                "retry.metadata_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.blob_attempts == 0 {
            return Err(ConfigError::Validation(
                "retry.blob_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Validation(format!(
                "retry.base_delay_ms ({}) must not exceed retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }

        if self.synth.max_files == 0 {
            return Err(ConfigError::Validation(
                "synth.max_files must be at least 1".to_string(),
            ));
        }
        if self.synth.max_file_bytes == 0 {
            return Err(ConfigError::Validation(
                "synth.max_file_bytes must be non-zero".to_string(),
            ));
        }
        if self.synth.truncate_chars == 0 {
            return Err(ConfigError::Validation(
                "synth.truncate_chars must be non-zero".to_string(),
            ));
        }
        if self.synth.blob_concurrency == 0 {
            return Err(ConfigError::Validation(
                "synth.blob_concurrency must be at least 1".to_string(),
            ));
        }

        if self.cache.dir.is_empty() {
            return Err(ConfigError::Validation(
                "cache.dir must not be empty".to_string(),
            ));
        }

        if self.daemon.request_deadline_secs == 0 {
            return Err(ConfigError::Validation(
                "daemon.request_deadline_secs must be non-zero".to_string(),
            ));
        }
        if let Some(ref socket) = self.daemon.socket_path
            && socket.is_empty()
        {
            return Err(ConfigError::Validation(
                "daemon.socket_path must not be empty when set".to_string(),
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {:?}, got {:?}",
                valid_levels, self.logging.level
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.github.token_env, "GITHUB_TOKEN");
        assert_eq!(config.retry.metadata_attempts, 3);
        assert_eq!(config.retry.blob_attempts, 2);
        assert_eq!(config.retry.base_delay(), Duration::from_secs(1));
        assert_eq!(config.retry.max_delay(), Duration::from_secs(10));
        assert_eq!(config.synth.max_files, 20);
        assert_eq!(config.synth.max_file_bytes, 100_000);
        assert_eq!(config.synth.truncate_chars, 2_000);
        assert_eq!(config.cache.dir, "cache/digests");
        assert_eq!(config.cache.startup_cleanup_delay(), Duration::from_secs(5));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.synth.max_files, 20);
        assert!(config.daemon.socket_path.is_none());
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
            [github]
            api_url = "https://github.example.com/api/v3"
            token_env = "GHE_TOKEN"
            request_timeout_secs = 10

            [retry]
            metadata_attempts = 5
            blob_attempts = 3
            base_delay_ms = 250
            max_delay_ms = 4000

            [synth]
            max_files = 30
            max_file_bytes = 50000
            truncate_chars = 3000
            blob_concurrency = 8

            [cache]
            dir = "/var/cache/repodigest"
            startup_cleanup_delay_secs = 1

            [daemon]
            socket_path = "/run/repodigest.sock"
            request_deadline_secs = 60

            [logging]
            level = "debug"
        "#;
        let config = AppConfig::parse(toml).unwrap();
        assert_eq!(config.github.api_url, "https://github.example.com/api/v3");
        assert_eq!(config.github.token_env, "GHE_TOKEN");
        assert_eq!(config.github.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.retry.metadata_attempts, 5);
        assert_eq!(config.retry.base_delay(), Duration::from_millis(250));
        assert_eq!(config.synth.max_files, 30);
        assert_eq!(config.synth.blob_concurrency, 8);
        assert_eq!(config.cache.dir, "/var/cache/repodigest");
        assert_eq!(
            config.daemon.socket_path.as_deref(),
            Some("/run/repodigest.sock")
        );
        assert_eq!(config.daemon.request_deadline(), Duration::from_secs(60));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validation_rejects_non_http_api_url() {
        let toml = r#"
            [github]
            api_url = "ftp://example.com"
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_zero_attempts() {
        let toml = r#"
            [retry]
            blob_attempts = 0
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_base_delay_above_max() {
        let toml = r#"
            [retry]
            base_delay_ms = 20000
            max_delay_ms = 10000
        "#;
        let err = AppConfig::parse(toml).unwrap_err();
        assert!(err.to_string().contains("base_delay_ms"));
    }

    #[test]
    fn test_validation_rejects_zero_working_set() {
        let toml = r#"
            [synth]
            max_files = 0
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_zero_concurrency() {
        let toml = r#"
            [synth]
            blob_concurrency = 0
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_empty_cache_dir() {
        let toml = r#"
            [cache]
            dir = ""
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_unknown_log_level() {
        let toml = r#"
            [logging]
            level = "loud"
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_ttl_is_not_configurable() {
        // Unknown keys are ignored, so a `ttl` entry has no effect.
        let toml = r#"
            [cache]
            ttl_secs = 1
        "#;
        let config = AppConfig::parse(toml).unwrap();
        let shown = toml::to_string(&config).unwrap();
        assert!(!shown.contains("ttl"));
    }

    // ── Async file-based loading ──────────────────────────────────────

    #[tokio::test]
    async fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("repodigest.toml");
        tokio::fs::write(&path, b"[synth]\nmax_files = 7\n")
            .await
            .unwrap();

        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config.synth.max_files, 7);
    }

    #[tokio::test]
    async fn test_load_nonexistent_file() {
        let result = AppConfig::load(Path::new("/nonexistent/file.toml")).await;
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[tokio::test]
    async fn test_load_invalid_toml_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        tokio::fs::write(&path, b"not valid toml [[[").await.unwrap();

        let result = AppConfig::load(&path).await;
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Validation("bad value".to_string());
        assert_eq!(err.to_string(), "validation error: bad value");
    }
}
