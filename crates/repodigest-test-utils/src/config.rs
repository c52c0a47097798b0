//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`AppConfig`] values without
//! repeating boilerplate across crate boundaries.

use std::path::Path;

use repodigest_config::AppConfig;

/// Fluent builder for [`AppConfig`] in tests.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .cache_dir(dir.path())
///     .fast_retries()
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn cache_dir(mut self, dir: &Path) -> Self {
        self.config.cache.dir = dir.display().to_string();
        self
    }

    pub fn socket_path(mut self, path: &Path) -> Self {
        self.config.daemon.socket_path = Some(path.display().to_string());
        self
    }

    /// Millisecond backoff so retry tests do not sleep for seconds.
    pub fn fast_retries(mut self) -> Self {
        self.config.retry.base_delay_ms = 1;
        self.config.retry.max_delay_ms = 4;
        self
    }

    pub fn metadata_attempts(mut self, n: u32) -> Self {
        self.config.retry.metadata_attempts = n;
        self
    }

    pub fn blob_attempts(mut self, n: u32) -> Self {
        self.config.retry.blob_attempts = n;
        self
    }

    pub fn max_files(mut self, n: usize) -> Self {
        self.config.synth.max_files = n;
        self
    }

    pub fn truncate_chars(mut self, n: usize) -> Self {
        self.config.synth.truncate_chars = n;
        self
    }

    pub fn blob_concurrency(mut self, n: usize) -> Self {
        self.config.synth.blob_concurrency = n;
        self
    }

    pub fn request_deadline_secs(mut self, secs: u64) -> Self {
        self.config.daemon.request_deadline_secs = secs;
        self
    }

    pub fn startup_cleanup_delay_secs(mut self, secs: u64) -> Self {
        self.config.cache.startup_cleanup_delay_secs = secs;
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
