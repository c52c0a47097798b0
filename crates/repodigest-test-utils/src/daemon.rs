//! Daemon test helpers.
//!
//! [`TestDaemon`] runs a real daemon (IPC socket, startup sweep) over a
//! [`MockRemoteApi`] with everything rooted in a temp directory.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use repodigest_config::AppConfig;
use repodigest_core::daemon::DaemonError;
use repodigest_core::{CacheGateway, Daemon, DiskCacheStore, RepositoryFetcher, Synthesizer};
use tempfile::TempDir;
use tokio::task::JoinHandle;

use crate::config::TestConfigBuilder;
use crate::remote::MockRemoteApi;

/// A running daemon plus the temp directory holding its socket and cache.
///
/// The temp directory is deleted when this value is dropped, even on panic.
pub struct TestDaemon {
    pub daemon: Arc<Daemon>,
    pub api: Arc<MockRemoteApi>,
    pub socket_path: PathBuf,
    handle: JoinHandle<Result<(), DaemonError>>,
    _temp_dir: TempDir,
}

impl TestDaemon {
    /// Start a daemon serving `api` and wait for its socket to appear.
    pub async fn start(api: MockRemoteApi) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let socket_path = temp_dir.path().join("repodigest.sock");
        let config: AppConfig = TestConfigBuilder::new()
            .cache_dir(&temp_dir.path().join("digests"))
            .socket_path(&socket_path)
            .fast_retries()
            .build();

        let api = Arc::new(api);
        let store = DiskCacheStore::open(&config.cache.dir).expect("failed to open cache store");
        let gateway = CacheGateway::new(
            Arc::new(store),
            RepositoryFetcher::new(api.clone(), &config.retry),
            Synthesizer::new(&config.synth),
            config.daemon.request_deadline(),
        );
        let daemon = Arc::new(Daemon::with_gateway(config, Arc::new(gateway)));

        let runner = daemon.clone();
        let handle = tokio::spawn(async move { runner.run().await });

        for _ in 0..100 {
            if socket_path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(socket_path.exists(), "daemon socket never appeared");

        Self {
            daemon,
            api,
            socket_path,
            handle,
            _temp_dir: temp_dir,
        }
    }

    /// Wait for the daemon task to exit after a stop request.
    pub async fn join(self) -> Result<(), DaemonError> {
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("daemon did not stop in time")
            .expect("daemon task panicked")
    }
}
