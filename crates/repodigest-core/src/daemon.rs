//! Long-running daemon: owns the gateway, serves IPC, sweeps the cache.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use repodigest_config::AppConfig;

use crate::cache;
use crate::gateway::{CacheGateway, GatewayError};
use crate::ipc::server::{self, IpcState};

/// Shutdown signal sent via broadcast channel.
#[derive(Debug, Clone)]
pub struct ShutdownSignal;

/// The repodigest daemon.
pub struct Daemon {
    config: AppConfig,
    gateway: Arc<CacheGateway>,
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
    _shutdown_rx: broadcast::Receiver<ShutdownSignal>,
}

impl Daemon {
    /// Build the production gateway from `config`.
    pub fn new(config: AppConfig) -> Result<Self, DaemonError> {
        let gateway = CacheGateway::from_config(&config)?;
        Ok(Self::with_gateway(config, Arc::new(gateway)))
    }

    /// Use an already constructed gateway.
    pub fn with_gateway(config: AppConfig, gateway: Arc<CacheGateway>) -> Self {
        let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);
        Self {
            config,
            gateway,
            shutdown_tx,
            _shutdown_rx,
        }
    }

    /// Run until `/stop`, [`shutdown`](Self::shutdown), or Ctrl-C.
    ///
    /// The startup cache sweep runs in the background after the configured
    /// delay and never holds up the IPC listener.
    pub async fn run(&self) -> Result<(), DaemonError> {
        let socket_path = self.socket_path();
        info!(
            socket = %socket_path.display(),
            cache_dir = %self.gateway.store().dir().display(),
            "repodigest daemon starting"
        );

        let sweep = cache::spawn_startup_cleanup(
            self.gateway.store().clone(),
            self.config.cache.startup_cleanup_delay(),
        );

        let cancel = CancellationToken::new();
        let (_config_tx, config_rx) = watch::channel(self.config.clone());
        let state = Arc::new(IpcState {
            config: config_rx,
            shutdown_tx: self.shutdown_tx.clone(),
            gateway: self.gateway.clone(),
            cancel: cancel.clone(),
            started_at: Instant::now(),
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let server_rx = self.shutdown_tx.subscribe();
        let server = tokio::spawn(async move { server::serve(&socket_path, state, server_rx).await });

        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, stopping daemon");
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Ctrl-C received, initiating graceful shutdown");
                let _ = self.shutdown_tx.send(ShutdownSignal);
            }
        }

        cancel.cancel();
        sweep.abort();
        match server.await {
            Ok(result) => result?,
            Err(e) => return Err(DaemonError::Startup(format!("IPC server task failed: {e}"))),
        }

        info!("Daemon stopped");
        Ok(())
    }

    /// Request a graceful shutdown of the daemon.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(ShutdownSignal);
    }

    pub fn socket_path(&self) -> PathBuf {
        server::socket_path_from_config(&self.config)
    }

    pub fn gateway(&self) -> &Arc<CacheGateway> {
        &self.gateway
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// Errors from the daemon runtime.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("daemon startup failed: {0}")]
    Startup(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> AppConfig {
        let mut config = AppConfig::default();
        config.cache.dir = dir.path().join("digests").display().to_string();
        config.daemon.socket_path = Some(dir.path().join("rd.sock").display().to_string());
        config
    }

    #[tokio::test]
    async fn test_daemon_creation_opens_cache() {
        let dir = TempDir::new().unwrap();
        let daemon = Daemon::new(config(&dir)).unwrap();
        assert!(dir.path().join("digests").is_dir());
        assert_eq!(daemon.socket_path(), dir.path().join("rd.sock"));
        assert_eq!(daemon.config().daemon.request_deadline_secs, 120);
    }

    #[tokio::test]
    async fn test_daemon_shutdown_before_run_does_not_panic() {
        let dir = TempDir::new().unwrap();
        let daemon = Daemon::new(config(&dir)).unwrap();
        daemon.shutdown();
    }

    #[tokio::test]
    async fn test_daemon_runs_until_shutdown() {
        let dir = TempDir::new().unwrap();
        let daemon = Arc::new(Daemon::new(config(&dir)).unwrap());

        let runner = daemon.clone();
        let handle = tokio::spawn(async move { runner.run().await });

        let socket = daemon.socket_path();
        for _ in 0..50 {
            if socket.exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(socket.exists());

        daemon.shutdown();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert!(!socket.exists());
    }
}
