//! IPC client: typed access to a running daemon over its Unix socket.
//!
//! Uses `hyper` for HTTP/1.1 over the socket, one connection per request.

use std::path::PathBuf;

use hyper::body::Bytes;
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use tokio::net::UnixStream;
use tracing::debug;

use super::types::*;
use crate::identity::RepositoryIdentity;
use crate::token::AuthToken;

/// Errors from the IPC client.
#[derive(Debug, thiserror::Error)]
pub enum IpcClientError {
    #[error("failed to connect to daemon socket at {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("daemon is not running (socket not found at {0})")]
    NotRunning(PathBuf),

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("daemon returned {status}: {message}")]
    Daemon { status: u16, message: String },
}

/// Client for communicating with the repodigest daemon via Unix socket.
pub struct IpcClient {
    socket_path: PathBuf,
}

impl IpcClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    /// Check if the daemon socket exists (daemon is likely running).
    pub fn daemon_available(&self) -> bool {
        self.socket_path.exists()
    }

    async fn request(
        &self,
        method: hyper::Method,
        path: &str,
        token: Option<&AuthToken>,
    ) -> Result<Bytes, IpcClientError> {
        if !self.daemon_available() {
            return Err(IpcClientError::NotRunning(self.socket_path.clone()));
        }

        let stream =
            UnixStream::connect(&self.socket_path)
                .await
                .map_err(|e| IpcClientError::Connect {
                    path: self.socket_path.clone(),
                    source: e,
                })?;

        let (mut sender, conn) = hyper::client::conn::http1::handshake::<
            _,
            http_body_util::Full<Bytes>,
        >(TokioIo::new(stream))
        .await
        .map_err(|e| IpcClientError::Request(format!("HTTP handshake failed: {e}")))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::warn!(error = %e, "IPC connection error");
            }
        });

        debug!(%method, path, "IPC request");

        let mut builder = hyper::Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost");
        if let Some(token) = token.filter(|t| !t.is_anonymous()) {
            builder = builder.header("authorization", format!("Bearer {}", token.expose()));
        }

        let req = builder
            .body(http_body_util::Full::new(Bytes::new()))
            .map_err(|e| IpcClientError::Request(format!("failed to build request: {e}")))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| IpcClientError::Request(format!("request failed: {e}")))?;

        let status = resp.status();
        let resp_body = http_body_util::BodyExt::collect(resp.into_body())
            .await
            .map_err(|e| IpcClientError::Request(format!("failed to read response body: {e}")))?
            .to_bytes();

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorResponse>(&resp_body)
                .map(|e| e.error)
                .unwrap_or_else(|_| format!("unexpected status: {status}"));
            return Err(IpcClientError::Daemon {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp_body)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: hyper::Method,
        path: &str,
        token: Option<&AuthToken>,
    ) -> Result<T, IpcClientError> {
        let body = self.request(method, path, token).await?;
        serde_json::from_slice(&body).map_err(|e| IpcClientError::Parse(format!("{path}: {e}")))
    }

    // ── Typed API methods ──────────────────────────────────────────────

    pub async fn health(&self) -> Result<HealthResponse, IpcClientError> {
        self.call(hyper::Method::GET, "/health", None).await
    }

    pub async fn status(&self) -> Result<StatusResponse, IpcClientError> {
        self.call(hyper::Method::GET, "/status", None).await
    }

    /// Request daemon shutdown.
    pub async fn stop(&self) -> Result<StopResponse, IpcClientError> {
        self.call(hyper::Method::POST, "/stop", None).await
    }

    /// The daemon's resolved config as TOML.
    pub async fn config(&self) -> Result<ConfigResponse, IpcClientError> {
        self.call(hyper::Method::GET, "/config", None).await
    }

    /// Digest for `repo`, served from the daemon's cache when fresh.
    pub async fn digest(
        &self,
        repo: &RepositoryIdentity,
        token: &AuthToken,
    ) -> Result<DigestResponse, IpcClientError> {
        let path = format!("/digest/{}/{}", repo.owner(), repo.repo());
        self.call(hyper::Method::GET, &path, Some(token)).await
    }

    /// Regenerate the digest for `repo`, bypassing the cache.
    pub async fn refresh(
        &self,
        repo: &RepositoryIdentity,
        token: &AuthToken,
    ) -> Result<DigestResponse, IpcClientError> {
        let path = format!("/digest/{}/{}/refresh", repo.owner(), repo.repo());
        self.call(hyper::Method::POST, &path, Some(token)).await
    }

    pub async fn cache_stats(&self) -> Result<CacheStatsResponse, IpcClientError> {
        self.call(hyper::Method::GET, "/cache/stats", None).await
    }

    pub async fn cache_cleanup(&self) -> Result<CleanupResponse, IpcClientError> {
        self.call(hyper::Method::POST, "/cache/cleanup", None).await
    }

    pub async fn cache_clear(&self, repo: &RepositoryIdentity) -> Result<ClearResponse, IpcClientError> {
        let path = format!("/cache/{}/{}", repo.owner(), repo.repo());
        self.call(hyper::Method::DELETE, &path, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = IpcClient::new("/tmp/test-repodigest.sock");
        assert!(!client.daemon_available());
    }

    #[tokio::test]
    async fn test_client_not_running_error() {
        let client = IpcClient::new("/tmp/nonexistent-repodigest.sock");
        let result = client.health().await;
        assert!(matches!(result, Err(IpcClientError::NotRunning(_))));
    }
}
