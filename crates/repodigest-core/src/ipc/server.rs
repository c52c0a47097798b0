//! IPC server: axum router over a Unix domain socket.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::{Path as UrlPath, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::{delete, get, post};
use tokio::net::UnixListener;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::info;

use repodigest_config::AppConfig;

use super::types::*;
use crate::daemon::ShutdownSignal;
use crate::gateway::{CacheGateway, GatewayError};
use crate::identity::RepositoryIdentity;
use crate::token::AuthToken;

/// Shared state accessible to all IPC route handlers.
pub struct IpcState {
    pub config: watch::Receiver<AppConfig>,
    pub shutdown_tx: broadcast::Sender<ShutdownSignal>,
    pub gateway: Arc<CacheGateway>,
    /// Parent of every digest request's cancellation token.
    pub cancel: CancellationToken,
    pub started_at: Instant,
}

/// Default Unix socket path for daemon IPC.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/repodigest.sock";

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

/// Build the axum router with all IPC routes.
pub fn router(state: Arc<IpcState>) -> axum::Router {
    axum::Router::new()
        .route("/health", get(handle_health))
        .route("/status", get(handle_status))
        .route("/stop", post(handle_stop))
        .route("/config", get(handle_config))
        .route("/digest/{owner}/{repo}", get(handle_digest))
        .route("/digest/{owner}/{repo}/refresh", post(handle_refresh))
        .route("/cache/stats", get(handle_cache_stats))
        .route("/cache/cleanup", post(handle_cache_cleanup))
        .route("/cache/{owner}/{repo}", delete(handle_cache_clear))
        .with_state(state)
}

/// Start the IPC server on the given Unix socket path.
///
/// Removes any stale socket file before binding. Runs until the
/// shutdown signal is received.
pub async fn serve(
    socket_path: &Path,
    state: Arc<IpcState>,
    mut shutdown_rx: broadcast::Receiver<ShutdownSignal>,
) -> Result<(), std::io::Error> {
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let listener = UnixListener::bind(socket_path)?;
    info!(path = %socket_path.display(), "IPC server listening");

    let app = router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("IPC server shutting down");
        })
        .await?;

    std::fs::remove_file(socket_path).ok();
    Ok(())
}

/// Resolve the socket path from config or use the default.
pub fn socket_path_from_config(config: &AppConfig) -> PathBuf {
    config
        .daemon
        .socket_path
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH))
}

fn error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn gateway_error(e: GatewayError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match e {
        GatewayError::NotFound { .. } => StatusCode::NOT_FOUND,
        GatewayError::InvalidIdentity(_) => StatusCode::BAD_REQUEST,
        GatewayError::MetadataUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        GatewayError::Cancelled => StatusCode::GATEWAY_TIMEOUT,
        GatewayError::Setup(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error(status, e.to_string())
}

fn parse_identity(owner: String, repo: String) -> Result<RepositoryIdentity, (StatusCode, Json<ErrorResponse>)> {
    RepositoryIdentity::new(owner, repo).map_err(|e| gateway_error(e.into()))
}

/// Token from `Authorization`, else from the configured environment variable.
fn request_token(headers: &HeaderMap, config: &AppConfig) -> AuthToken {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(AuthToken::from_authorization_header)
        .unwrap_or_else(|| AuthToken::from_env(&config.github.token_env))
}

// ── Route handlers ──────────────────────────────────────────────────────

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::build_info::VERSION.to_string(),
        git_hash: crate::build_info::GIT_HASH.to_string(),
        build_profile: crate::build_info::BUILD_PROFILE.to_string(),
    })
}

async fn handle_status(State(state): State<Arc<IpcState>>) -> Json<StatusResponse> {
    let config = state.config.borrow().clone();

    Json(StatusResponse {
        running: true,
        version: crate::build_info::VERSION.to_string(),
        git_hash: crate::build_info::GIT_HASH.to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        cache_dir: state.gateway.store().dir().display().to_string(),
        api_url: config.github.api_url.clone(),
        log_level: config.logging.level.clone(),
        pid: std::process::id(),
        rate_limit: state.gateway.rate_limit(),
    })
}

async fn handle_stop(State(state): State<Arc<IpcState>>) -> (StatusCode, Json<StopResponse>) {
    info!("Stop requested via IPC");
    let _ = state.shutdown_tx.send(ShutdownSignal);
    (
        StatusCode::OK,
        Json(StopResponse {
            acknowledged: true,
            message: "Shutdown initiated".to_string(),
        }),
    )
}

async fn handle_config(State(state): State<Arc<IpcState>>) -> ApiResult<ConfigResponse> {
    let config = state.config.borrow().clone();
    match toml::to_string_pretty(&config) {
        Ok(toml_str) => Ok(Json(ConfigResponse { toml: toml_str })),
        Err(e) => Err(error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to serialize config: {e}"),
        )),
    }
}

async fn serve_digest(
    state: &IpcState,
    owner: String,
    repo: String,
    headers: &HeaderMap,
    bypass_cache: bool,
) -> ApiResult<DigestResponse> {
    let identity = parse_identity(owner, repo)?;
    let token = request_token(headers, &state.config.borrow());
    let cancel = state.cancel.child_token();

    let outcome = state
        .gateway
        .resolve(&identity, &token, &cancel, bypass_cache)
        .await
        .map_err(gateway_error)?;
    Ok(Json(DigestResponse {
        repository: identity.full_name(),
        cache: outcome.origin.as_str().to_string(),
        digest: outcome.text,
    }))
}

async fn handle_digest(
    State(state): State<Arc<IpcState>>,
    UrlPath((owner, repo)): UrlPath<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<DigestResponse> {
    serve_digest(&state, owner, repo, &headers, false).await
}

async fn handle_refresh(
    State(state): State<Arc<IpcState>>,
    UrlPath((owner, repo)): UrlPath<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<DigestResponse> {
    info!(%owner, %repo, "digest refresh requested via IPC");
    serve_digest(&state, owner, repo, &headers, true).await
}

async fn handle_cache_stats(State(state): State<Arc<IpcState>>) -> Json<CacheStatsResponse> {
    Json(CacheStatsResponse {
        dir: state.gateway.store().dir().display().to_string(),
        stats: state.gateway.cache_stats().await,
    })
}

async fn handle_cache_cleanup(State(state): State<Arc<IpcState>>) -> Json<CleanupResponse> {
    info!("cache cleanup requested via IPC");
    Json(CleanupResponse {
        report: state.gateway.cleanup().await,
    })
}

async fn handle_cache_clear(
    State(state): State<Arc<IpcState>>,
    UrlPath((owner, repo)): UrlPath<(String, String)>,
) -> ApiResult<ClearResponse> {
    let identity = parse_identity(owner, repo)?;
    let removed = state.gateway.clear_repository(&identity).await;
    Ok(Json(ClearResponse {
        repository: identity.full_name(),
        removed,
    }))
}
