//! Daemon round trips over the Unix socket.

use pretty_assertions::assert_eq;

use repodigest_core::ipc::{IpcClient, IpcClientError};
use repodigest_core::{AuthToken, RepositoryIdentity};
use repodigest_test_utils::remote::metadata;
use repodigest_test_utils::tracing_setup::init_test_tracing;
use repodigest_test_utils::{MockRemoteApi, TestDaemon};

fn widget() -> RepositoryIdentity {
    RepositoryIdentity::new("acme", "widget").unwrap()
}

fn widget_api() -> MockRemoteApi {
    MockRemoteApi::new(metadata("acme", "widget", 64))
        .with_file("README.md", "# widget")
        .with_file("src/main.rs", "fn main() {}")
}

#[tokio::test]
async fn health_and_status() {
    init_test_tracing();
    let daemon = TestDaemon::start(widget_api().with_rate_limit(4_321, 1_700_000_000)).await;
    let client = IpcClient::new(&daemon.socket_path);

    let health = client.health().await.unwrap();
    assert_eq!(health.status, "ok");

    let status = client.status().await.unwrap();
    assert!(status.running);
    assert_eq!(status.pid, std::process::id());
    assert!(status.cache_dir.ends_with("digests"));
    let rate_limit = status.rate_limit.unwrap();
    assert_eq!(rate_limit.remaining, Some(4_321));
    assert_eq!(rate_limit.reset_at, Some(1_700_000_000));

    let config = client.config().await.unwrap();
    assert!(config.toml.contains("[cache]"));

    client.stop().await.unwrap();
    daemon.join().await.unwrap();
}

#[tokio::test]
async fn digest_miss_then_hit_forwards_token() {
    init_test_tracing();
    let daemon = TestDaemon::start(widget_api()).await;
    let client = IpcClient::new(&daemon.socket_path);
    let token = AuthToken::new("ghp_from_cli");

    let first = client.digest(&widget(), &token).await.unwrap();
    assert_eq!(first.repository, "acme/widget");
    assert_eq!(first.cache, "miss");
    assert!(first.digest.contains("### File: README.md"));
    assert_eq!(daemon.api.last_token().as_deref(), Some("ghp_from_cli"));
    let calls = daemon.api.total_calls();

    let second = client.digest(&widget(), &token).await.unwrap();
    assert_eq!(second.cache, "hit");
    assert_eq!(second.digest, first.digest);
    assert_eq!(daemon.api.total_calls(), calls);

    let refreshed = client.refresh(&widget(), &token).await.unwrap();
    assert_eq!(refreshed.cache, "miss");
    assert!(daemon.api.total_calls() > calls);

    client.stop().await.unwrap();
    daemon.join().await.unwrap();
}

#[tokio::test]
async fn cache_routes() {
    init_test_tracing();
    let daemon = TestDaemon::start(widget_api()).await;
    let client = IpcClient::new(&daemon.socket_path);

    client.digest(&widget(), &AuthToken::default()).await.unwrap();

    let stats = client.cache_stats().await.unwrap();
    assert_eq!(stats.stats.file_count, 1);
    assert!(stats.stats.total_size > 0);

    let cleanup = client.cache_cleanup().await.unwrap();
    assert_eq!(cleanup.report.deleted, 0);

    let cleared = client.cache_clear(&widget()).await.unwrap();
    assert!(cleared.removed);
    let cleared_again = client.cache_clear(&widget()).await.unwrap();
    assert!(!cleared_again.removed);

    assert_eq!(client.cache_stats().await.unwrap().stats.file_count, 0);

    client.stop().await.unwrap();
    daemon.join().await.unwrap();
}

#[tokio::test]
async fn missing_repository_is_404() {
    init_test_tracing();
    let daemon = TestDaemon::start(MockRemoteApi::missing()).await;
    let client = IpcClient::new(&daemon.socket_path);
    let ghost = RepositoryIdentity::new("acme", "ghost").unwrap();

    let err = client.digest(&ghost, &AuthToken::default()).await.unwrap_err();
    match err {
        IpcClientError::Daemon { status, message } => {
            assert_eq!(status, 404);
            assert!(message.contains("acme/ghost"));
        }
        other => panic!("unexpected error {other:?}"),
    }

    client.stop().await.unwrap();
    daemon.join().await.unwrap();
}

#[tokio::test]
async fn stopped_daemon_is_not_running() {
    init_test_tracing();
    let daemon = TestDaemon::start(widget_api()).await;
    let socket = daemon.socket_path.clone();
    let client = IpcClient::new(&socket);

    let stop = client.stop().await.unwrap();
    assert!(stop.acknowledged);
    daemon.join().await.unwrap();

    assert!(matches!(
        client.health().await,
        Err(IpcClientError::NotRunning(_))
    ));
}
