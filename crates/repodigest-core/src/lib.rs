#![deny(unsafe_code)]

//! repodigest core runtime.
//!
//! Turns a remote repository into a bounded, importance-ranked text digest
//! and keeps it in a self-expiring disk cache. The [`CacheGateway`] is the
//! front door; the daemon wraps one gateway behind a local IPC socket.

use std::future::Future;
use std::pin::Pin;

/// A type-erased, `Send`-safe, boxed future: the return type for async trait
/// methods that require dynamic dispatch (`dyn RemoteApi`).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// Disk-backed digest cache with TTL and sweeping.
pub mod cache;
/// Daemon process: gateway, IPC listener, startup sweep.
pub mod daemon;
/// Retrying front end to the remote API.
pub mod fetcher;
/// Cache-first digest orchestration and the library entry point.
pub mod gateway;
/// Repository identity and storage-key derivation.
pub mod identity;
/// Unix socket IPC between CLI and daemon.
pub mod ipc;
/// Single-attempt remote API transport.
pub mod remote;
/// Exponential backoff retry policy.
pub mod retry;
/// Digest synthesis: filtering, scoring, truncation, rendering.
pub mod synth;
/// Zeroizing API token wrapper.
pub mod token;

pub use cache::DiskCacheStore;
pub use daemon::Daemon;
pub use fetcher::RepositoryFetcher;
pub use gateway::{CacheGateway, GatewayError, synthesize_or_fetch_digest};
pub use identity::RepositoryIdentity;
pub use remote::{GitHubApi, RemoteApi};
pub use retry::RetryPolicy;
pub use synth::{Digest, Synthesizer};
pub use token::AuthToken;
