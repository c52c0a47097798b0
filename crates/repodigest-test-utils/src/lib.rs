#![deny(unsafe_code)]

//! Shared test utilities for the repodigest workspace.
//!
//! Provides a scripted [`RemoteApi`](repodigest_core::RemoteApi) double,
//! config builders, temp cache and daemon fixtures, and tracing helpers so
//! that individual crate tests stay concise and consistent.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! repodigest-test-utils = { workspace = true }
//! ```

pub mod cache;
pub mod config;
pub mod daemon;
pub mod remote;
pub mod tracing_setup;

pub use cache::TempCache;
pub use config::TestConfigBuilder;
pub use daemon::TestDaemon;
pub use remote::MockRemoteApi;
