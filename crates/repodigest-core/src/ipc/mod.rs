//! Daemon IPC: HTTP/JSON over a Unix domain socket.
//!
//! The daemon owns one long-lived [`CacheGateway`](crate::gateway::CacheGateway)
//! and exposes it, plus lifecycle and cache maintenance routes, to local
//! clients.
//!
//! ```text
//! ┌──────────┐         Unix socket        ┌──────────────┐
//! │   CLI    │───────────────────────────▶│  IPC Server  │
//! │          │  HTTP/1.1 + JSON           │  (axum)      │
//! └──────────┘                            └──────┬───────┘
//!                                                │
//!                                         ┌──────▼───────┐
//!                                         │ CacheGateway │
//!                                         └──────────────┘
//! ```

pub mod client;
pub mod server;
pub mod types;

pub use client::{IpcClient, IpcClientError};
pub use server::{DEFAULT_SOCKET_PATH, IpcState};
pub use types::*;
