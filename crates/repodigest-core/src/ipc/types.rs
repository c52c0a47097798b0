//! Request/response bodies shared by the IPC server and client.

use serde::{Deserialize, Serialize};

use crate::cache::{CacheStats, CleanupReport};
use crate::remote::RateLimitSnapshot;

/// Daemon health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub git_hash: String,
    pub build_profile: String,
}

/// Daemon runtime status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub running: bool,
    pub version: String,
    pub git_hash: String,
    pub uptime_secs: u64,
    pub cache_dir: String,
    pub api_url: String,
    pub log_level: String,
    pub pid: u32,
    #[serde(default)]
    pub rate_limit: Option<RateLimitSnapshot>,
}

/// Daemon shutdown response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopResponse {
    pub acknowledged: bool,
    pub message: String,
}

/// Configuration response (serialized TOML).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigResponse {
    pub toml: String,
}

/// A digest served by the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestResponse {
    pub repository: String,
    /// `"hit"`, `"miss"`, or `"partial"`.
    pub cache: String,
    pub digest: String,
}

/// Cache statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatsResponse {
    pub dir: String,
    #[serde(flatten)]
    pub stats: CacheStats,
}

/// Result of an on-demand cleanup sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupResponse {
    #[serde(flatten)]
    pub report: CleanupReport,
}

/// Result of clearing one repository's record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearResponse {
    pub repository: String,
    pub removed: bool,
}

/// Generic error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
