//! Upstream API rate-limit tracking.
//!
//! Reads `X-RateLimit-Remaining` / `X-RateLimit-Reset` from every API response
//! so the transport can classify 403s correctly and warn before the budget
//! runs dry.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Remaining-call threshold below which a warning is logged.
const LOW_WATER_MARK: u64 = 10;

/// Point-in-time view of the upstream budget, as reported on `/status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    /// `None` until a response carrying the header has been seen.
    pub remaining: Option<u64>,
    /// Unix timestamp at which the window resets.
    pub reset_at: Option<u64>,
}

/// Shared rate-limit state, updated after every API response.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    remaining: Arc<AtomicU64>,
    reset_at: Arc<AtomicU64>,
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitState {
    pub fn new() -> Self {
        Self {
            remaining: Arc::new(AtomicU64::new(u64::MAX)),
            reset_at: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Remaining calls; `u64::MAX` until the first response is seen.
    pub fn remaining(&self) -> u64 {
        self.remaining.load(Ordering::Relaxed)
    }

    /// Unix timestamp at which the window resets.
    pub fn reset_at(&self) -> u64 {
        self.reset_at.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> RateLimitSnapshot {
        let remaining = self.remaining();
        let reset_at = self.reset_at();
        RateLimitSnapshot {
            remaining: (remaining != u64::MAX).then_some(remaining),
            reset_at: (reset_at != 0).then_some(reset_at),
        }
    }

    /// Update from response headers.
    pub fn update_from_headers(&self, headers: &HeaderMap) {
        let remaining = header_u64(headers, "X-RateLimit-Remaining");
        let reset = header_u64(headers, "X-RateLimit-Reset");

        if let Some(r) = reset {
            self.reset_at.store(r, Ordering::Relaxed);
        }
        if let Some(r) = remaining {
            self.remaining.store(r, Ordering::Relaxed);
            if r < LOW_WATER_MARK {
                warn!(
                    remaining = r,
                    reset_in_secs = self.retry_after_secs(),
                    "API rate limit nearly exhausted"
                );
            }
        }
    }

    /// Seconds until the window resets, or 0 if it already has.
    pub fn retry_after_secs(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.reset_at().saturating_sub(now)
    }
}

/// Whether the headers say the rate-limit budget is spent.
pub fn headers_report_exhausted(headers: &HeaderMap) -> bool {
    header_u64(headers, "X-RateLimit-Remaining") == Some(0)
}

/// `Retry-After` in seconds, if present and numeric.
pub fn retry_after_header(headers: &HeaderMap) -> Option<u64> {
    header_u64(headers, "Retry-After")
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}
