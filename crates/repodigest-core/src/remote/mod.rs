//! Remote hosting API: single-attempt transport for repository data.
//!
//! [`RemoteApi`] is the seam between the pipeline and the network. Each method
//! performs exactly one request; retries live one layer up in
//! [`RepositoryFetcher`](crate::fetcher::RepositoryFetcher) so the transport
//! stays trivially mockable.
//!
//! ```text
//! ┌──────────────────┐     ┌────────────┐
//! │ RepositoryFetcher │────▶│ RemoteApi  │  (trait)
//! │  (retry policy)   │     └─────┬──────┘
//! └──────────────────┘           │
//!                     ┌──────────┴──────────┐
//!                     ▼                     ▼
//!              ┌─────────────┐      ┌──────────────┐
//!              │  GitHubApi  │      │ test doubles │
//!              │  (reqwest)  │      └──────────────┘
//!              └─────────────┘
//! ```

pub mod github;
pub mod rate_limit;

pub use github::GitHubApi;
pub use rate_limit::{RateLimitSnapshot, RateLimitState};

use serde::{Deserialize, Serialize};

use crate::BoxFuture;
use crate::identity::RepositoryIdentity;
use crate::retry::Transient;
use crate::token::AuthToken;

/// Errors from a single remote call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,

    #[error("authentication failed: {0}")]
    Unauthorized(String),

    #[error("access forbidden: {0}")]
    Forbidden(String),

    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("upstream error: {status}: {message}")]
    Status { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("timeout")]
    Timeout,

    #[error("response parse error: {0}")]
    Parse(String),
}

impl ApiError {
    /// Whether the error means "this repository is not visible to this token".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ApiError::NotFound | ApiError::Unauthorized(_) | ApiError::Forbidden(_)
        )
    }
}

impl Transient for ApiError {
    fn is_transient(&self) -> bool {
        match self {
            ApiError::RateLimited { .. } | ApiError::Network(_) | ApiError::Timeout => true,
            ApiError::Status { status, .. } => *status >= 500 || *status == 408,
            ApiError::NotFound
            | ApiError::Unauthorized(_)
            | ApiError::Forbidden(_)
            | ApiError::Parse(_) => false,
        }
    }
}

/// Repository-level metadata.
///
/// Fields the API may omit are `None`, never an empty placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryMetadata {
    pub name: String,
    pub full_name: String,
    pub default_branch: String,
    /// Repository size as reported by the API. Zero means never populated.
    pub size: u64,
    pub description: Option<String>,
    pub license: Option<String>,
    pub language: Option<String>,
}

/// Kind of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Blob,
    Tree,
    /// Submodule commits and anything else the API may add.
    #[serde(other)]
    Other,
}

/// One entry of a recursive tree listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileEntry {
    pub path: String,
    /// Size in bytes; trees and some blobs report none.
    pub size: Option<u64>,
    /// Blob SHA used to fetch the content.
    pub sha: String,
    pub kind: EntryKind,
}

impl RemoteFileEntry {
    pub fn blob(path: impl Into<String>, size: u64, sha: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size: Some(size),
            sha: sha.into(),
            kind: EntryKind::Blob,
        }
    }

    pub fn tree(path: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size: None,
            sha: sha.into(),
            kind: EntryKind::Tree,
        }
    }
}

/// A recursive tree listing, in the order the API returned it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteTree {
    pub entries: Vec<RemoteFileEntry>,
    /// The API stopped listing early because the tree is too large.
    pub truncated: bool,
}

/// Single-attempt access to a repository hosting API.
///
/// Implementations must be `Send + Sync`; methods return [`BoxFuture`] so the
/// trait stays object safe (`Arc<dyn RemoteApi>`).
pub trait RemoteApi: Send + Sync {
    /// Backend display name (e.g. "GitHub").
    fn name(&self) -> &str;

    /// Fetch repository metadata.
    fn metadata<'a>(
        &'a self,
        repo: &'a RepositoryIdentity,
        token: &'a AuthToken,
    ) -> BoxFuture<'a, Result<RepositoryMetadata, ApiError>>;

    /// Fetch the full recursive tree of `branch`.
    fn tree<'a>(
        &'a self,
        repo: &'a RepositoryIdentity,
        branch: &'a str,
        token: &'a AuthToken,
    ) -> BoxFuture<'a, Result<RemoteTree, ApiError>>;

    /// Fetch the raw bytes of one blob.
    fn blob<'a>(
        &'a self,
        repo: &'a RepositoryIdentity,
        sha: &'a str,
        token: &'a AuthToken,
    ) -> BoxFuture<'a, Result<Vec<u8>, ApiError>>;

    /// Latest upstream rate-limit budget, for backends that track one.
    fn rate_limit(&self) -> Option<RateLimitSnapshot> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ApiError::Timeout.is_transient());
        assert!(ApiError::Network("reset".into()).is_transient());
        assert!(
            ApiError::RateLimited {
                retry_after_secs: 30
            }
            .is_transient()
        );
        assert!(
            ApiError::Status {
                status: 502,
                message: String::new()
            }
            .is_transient()
        );
        assert!(
            !ApiError::Status {
                status: 422,
                message: String::new()
            }
            .is_transient()
        );
        assert!(!ApiError::NotFound.is_transient());
        assert!(!ApiError::Unauthorized("bad".into()).is_transient());
        assert!(!ApiError::Parse("eof".into()).is_transient());
    }

    #[test]
    fn test_not_found_classification() {
        assert!(ApiError::NotFound.is_not_found());
        assert!(ApiError::Unauthorized(String::new()).is_not_found());
        assert!(ApiError::Forbidden(String::new()).is_not_found());
        assert!(!ApiError::Timeout.is_not_found());
    }

    #[test]
    fn test_entry_kind_deserializes_unknown_as_other() {
        let kind: EntryKind = serde_json::from_str("\"commit\"").unwrap();
        assert_eq!(kind, EntryKind::Other);
        let kind: EntryKind = serde_json::from_str("\"blob\"").unwrap();
        assert_eq!(kind, EntryKind::Blob);
    }
}
