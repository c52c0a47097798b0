//! Repository fetcher: a [`RemoteApi`] wrapped in retry policies.
//!
//! Metadata and tree calls share one policy, blob calls another. Every failed
//! attempt is logged and forwarded to an optional [`RetryObserver`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use repodigest_config::RetryConfig;

use crate::identity::RepositoryIdentity;
use crate::remote::{ApiError, RateLimitSnapshot, RemoteApi, RemoteTree, RepositoryMetadata};
use crate::retry::{RetryEvent, RetryPolicy};
use crate::token::AuthToken;

/// Errors surfaced by the fetcher once retries are exhausted.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("repository {repository} not found or not accessible")]
    NotFound { repository: String },

    #[error("metadata for {repository} unavailable: {source}")]
    MetadataUnavailable {
        repository: String,
        #[source]
        source: ApiError,
    },

    #[error("tree {branch} of {repository} unavailable: {source}")]
    TreeUnavailable {
        repository: String,
        branch: String,
        #[source]
        source: ApiError,
    },

    #[error("blob {sha} of {repository} unavailable: {source}")]
    BlobUnavailable {
        repository: String,
        sha: String,
        #[source]
        source: ApiError,
    },
}

/// Which remote call a retry notice refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStage {
    Metadata,
    Tree,
    Blob,
}

impl fmt::Display for FetchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchStage::Metadata => write!(f, "metadata"),
            FetchStage::Tree => write!(f, "tree"),
            FetchStage::Blob => write!(f, "blob"),
        }
    }
}

/// One failed attempt, as reported to a [`RetryObserver`].
#[derive(Debug, Clone)]
pub struct RetryNotice {
    pub stage: FetchStage,
    pub repository: String,
    pub attempt: u32,
    pub max_attempts: u32,
    pub error: ApiError,
    /// `None` when this was the last attempt.
    pub next_delay: Option<Duration>,
}

/// Callback invoked on every failed remote attempt.
pub type RetryObserver = Arc<dyn Fn(&RetryNotice) + Send + Sync>;

/// Retrying front end to a [`RemoteApi`].
#[derive(Clone)]
pub struct RepositoryFetcher {
    api: Arc<dyn RemoteApi>,
    metadata_policy: RetryPolicy,
    blob_policy: RetryPolicy,
    observer: Option<RetryObserver>,
}

impl RepositoryFetcher {
    pub fn new(api: Arc<dyn RemoteApi>, config: &RetryConfig) -> Self {
        Self::with_policies(
            api,
            RetryPolicy::for_metadata(config),
            RetryPolicy::for_blobs(config),
        )
    }

    pub fn with_policies(
        api: Arc<dyn RemoteApi>,
        metadata_policy: RetryPolicy,
        blob_policy: RetryPolicy,
    ) -> Self {
        Self {
            api,
            metadata_policy,
            blob_policy,
            observer: None,
        }
    }

    /// Attach an observer that sees every failed attempt.
    pub fn with_observer(mut self, observer: RetryObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Display name of the underlying API.
    pub fn api_name(&self) -> &str {
        self.api.name()
    }

    pub fn rate_limit(&self) -> Option<RateLimitSnapshot> {
        self.api.rate_limit()
    }

    /// Fetch repository metadata.
    ///
    /// Not-found, unauthorized, and forbidden all map to
    /// [`FetchError::NotFound`]; the caller cannot tell them apart.
    pub async fn get_metadata(
        &self,
        repo: &RepositoryIdentity,
        token: &AuthToken,
    ) -> Result<RepositoryMetadata, FetchError> {
        self.metadata_policy
            .run(
                |_| self.api.metadata(repo, token),
                |event| self.notify(FetchStage::Metadata, repo, event),
            )
            .await
            .map_err(|source| {
                if source.is_not_found() {
                    FetchError::NotFound {
                        repository: repo.full_name(),
                    }
                } else {
                    FetchError::MetadataUnavailable {
                        repository: repo.full_name(),
                        source,
                    }
                }
            })
    }

    /// Fetch the recursive tree of `branch`.
    pub async fn get_tree(
        &self,
        repo: &RepositoryIdentity,
        branch: &str,
        token: &AuthToken,
    ) -> Result<RemoteTree, FetchError> {
        self.metadata_policy
            .run(
                |_| self.api.tree(repo, branch, token),
                |event| self.notify(FetchStage::Tree, repo, event),
            )
            .await
            .map_err(|source| FetchError::TreeUnavailable {
                repository: repo.full_name(),
                branch: branch.to_string(),
                source,
            })
    }

    /// Fetch one blob's raw bytes.
    pub async fn get_blob(
        &self,
        repo: &RepositoryIdentity,
        sha: &str,
        token: &AuthToken,
    ) -> Result<Vec<u8>, FetchError> {
        self.blob_policy
            .run(
                |_| self.api.blob(repo, sha, token),
                |event| self.notify(FetchStage::Blob, repo, event),
            )
            .await
            .map_err(|source| FetchError::BlobUnavailable {
                repository: repo.full_name(),
                sha: sha.to_string(),
                source,
            })
    }

    fn notify(&self, stage: FetchStage, repo: &RepositoryIdentity, event: RetryEvent<'_, ApiError>) {
        match event.next_delay {
            Some(delay) => warn!(
                owner = repo.owner(),
                repo = repo.repo(),
                %stage,
                attempt = event.attempt,
                max_attempts = event.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %event.error,
                "remote call failed, retrying"
            ),
            None => debug!(
                owner = repo.owner(),
                repo = repo.repo(),
                %stage,
                attempt = event.attempt,
                error = %event.error,
                "remote call failed, giving up"
            ),
        }

        if let Some(ref observer) = self.observer {
            observer(&RetryNotice {
                stage,
                repository: repo.full_name(),
                attempt: event.attempt,
                max_attempts: event.max_attempts,
                error: event.error.clone(),
                next_delay: event.next_delay,
            });
        }
    }
}

impl fmt::Debug for RepositoryFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryFetcher")
            .field("api", &self.api.name())
            .field("metadata_policy", &self.metadata_policy)
            .field("blob_policy", &self.blob_policy)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}
