//! Cache gateway: the single entry point for obtaining a digest.
//!
//! ```text
//! lookup ──hit──▶ done
//!    │
//!   miss ──▶ synthesize ──▶ persist (unless partial) ──▶ done
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use repodigest_config::AppConfig;

use crate::cache::{CacheError, CacheStats, CleanupReport, DiskCacheStore};
use crate::fetcher::{FetchError, RepositoryFetcher};
use crate::identity::{IdentityError, RepositoryIdentity};
use crate::remote::{ApiError, GitHubApi, RateLimitSnapshot};
use crate::synth::{SynthError, Synthesizer};
use crate::token::AuthToken;

/// Errors a digest caller can see.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("repository {repository} not found or not accessible")]
    NotFound { repository: String },

    #[error("repository metadata for {repository} unavailable: {source}")]
    MetadataUnavailable {
        repository: String,
        #[source]
        source: ApiError,
    },

    #[error(transparent)]
    InvalidIdentity(#[from] IdentityError),

    #[error("request cancelled before repository metadata arrived")]
    Cancelled,

    #[error("gateway setup failed: {0}")]
    Setup(String),
}

impl From<SynthError> for GatewayError {
    fn from(e: SynthError) -> Self {
        match e {
            SynthError::Cancelled => GatewayError::Cancelled,
            SynthError::Metadata(FetchError::NotFound { repository }) => {
                GatewayError::NotFound { repository }
            }
            SynthError::Metadata(
                FetchError::MetadataUnavailable { repository, source }
                | FetchError::TreeUnavailable {
                    repository, source, ..
                }
                | FetchError::BlobUnavailable {
                    repository, source, ..
                },
            ) => GatewayError::MetadataUnavailable { repository, source },
        }
    }
}

impl From<CacheError> for GatewayError {
    fn from(e: CacheError) -> Self {
        GatewayError::Setup(e.to_string())
    }
}

/// Where a returned digest came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestOrigin {
    Cache,
    Fresh,
    /// Freshly synthesized but cut short; not persisted.
    Partial,
}

impl DigestOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestOrigin::Cache => "hit",
            DigestOrigin::Fresh => "miss",
            DigestOrigin::Partial => "partial",
        }
    }
}

/// Digest text plus its origin.
#[derive(Debug, Clone)]
pub struct DigestOutcome {
    pub text: String,
    pub origin: DigestOrigin,
}

/// Cache-first digest orchestration.
#[derive(Debug)]
pub struct CacheGateway {
    store: Arc<DiskCacheStore>,
    fetcher: RepositoryFetcher,
    synthesizer: Synthesizer,
    deadline: Duration,
}

impl CacheGateway {
    pub fn new(
        store: Arc<DiskCacheStore>,
        fetcher: RepositoryFetcher,
        synthesizer: Synthesizer,
        deadline: Duration,
    ) -> Self {
        Self {
            store,
            fetcher,
            synthesizer,
            deadline,
        }
    }

    /// Wire up the production stack: GitHub transport, disk store, defaults
    /// from `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self, GatewayError> {
        let api = GitHubApi::new(&config.github).map_err(|e| GatewayError::Setup(e.to_string()))?;
        let store = DiskCacheStore::open(&config.cache.dir)?;
        Ok(Self::new(
            Arc::new(store),
            RepositoryFetcher::new(Arc::new(api), &config.retry),
            Synthesizer::new(&config.synth),
            config.daemon.request_deadline(),
        ))
    }

    pub fn store(&self) -> &Arc<DiskCacheStore> {
        &self.store
    }

    /// Upstream rate-limit budget as last reported by the remote.
    pub fn rate_limit(&self) -> Option<RateLimitSnapshot> {
        self.fetcher.rate_limit()
    }

    /// Cached digest if fresh, otherwise synthesize, persist, and return it.
    pub async fn get_digest(
        &self,
        identity: &RepositoryIdentity,
        token: &AuthToken,
        cancel: &CancellationToken,
    ) -> Result<String, GatewayError> {
        Ok(self.resolve(identity, token, cancel, false).await?.text)
    }

    /// Regenerate the digest, ignoring any cached record.
    pub async fn refresh(
        &self,
        identity: &RepositoryIdentity,
        token: &AuthToken,
        cancel: &CancellationToken,
    ) -> Result<String, GatewayError> {
        Ok(self.resolve(identity, token, cancel, true).await?.text)
    }

    /// Like [`get_digest`](Self::get_digest), also reporting where the text
    /// came from.
    pub async fn resolve(
        &self,
        identity: &RepositoryIdentity,
        token: &AuthToken,
        cancel: &CancellationToken,
        bypass_cache: bool,
    ) -> Result<DigestOutcome, GatewayError> {
        if !bypass_cache && let Some(text) = self.store.get(identity).await {
            info!(owner = identity.owner(), repo = identity.repo(), "serving cached digest");
            return Ok(DigestOutcome {
                text,
                origin: DigestOrigin::Cache,
            });
        }

        let scoped = cancel.child_token();
        let timer = {
            let scoped = scoped.clone();
            let deadline = self.deadline;
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                scoped.cancel();
            })
        };
        let result = self
            .synthesizer
            .synthesize(&self.fetcher, identity, token, &scoped)
            .await;
        timer.abort();
        if scoped.is_cancelled() && !cancel.is_cancelled() {
            warn!(
                owner = identity.owner(),
                repo = identity.repo(),
                deadline_secs = self.deadline.as_secs(),
                "digest request hit its deadline"
            );
        }

        let digest = result?;
        let text = digest.render();
        if digest.partial {
            warn!(
                owner = identity.owner(),
                repo = identity.repo(),
                "partial digest returned without caching"
            );
            return Ok(DigestOutcome {
                text,
                origin: DigestOrigin::Partial,
            });
        }

        self.store.set(identity, &text).await;
        Ok(DigestOutcome {
            text,
            origin: DigestOrigin::Fresh,
        })
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.store.stats().await
    }

    pub async fn cleanup(&self) -> CleanupReport {
        self.store.cleanup().await
    }

    /// Drop the cached record for one repository.
    pub async fn clear_repository(&self, identity: &RepositoryIdentity) -> bool {
        self.store.clear(identity).await
    }
}

/// One-shot library entry point using the default configuration.
///
/// Builds a gateway over `cache/digests` and the public GitHub API, then
/// serves the digest for `owner/repo_name`.
pub async fn synthesize_or_fetch_digest(
    owner: &str,
    repo_name: &str,
    auth_token: AuthToken,
) -> Result<String, GatewayError> {
    let identity = RepositoryIdentity::new(owner, repo_name)?;
    let gateway = CacheGateway::from_config(&AppConfig::default())?;
    gateway
        .get_digest(&identity, &auth_token, &CancellationToken::new())
        .await
}
