//! Digest synthesis: filter, rank, select, fetch, truncate, assemble.
//!
//! ```text
//! metadata ──▶ tree ──▶ FileFilter ──▶ rank ──▶ top K ──▶ blobs (buffered) ──▶ Digest
//!    │           │
//!    │           └─ failure ─▶ metadata-only digest (TreeUnavailable)
//!    └─ size 0 ─▶ metadata-only digest (EmptyRepository)
//! ```
//!
//! Only a metadata failure is fatal. Blob failures become placeholder sections,
//! and cancellation keeps whatever was fetched and marks the digest partial.

pub mod digest;
pub mod filter;
pub mod score;

pub use digest::{Digest, Notice, Section, SectionBody, TRUNCATION_MARKER};
pub use filter::FileFilter;
pub use score::{RankedFile, ScoreRule};

use std::time::SystemTime;

use futures::stream;
use futures::{FutureExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use repodigest_config::SynthConfig;

use crate::fetcher::{FetchError, RepositoryFetcher};
use crate::identity::RepositoryIdentity;
use crate::remote::{RemoteTree, RepositoryMetadata};
use crate::token::AuthToken;

/// Errors that abort a synthesis run.
#[derive(Debug, thiserror::Error)]
pub enum SynthError {
    #[error(transparent)]
    Metadata(#[from] FetchError),

    #[error("cancelled before repository metadata was available")]
    Cancelled,
}

/// Turns a fetched repository into a [`Digest`].
#[derive(Debug, Clone)]
pub struct Synthesizer {
    filter: FileFilter,
    max_files: usize,
    truncate_chars: usize,
    blob_concurrency: usize,
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new(&SynthConfig::default())
    }
}

impl Synthesizer {
    pub fn new(config: &SynthConfig) -> Self {
        Self {
            filter: FileFilter::new(config.max_file_bytes),
            max_files: config.max_files,
            truncate_chars: config.truncate_chars,
            blob_concurrency: config.blob_concurrency.max(1),
        }
    }

    /// Filter and rank a tree, keeping the top `max_files` entries.
    pub fn select(&self, tree: RemoteTree) -> Vec<RankedFile> {
        let mut ranked = score::rank(self.filter.apply(tree.entries));
        ranked.truncate(self.max_files);
        ranked
    }

    /// Run the full pipeline for one repository.
    pub async fn synthesize(
        &self,
        fetcher: &RepositoryFetcher,
        identity: &RepositoryIdentity,
        token: &AuthToken,
        cancel: &CancellationToken,
    ) -> Result<Digest, SynthError> {
        info!(
            owner = identity.owner(),
            repo = identity.repo(),
            api = fetcher.api_name(),
            "synthesizing digest"
        );

        let metadata = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SynthError::Cancelled),
            result = fetcher.get_metadata(identity, token) => result?,
        };

        if metadata.size == 0 {
            info!(owner = identity.owner(), repo = identity.repo(), "repository is empty");
            return Ok(self.metadata_only(identity, metadata, Notice::EmptyRepository, false));
        }

        let tree = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(owner = identity.owner(), repo = identity.repo(), "cancelled during tree fetch");
                return Ok(self.metadata_only(identity, metadata, Notice::TreeUnavailable, true));
            }
            result = fetcher.get_tree(identity, &metadata.default_branch, token) => result,
        };
        let tree = match tree {
            Ok(tree) => tree,
            Err(e) => {
                warn!(owner = identity.owner(), repo = identity.repo(), error = %e, "tree unavailable, emitting metadata-only digest");
                return Ok(self.metadata_only(identity, metadata, Notice::TreeUnavailable, false));
            }
        };

        let selected = self.select(tree);
        debug!(
            owner = identity.owner(),
            repo = identity.repo(),
            selected = selected.len(),
            "working set selected"
        );

        let (sections, partial) = self
            .fetch_sections(fetcher, identity, token, cancel, &selected)
            .await;

        let digest = Digest {
            identity: identity.clone(),
            metadata,
            notice: None,
            sections,
            generated_at: SystemTime::now(),
            partial,
        };
        info!(
            owner = identity.owner(),
            repo = identity.repo(),
            files = digest.sections.len(),
            fetched = digest.fetched_count(),
            partial,
            "digest synthesized"
        );
        Ok(digest)
    }

    /// Fetch the working set with bounded concurrency, in rank order.
    ///
    /// On cancellation outstanding fetches are dropped and every file not yet
    /// reached gets a placeholder.
    async fn fetch_sections(
        &self,
        fetcher: &RepositoryFetcher,
        identity: &RepositoryIdentity,
        token: &AuthToken,
        cancel: &CancellationToken,
        selected: &[RankedFile],
    ) -> (Vec<Section>, bool) {
        let fetches: Vec<_> = selected
            .iter()
            .map(|file| fetcher.get_blob(identity, &file.entry.sha, token).boxed())
            .collect();
        let mut blobs = stream::iter(fetches).buffered(self.blob_concurrency);

        let mut sections = Vec::with_capacity(selected.len());
        let mut partial = false;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    partial = true;
                    break;
                }
                next = blobs.next() => next,
            };
            let Some(result) = next else { break };
            let file = &selected[sections.len()];
            sections.push(self.section(file, result));
        }
        drop(blobs);

        if partial {
            warn!(
                owner = identity.owner(),
                repo = identity.repo(),
                fetched = sections.len(),
                remaining = selected.len() - sections.len(),
                "cancelled during blob fetches, returning partial digest"
            );
            for file in &selected[sections.len()..] {
                sections.push(Section {
                    path: file.entry.path.clone(),
                    score: file.score,
                    body: SectionBody::Unavailable,
                });
            }
        }
        (sections, partial)
    }

    fn section(&self, file: &RankedFile, result: Result<Vec<u8>, FetchError>) -> Section {
        let body = match result {
            Ok(bytes) => {
                let (text, truncated) = digest::truncate_content(&bytes, self.truncate_chars);
                if truncated {
                    debug!(path = %file.entry.path, bytes = bytes.len(), "content truncated");
                }
                SectionBody::Content { text, truncated }
            }
            Err(e) => {
                warn!(path = %file.entry.path, error = %e, "skipping file content");
                SectionBody::Unavailable
            }
        };
        Section {
            path: file.entry.path.clone(),
            score: file.score,
            body,
        }
    }

    fn metadata_only(
        &self,
        identity: &RepositoryIdentity,
        metadata: RepositoryMetadata,
        notice: Notice,
        partial: bool,
    ) -> Digest {
        Digest {
            identity: identity.clone(),
            metadata,
            notice: Some(notice),
            sections: Vec::new(),
            generated_at: SystemTime::now(),
            partial,
        }
    }
}
