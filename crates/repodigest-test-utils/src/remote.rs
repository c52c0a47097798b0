//! Scripted [`RemoteApi`] double.
//!
//! Serves a fixed repository from memory, counts every call, and can inject
//! failures or delays per stage. Failures are consumed in order; once a
//! queue is empty the call succeeds.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use repodigest_core::BoxFuture;
use repodigest_core::identity::RepositoryIdentity;
use repodigest_core::remote::{
    ApiError, RateLimitSnapshot, RemoteApi, RemoteFileEntry, RemoteTree, RepositoryMetadata,
};
use repodigest_core::token::AuthToken;

/// Blob SHA assigned by [`MockRemoteApi::with_file`].
pub fn sha_for(path: &str) -> String {
    format!("sha-{path}")
}

/// Metadata for `owner/name` with the given reported size.
pub fn metadata(owner: &str, name: &str, size: u64) -> RepositoryMetadata {
    RepositoryMetadata {
        name: name.to_string(),
        full_name: format!("{owner}/{name}"),
        default_branch: "main".to_string(),
        size,
        description: Some(format!("The {name} project")),
        license: Some("MIT License".to_string()),
        language: Some("TypeScript".to_string()),
    }
}

#[derive(Default)]
struct Script {
    metadata_failures: VecDeque<ApiError>,
    tree_failures: VecDeque<ApiError>,
    blob_failures: HashMap<String, VecDeque<ApiError>>,
    blob_delays: HashMap<String, Duration>,
    last_token: Option<String>,
}

/// In-memory remote repository.
pub struct MockRemoteApi {
    metadata: Option<RepositoryMetadata>,
    entries: Vec<RemoteFileEntry>,
    blobs: HashMap<String, Vec<u8>>,
    rate_limit: Option<RateLimitSnapshot>,
    script: Mutex<Script>,
    metadata_calls: AtomicU32,
    tree_calls: AtomicU32,
    blob_calls: AtomicU32,
}

impl MockRemoteApi {
    /// A repository with the given metadata and an empty tree.
    pub fn new(metadata: RepositoryMetadata) -> Self {
        Self {
            metadata: Some(metadata),
            entries: Vec::new(),
            blobs: HashMap::new(),
            rate_limit: None,
            script: Mutex::new(Script::default()),
            metadata_calls: AtomicU32::new(0),
            tree_calls: AtomicU32::new(0),
            blob_calls: AtomicU32::new(0),
        }
    }

    /// A repository that does not exist: metadata always returns 404.
    pub fn missing() -> Self {
        let mut api = Self::new(metadata("ghost", "ghost", 0));
        api.metadata = None;
        api
    }

    /// Add a blob whose reported size equals its content length.
    pub fn with_file(mut self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        let content = content.into();
        let sha = sha_for(path);
        self.entries
            .push(RemoteFileEntry::blob(path, content.len() as u64, sha.clone()));
        self.blobs.insert(sha, content);
        self
    }

    /// Add a blob with `size` bytes of `fill`.
    pub fn with_sized_file(self, path: &str, size: usize, fill: u8) -> Self {
        self.with_file(path, vec![fill; size])
    }

    /// Add a raw tree entry (directories, submodules, size-less blobs).
    pub fn with_entry(mut self, entry: RemoteFileEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn fail_metadata(self, times: usize, error: ApiError) -> Self {
        self.lock()
            .metadata_failures
            .extend(std::iter::repeat_n(error, times));
        self
    }

    pub fn fail_tree(self, times: usize, error: ApiError) -> Self {
        self.lock()
            .tree_failures
            .extend(std::iter::repeat_n(error, times));
        self
    }

    /// Fail the blob at `path` `times` times before serving it.
    pub fn fail_blob(self, path: &str, times: usize, error: ApiError) -> Self {
        self.lock()
            .blob_failures
            .entry(sha_for(path))
            .or_default()
            .extend(std::iter::repeat_n(error, times));
        self
    }

    /// Sleep before serving the blob at `path`.
    pub fn delay_blob(self, path: &str, delay: Duration) -> Self {
        self.lock().blob_delays.insert(sha_for(path), delay);
        self
    }

    /// Report a fixed upstream rate-limit budget.
    pub fn with_rate_limit(mut self, remaining: u64, reset_at: u64) -> Self {
        self.rate_limit = Some(RateLimitSnapshot {
            remaining: Some(remaining),
            reset_at: Some(reset_at),
        });
        self
    }

    pub fn metadata_calls(&self) -> u32 {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    pub fn tree_calls(&self) -> u32 {
        self.tree_calls.load(Ordering::SeqCst)
    }

    pub fn blob_calls(&self) -> u32 {
        self.blob_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> u32 {
        self.metadata_calls() + self.tree_calls() + self.blob_calls()
    }

    /// Token seen on the most recent call, if any.
    pub fn last_token(&self) -> Option<String> {
        self.lock().last_token.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record_token(&self, token: &AuthToken) {
        self.lock().last_token = Some(token.expose().to_string());
    }
}

impl RemoteApi for MockRemoteApi {
    fn name(&self) -> &str {
        "mock"
    }

    fn metadata<'a>(
        &'a self,
        _repo: &'a RepositoryIdentity,
        token: &'a AuthToken,
    ) -> BoxFuture<'a, Result<RepositoryMetadata, ApiError>> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        self.record_token(token);
        let result = match self.lock().metadata_failures.pop_front() {
            Some(error) => Err(error),
            None => self.metadata.clone().ok_or(ApiError::NotFound),
        };
        Box::pin(async move { result })
    }

    fn tree<'a>(
        &'a self,
        _repo: &'a RepositoryIdentity,
        _branch: &'a str,
        token: &'a AuthToken,
    ) -> BoxFuture<'a, Result<RemoteTree, ApiError>> {
        self.tree_calls.fetch_add(1, Ordering::SeqCst);
        self.record_token(token);
        let result = match self.lock().tree_failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(RemoteTree {
                entries: self.entries.clone(),
                truncated: false,
            }),
        };
        Box::pin(async move { result })
    }

    fn blob<'a>(
        &'a self,
        _repo: &'a RepositoryIdentity,
        sha: &'a str,
        token: &'a AuthToken,
    ) -> BoxFuture<'a, Result<Vec<u8>, ApiError>> {
        self.blob_calls.fetch_add(1, Ordering::SeqCst);
        self.record_token(token);
        let (failure, delay) = {
            let mut script = self.lock();
            let failure = script
                .blob_failures
                .get_mut(sha)
                .and_then(VecDeque::pop_front);
            (failure, script.blob_delays.get(sha).copied())
        };
        let result = match failure {
            Some(error) => Err(error),
            None => self.blobs.get(sha).cloned().ok_or(ApiError::NotFound),
        };
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            result
        })
    }

    fn rate_limit(&self) -> Option<RateLimitSnapshot> {
        self.rate_limit
    }
}
