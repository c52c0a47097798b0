//! GitHub REST API transport.
//!
//! Implements [`RemoteApi`] over `reqwest`:
//!
//! - `GET /repos/{owner}/{repo}`: metadata
//! - `GET /repos/{owner}/{repo}/git/trees/{branch}?recursive=1`: tree
//! - `GET /repos/{owner}/{repo}/git/blobs/{sha}`: raw blob bytes

use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use repodigest_config::GitHubConfig;

use crate::BoxFuture;
use crate::build_info;
use crate::identity::RepositoryIdentity;
use crate::token::AuthToken;

use super::rate_limit::{self, RateLimitSnapshot, RateLimitState};
use super::{ApiError, EntryKind, RemoteApi, RemoteFileEntry, RemoteTree, RepositoryMetadata};

const ACCEPT_JSON: &str = "application/vnd.github+json";
const ACCEPT_RAW: &str = "application/vnd.github.raw+json";
const API_VERSION: &str = "2022-11-28";

/// Longest upstream error message carried into an [`ApiError`].
const MAX_ERROR_MESSAGE: usize = 200;

/// GitHub / GitHub Enterprise transport.
pub struct GitHubApi {
    client: Client,
    api_url: Url,
    rate_limit: RateLimitState,
}

impl GitHubApi {
    /// Build a transport from config. The per-call timeout is enforced by the
    /// HTTP client, independently of any retry loop above it.
    pub fn new(config: &GitHubConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(build_info::user_agent())
            .build()
            .map_err(|e| ApiError::Network(format!("failed to build HTTP client: {e}")))?;
        let api_url = Url::parse(&config.api_url)
            .map_err(|e| ApiError::Parse(format!("invalid API URL {}: {e}", config.api_url)))?;
        if api_url.cannot_be_a_base() {
            return Err(ApiError::Parse(format!(
                "API URL {} cannot carry a path",
                config.api_url
            )));
        }
        Ok(Self {
            client,
            api_url,
            rate_limit: RateLimitState::new(),
        })
    }

    /// `{api}/repos/{owner}/{repo}/{tail..}`, each segment percent-encoded.
    fn repo_url(&self, repo: &RepositoryIdentity, tail: &[&str]) -> Url {
        let mut url = self.api_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["repos", repo.owner(), repo.repo()])
                .extend(tail);
        }
        url
    }

    fn tree_url(&self, repo: &RepositoryIdentity, branch: &str) -> Url {
        let mut url = self.repo_url(repo, &["git", "trees", branch]);
        url.query_pairs_mut().append_pair("recursive", "1");
        url
    }

    fn get(&self, url: Url, accept: &str, token: &AuthToken) -> RequestBuilder {
        let mut req = self
            .client
            .get(url)
            .header("Accept", accept)
            .header("X-GitHub-Api-Version", API_VERSION);
        if !token.is_anonymous() {
            req = req.bearer_auth(token.expose());
        }
        req
    }

    /// Send a request and turn non-success statuses into typed errors.
    async fn send(&self, req: RequestBuilder) -> Result<Response, ApiError> {
        let resp = req.send().await.map_err(map_transport_error)?;
        self.rate_limit.update_from_headers(resp.headers());

        let status = resp.status().as_u16();
        if resp.status().is_success() {
            return Ok(resp);
        }
        let headers = resp.headers().clone();
        let body = resp.text().await.unwrap_or_default();
        Err(classify_status(status, &headers, &body))
    }
}

impl RemoteApi for GitHubApi {
    fn name(&self) -> &str {
        "GitHub"
    }

    fn metadata<'a>(
        &'a self,
        repo: &'a RepositoryIdentity,
        token: &'a AuthToken,
    ) -> BoxFuture<'a, Result<RepositoryMetadata, ApiError>> {
        Box::pin(async move {
            let url = self.repo_url(repo, &[]);
            debug!(%repo, "GitHub metadata request");

            let resp = self.send(self.get(url, ACCEPT_JSON, token)).await?;
            let body: GitHubRepository = resp
                .json()
                .await
                .map_err(|e| ApiError::Parse(e.to_string()))?;
            Ok(body.into())
        })
    }

    fn tree<'a>(
        &'a self,
        repo: &'a RepositoryIdentity,
        branch: &'a str,
        token: &'a AuthToken,
    ) -> BoxFuture<'a, Result<RemoteTree, ApiError>> {
        Box::pin(async move {
            let url = self.tree_url(repo, branch);
            debug!(%repo, branch, "GitHub tree request");

            let resp = self.send(self.get(url, ACCEPT_JSON, token)).await?;
            let body: GitHubTree = resp
                .json()
                .await
                .map_err(|e| ApiError::Parse(e.to_string()))?;
            if body.truncated {
                warn!(%repo, entries = body.tree.len(), "tree listing truncated by the API");
            }
            Ok(body.into())
        })
    }

    fn blob<'a>(
        &'a self,
        repo: &'a RepositoryIdentity,
        sha: &'a str,
        token: &'a AuthToken,
    ) -> BoxFuture<'a, Result<Vec<u8>, ApiError>> {
        Box::pin(async move {
            let url = self.repo_url(repo, &["git", "blobs", sha]);
            debug!(%repo, sha, "GitHub blob request");

            let resp = self.send(self.get(url, ACCEPT_RAW, token)).await?;
            let bytes = resp.bytes().await.map_err(map_transport_error)?;
            Ok(bytes.to_vec())
        })
    }

    fn rate_limit(&self) -> Option<RateLimitSnapshot> {
        Some(self.rate_limit.snapshot())
    }
}

fn map_transport_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Network(e.to_string())
    }
}

/// Map a non-success response to an [`ApiError`].
///
/// GitHub signals an exhausted primary rate limit with `403` and
/// `X-RateLimit-Remaining: 0`, and secondary limits with `403`/`429` plus
/// `Retry-After`; both are transient. Any other `403` is a permission problem.
pub fn classify_status(status: u16, headers: &HeaderMap, body: &str) -> ApiError {
    let message = error_message(body);
    match status {
        404 => ApiError::NotFound,
        401 => ApiError::Unauthorized(message),
        429 => ApiError::RateLimited {
            retry_after_secs: rate_limit::retry_after_header(headers).unwrap_or(60),
        },
        403 if rate_limit::headers_report_exhausted(headers)
            || rate_limit::retry_after_header(headers).is_some() =>
        {
            ApiError::RateLimited {
                retry_after_secs: rate_limit::retry_after_header(headers).unwrap_or(60),
            }
        }
        403 => ApiError::Forbidden(message),
        _ => ApiError::Status { status, message },
    }
}

/// Pull `message` out of a GitHub error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    let message = serde_json::from_str::<GitHubErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| body.trim().to_string());
    message.chars().take(MAX_ERROR_MESSAGE).collect()
}

// ── GitHub API types (private) ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GitHubRepository {
    name: String,
    full_name: String,
    default_branch: String,
    #[serde(default)]
    size: u64,
    description: Option<String>,
    license: Option<GitHubLicense>,
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubLicense {
    name: Option<String>,
}

impl From<GitHubRepository> for RepositoryMetadata {
    fn from(r: GitHubRepository) -> Self {
        Self {
            name: r.name,
            full_name: r.full_name,
            default_branch: r.default_branch,
            size: r.size,
            description: r.description.filter(|d| !d.trim().is_empty()),
            license: r.license.and_then(|l| l.name),
            language: r.language,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitHubTree {
    tree: Vec<GitHubTreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct GitHubTreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: EntryKind,
    sha: String,
    size: Option<u64>,
}

impl From<GitHubTree> for RemoteTree {
    fn from(t: GitHubTree) -> Self {
        Self {
            entries: t
                .tree
                .into_iter()
                .map(|e| RemoteFileEntry {
                    path: e.path,
                    size: e.size,
                    sha: e.sha,
                    kind: e.kind,
                })
                .collect(),
            truncated: t.truncated,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitHubErrorBody {
    message: String,
}
