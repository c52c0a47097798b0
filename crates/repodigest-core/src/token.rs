//! Caller-supplied API token with automatic zeroization.
//!
//! The token is passed through the pipeline on every remote call but is never
//! logged: `Debug` output is redacted and the backing buffer is zeroized on drop.

use std::fmt;

use zeroize::Zeroize;

/// Bearer-style token for the remote hosting API.
///
/// An empty token is allowed and means "anonymous" (public repositories only,
/// with a much lower rate limit).
#[derive(Clone, Default)]
pub struct AuthToken {
    inner: String,
}

impl AuthToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            inner: value.into(),
        }
    }

    /// Read the token from an environment variable, falling back to anonymous.
    pub fn from_env(var: &str) -> Self {
        match std::env::var(var) {
            Ok(value) => Self::new(value.trim()),
            Err(_) => {
                tracing::debug!(var, "token variable not set, using anonymous access");
                Self::default()
            }
        }
    }

    /// Parse an `Authorization` header value (`Bearer <t>` or `token <t>`).
    pub fn from_authorization_header(value: &str) -> Option<Self> {
        let value = value.trim();
        let (scheme, rest) = value.split_once(' ')?;
        if scheme.eq_ignore_ascii_case("bearer") || scheme.eq_ignore_ascii_case("token") {
            let token = rest.trim();
            if !token.is_empty() {
                return Some(Self::new(token));
            }
        }
        None
    }

    /// Expose the raw token. Only the HTTP transport should call this.
    pub fn expose(&self) -> &str {
        &self.inner
    }

    /// Whether this is the anonymous token.
    pub fn is_anonymous(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("inner", &"[REDACTED]")
            .field("anonymous", &self.is_anonymous())
            .finish()
    }
}

impl Drop for AuthToken {
    fn drop(&mut self) {
        self.inner.zeroize();
    }
}
