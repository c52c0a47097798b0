//! Repository identity: the `(owner, repo)` key every pipeline entity hangs off.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const MAX_OWNER_LEN: usize = 39;
const MAX_REPO_LEN: usize = 100;

/// Separator between owner and escaped repo name in storage keys.
///
/// Valid owners never contain `--` and never end in `-`, so the first
/// occurrence always marks the boundary.
const KEY_SEPARATOR: &str = "--";

/// Errors from constructing a [`RepositoryIdentity`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid owner {0:?}: expected 1-39 ASCII letters, digits, or single interior hyphens")]
    InvalidOwner(String),

    #[error("invalid repository name {0:?}: expected 1-100 ASCII letters, digits, '-', '_', or '.'")]
    InvalidRepo(String),

    #[error("expected \"owner/repo\", got {0:?}")]
    Malformed(String),
}

/// Case-sensitive, immutable identity of a remote repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryIdentity {
    owner: String,
    repo: String,
}

impl RepositoryIdentity {
    /// Validate and construct an identity.
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Result<Self, IdentityError> {
        let owner = owner.into();
        let repo = repo.into();
        if !is_valid_owner(&owner) {
            return Err(IdentityError::InvalidOwner(owner));
        }
        if !is_valid_repo(&repo) {
            return Err(IdentityError::InvalidRepo(repo));
        }
        Ok(Self { owner, repo })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// `owner/repo`, as the hosting API spells it.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Filesystem-safe storage key, injective over valid identities.
    ///
    /// The owner is kept verbatim; every repo character outside
    /// `[A-Za-z0-9-]` is escaped as `_xx` (lowercase hex).
    pub fn storage_key(&self) -> String {
        let mut key = String::with_capacity(self.owner.len() + self.repo.len() + 8);
        key.push_str(&self.owner);
        key.push_str(KEY_SEPARATOR);
        for c in self.repo.chars() {
            if c.is_ascii_alphanumeric() || c == '-' {
                key.push(c);
            } else {
                // Only ASCII survives validation, so one byte per char.
                key.push_str(&format!("_{:02x}", c as u32));
            }
        }
        key
    }

    /// Inverse of [`storage_key`](Self::storage_key).
    pub fn from_storage_key(key: &str) -> Option<Self> {
        let (owner, escaped) = key.split_once(KEY_SEPARATOR)?;
        let mut repo = String::with_capacity(escaped.len());
        let mut chars = escaped.chars();
        while let Some(c) = chars.next() {
            if c == '_' {
                let hex: String = chars.by_ref().take(2).collect();
                let byte = u8::from_str_radix(&hex, 16).ok()?;
                repo.push(byte as char);
            } else {
                repo.push(c);
            }
        }
        Self::new(owner, repo).ok()
    }
}

impl fmt::Display for RepositoryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

impl FromStr for RepositoryIdentity {
    type Err = IdentityError;

    /// Parse `owner/repo`. A trailing `.git` is not stripped; it is part of
    /// the name as far as the API is concerned.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (owner, repo) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| IdentityError::Malformed(s.to_string()))?;
        if repo.contains('/') {
            return Err(IdentityError::Malformed(s.to_string()));
        }
        Self::new(owner, repo)
    }
}

fn is_valid_owner(owner: &str) -> bool {
    !owner.is_empty()
        && owner.len() <= MAX_OWNER_LEN
        && owner.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        && !owner.starts_with('-')
        && !owner.ends_with('-')
        && !owner.contains("--")
}

fn is_valid_repo(repo: &str) -> bool {
    !repo.is_empty()
        && repo.len() <= MAX_REPO_LEN
        && repo != "."
        && repo != ".."
        && repo
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_owner_repo() {
        let id: RepositoryIdentity = "acme/widget".parse().unwrap();
        assert_eq!(id.owner(), "acme");
        assert_eq!(id.repo(), "widget");
        assert_eq!(id.to_string(), "acme/widget");
        assert_eq!(id.full_name(), "acme/widget");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(
            "acme".parse::<RepositoryIdentity>(),
            Err(IdentityError::Malformed(_))
        ));
        assert!(matches!(
            "acme/widget/extra".parse::<RepositoryIdentity>(),
            Err(IdentityError::Malformed(_))
        ));
    }

    #[test]
    fn test_owner_rules() {
        assert!(RepositoryIdentity::new("a-b", "x").is_ok());
        assert!(RepositoryIdentity::new("-ab", "x").is_err());
        assert!(RepositoryIdentity::new("ab-", "x").is_err());
        assert!(RepositoryIdentity::new("a--b", "x").is_err());
        assert!(RepositoryIdentity::new("a_b", "x").is_err());
        assert!(RepositoryIdentity::new("", "x").is_err());
        assert!(RepositoryIdentity::new("a".repeat(40), "x").is_err());
    }

    #[test]
    fn test_repo_rules() {
        assert!(RepositoryIdentity::new("acme", "my_repo.rs-2").is_ok());
        assert!(RepositoryIdentity::new("acme", ".").is_err());
        assert!(RepositoryIdentity::new("acme", "..").is_err());
        assert!(RepositoryIdentity::new("acme", "has space").is_err());
        assert!(RepositoryIdentity::new("acme", "a".repeat(101)).is_err());
    }

    #[test]
    fn test_identity_is_case_sensitive() {
        let lower = RepositoryIdentity::new("acme", "widget").unwrap();
        let upper = RepositoryIdentity::new("Acme", "Widget").unwrap();
        assert_ne!(lower, upper);
        assert_ne!(lower.storage_key(), upper.storage_key());
    }

    #[test]
    fn test_storage_key_escapes_repo() {
        let id = RepositoryIdentity::new("acme", "my_repo.js").unwrap();
        assert_eq!(id.storage_key(), "acme--my_5frepo_2ejs");
    }

    #[test]
    fn test_storage_key_has_no_collisions_on_hyphens() {
        // The naive "owner-repo" scheme maps both of these to "a-b-c".
        let left = RepositoryIdentity::new("a-b", "c").unwrap();
        let right = RepositoryIdentity::new("a", "b-c").unwrap();
        assert_ne!(left.storage_key(), right.storage_key());

        // And separator-looking repo names stay distinct too.
        let tricky = RepositoryIdentity::new("a", "-b").unwrap();
        let plain = RepositoryIdentity::new("a", "b").unwrap();
        assert_ne!(tricky.storage_key(), plain.storage_key());
    }

    #[test]
    fn test_storage_key_round_trips() {
        for (owner, repo) in [
            ("acme", "widget"),
            ("a-b", "c"),
            ("a", "-b"),
            ("facebook", "react.dev"),
            ("x1", "__init__"),
        ] {
            let id = RepositoryIdentity::new(owner, repo).unwrap();
            let back = RepositoryIdentity::from_storage_key(&id.storage_key()).unwrap();
            assert_eq!(back, id);
        }
    }

    #[test]
    fn test_from_storage_key_rejects_garbage() {
        assert!(RepositoryIdentity::from_storage_key("nosep").is_none());
        assert!(RepositoryIdentity::from_storage_key("a--bad_zz").is_none());
    }
}
