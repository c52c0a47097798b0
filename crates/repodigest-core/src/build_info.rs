//! Build-time metadata embedded by the build script.

/// Short git commit hash at build time.
pub const GIT_HASH: &str = env!("REPODIGEST_GIT_HASH");

/// Build timestamp as a Unix epoch string.
pub const BUILD_TIMESTAMP: &str = env!("REPODIGEST_BUILD_TIMESTAMP");

/// Build profile (`debug` or `release`).
pub const BUILD_PROFILE: &str = env!("REPODIGEST_BUILD_PROFILE");

/// Crate version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version string including git hash and profile, e.g. `"0.1.0 (abc1234, debug)"`.
pub fn version_string() -> String {
    format!("{VERSION} ({GIT_HASH}, {BUILD_PROFILE})")
}

/// `User-Agent` sent with every remote API request.
///
/// GitHub rejects requests without one.
pub fn user_agent() -> String {
    format!("repodigest/{VERSION} ({GIT_HASH})")
}
