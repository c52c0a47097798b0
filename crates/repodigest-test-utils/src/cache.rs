//! Temporary cache store fixture.

use std::sync::Arc;

use repodigest_core::DiskCacheStore;
use tempfile::TempDir;

/// A [`DiskCacheStore`] rooted in a temp directory that is deleted on drop.
pub struct TempCache {
    pub store: Arc<DiskCacheStore>,
    pub dir: TempDir,
}

impl TempCache {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let store = DiskCacheStore::open(dir.path().join("digests"))
            .expect("failed to open cache store");
        Self {
            store: Arc::new(store),
            dir,
        }
    }
}

impl Default for TempCache {
    fn default() -> Self {
        Self::new()
    }
}
