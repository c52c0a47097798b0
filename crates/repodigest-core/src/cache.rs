//! Disk-backed digest cache.
//!
//! One pretty-printed JSON record per repository under a single directory.
//! Writes go to a uniquely named temp file in the same directory, are fsynced,
//! then renamed over the record, so readers never observe a partial record and
//! concurrent writers for the same key resolve as last-writer-wins.
//!
//! Reads never fail: unreadable, corrupt, mismatched, or expired records are
//! deleted and reported as misses.

use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::identity::RepositoryIdentity;

/// Lifetime of a cache record. Fixed; never read from configuration.
pub const CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Current on-disk record format.
pub const RECORD_VERSION: u32 = 1;

/// Temp files older than this are considered abandoned by a crashed writer.
pub const ORPHAN_TEMP_AGE: Duration = Duration::from_secs(60 * 60);

const RECORD_SUFFIX: &str = ".json";
const TEMP_SUFFIX: &str = ".tmp";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Errors from cache store construction and writes.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize cache record: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
enum RecordError {
    #[error("invalid record JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported record version {0}")]
    Version(u32),
}

/// On-disk representation of one cached digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub version: u32,
    pub owner: String,
    pub repo_name: String,
    pub digest_text: String,
    pub created_at_ms: u64,
    pub expires_at_ms: u64,
    pub content_size_bytes: u64,
}

impl CacheRecord {
    pub fn new(identity: &RepositoryIdentity, digest_text: impl Into<String>, created_at_ms: u64) -> Self {
        let digest_text = digest_text.into();
        Self {
            version: RECORD_VERSION,
            owner: identity.owner().to_string(),
            repo_name: identity.repo().to_string(),
            content_size_bytes: digest_text.len() as u64,
            digest_text,
            created_at_ms,
            expires_at_ms: created_at_ms.saturating_add(CACHE_TTL.as_millis() as u64),
        }
    }

    /// Expired once strictly more than [`CACHE_TTL`] has elapsed since creation.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.created_at_ms) > CACHE_TTL.as_millis() as u64
    }

    fn belongs_to(&self, identity: &RepositoryIdentity) -> bool {
        self.owner == identity.owner() && self.repo_name == identity.repo()
    }
}

/// Result of a [`DiskCacheStore::cleanup`] sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub deleted: u64,
    pub freed_bytes: u64,
    pub errors: u64,
}

/// A record's key and age, as reported by [`DiskCacheStore::stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordAge {
    pub key: String,
    /// `owner/repo` decoded from the key, when the key is well formed.
    pub repository: Option<String>,
    pub age_secs: u64,
}

/// Snapshot of the cache directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub file_count: u64,
    pub total_size: u64,
    pub oldest: Option<RecordAge>,
    pub newest: Option<RecordAge>,
}

/// File-per-key digest store.
#[derive(Debug)]
pub struct DiskCacheStore {
    dir: PathBuf,
}

impl DiskCacheStore {
    /// Open the store, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| CacheError::Io {
            path: dir.clone(),
            source,
        })?;
        debug!(dir = %dir.display(), "cache store opened");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record file for `identity`.
    pub fn record_path(&self, identity: &RepositoryIdentity) -> PathBuf {
        self.dir
            .join(format!("{}{RECORD_SUFFIX}", identity.storage_key()))
    }

    fn temp_path(&self, identity: &RepositoryIdentity) -> PathBuf {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!(
            ".{}.{}.{n}{TEMP_SUFFIX}",
            identity.storage_key(),
            std::process::id()
        ))
    }

    /// Cached digest text, or `None` on miss.
    pub async fn get(&self, identity: &RepositoryIdentity) -> Option<String> {
        let path = self.record_path(identity);
        let (bytes, stamp) = match read_stamped(&path).await {
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        let record = match parse_record(&bytes) {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt cache record, deleting");
                discard(&path, stamp).await;
                return None;
            }
        };
        if !record.belongs_to(identity) {
            warn!(
                path = %path.display(),
                owner = %record.owner,
                repo = %record.repo_name,
                "cache record belongs to another repository, deleting"
            );
            discard(&path, stamp).await;
            return None;
        }
        if record.is_expired(now_ms()) {
            debug!(%identity, "cache record expired, deleting");
            discard(&path, stamp).await;
            return None;
        }

        debug!(%identity, bytes = record.content_size_bytes, "cache hit");
        Some(record.digest_text)
    }

    /// Store a digest, replacing any previous record. Failures are logged only.
    pub async fn set(&self, identity: &RepositoryIdentity, digest_text: &str) {
        let record = CacheRecord::new(identity, digest_text, now_ms());
        match self.write_record(identity, &record).await {
            Ok(()) => debug!(%identity, bytes = record.content_size_bytes, "digest cached"),
            Err(e) => warn!(%identity, error = %e, "failed to write cache record"),
        }
    }

    /// Atomically write `record` as the entry for `identity`.
    pub async fn write_record(
        &self,
        identity: &RepositoryIdentity,
        record: &CacheRecord,
    ) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| CacheError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let body = serde_json::to_vec_pretty(record)?;
        let path = self.record_path(identity);
        let tmp = self.temp_path(identity);

        let written = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(&body).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp, &path).await
        }
        .await;

        if let Err(source) = written {
            remove_quietly(&tmp).await;
            return Err(CacheError::Io { path, source });
        }
        Ok(())
    }

    /// Whether a record file exists, without validating it.
    pub async fn is_cached(&self, identity: &RepositoryIdentity) -> bool {
        tokio::fs::try_exists(self.record_path(identity))
            .await
            .unwrap_or(false)
    }

    /// Remove the record for `identity`. Returns whether one existed.
    pub async fn clear(&self, identity: &RepositoryIdentity) -> bool {
        let path = self.record_path(identity);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(%identity, "cache record cleared");
                true
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to clear cache record");
                false
            }
        }
    }

    /// Delete expired and corrupt records, and temp files older than
    /// [`ORPHAN_TEMP_AGE`].
    pub async fn cleanup(&self) -> CleanupReport {
        let mut report = CleanupReport::default();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return report,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "cache cleanup could not list directory");
                report.errors += 1;
                return report;
            }
        };

        let now = SystemTime::now();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "cache cleanup aborted while listing");
                    report.errors += 1;
                    break;
                }
            };
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_owned) else {
                continue;
            };
            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cache cleanup could not stat entry");
                    report.errors += 1;
                    continue;
                }
            };

            let stale = if is_temp_name(&name) {
                (age_of(&meta, now) > ORPHAN_TEMP_AGE).then(|| FileStamp::of(&meta))
            } else if let Some(key) = name.strip_suffix(RECORD_SUFFIX) {
                match stale_record(&path, key).await {
                    Ok(stale) => stale,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "cache cleanup could not read record");
                        report.errors += 1;
                        continue;
                    }
                }
            } else {
                continue;
            };

            let Some(stamp) = stale else {
                continue;
            };
            match remove_if_unchanged(&path, stamp).await {
                Ok(true) => {
                    debug!(file = %name, "removed stale cache file");
                    report.deleted += 1;
                    report.freed_bytes += stamp.len;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to remove stale cache file");
                    report.errors += 1;
                }
            }
        }

        info!(
            deleted = report.deleted,
            freed_bytes = report.freed_bytes,
            errors = report.errors,
            "cache cleanup finished"
        );
        report
    }

    /// Count and size the record files. Ages come from modification times.
    pub async fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(dir = %self.dir.display(), error = %e, "cache stats could not list directory");
                }
                return stats;
            }
        };

        let now = SystemTime::now();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if is_temp_name(name) {
                continue;
            }
            let Some(key) = name.strip_suffix(RECORD_SUFFIX) else {
                continue;
            };
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }

            stats.file_count += 1;
            stats.total_size += meta.len();
            let age = RecordAge {
                key: key.to_string(),
                repository: RepositoryIdentity::from_storage_key(key).map(|id| id.full_name()),
                age_secs: age_of(&meta, now).as_secs(),
            };
            if stats.oldest.as_ref().is_none_or(|o| age.age_secs > o.age_secs) {
                stats.oldest = Some(age.clone());
            }
            if stats.newest.as_ref().is_none_or(|n| age.age_secs < n.age_secs) {
                stats.newest = Some(age);
            }
        }
        stats
    }
}

/// Run one cleanup sweep after `delay`, off the caller's path.
pub fn spawn_startup_cleanup(store: Arc<DiskCacheStore>, delay: Duration) -> JoinHandle<CleanupReport> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        debug!(dir = %store.dir().display(), "running startup cache cleanup");
        store.cleanup().await
    })
}

fn parse_record(bytes: &[u8]) -> Result<CacheRecord, RecordError> {
    let record: CacheRecord = serde_json::from_slice(bytes)?;
    if record.version != RECORD_VERSION {
        return Err(RecordError::Version(record.version));
    }
    Ok(record)
}

/// The version of a file a reader saw. A rename over the path changes the
/// inode, so a replaced record never compares equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    ino: u64,
    len: u64,
    modified: Option<SystemTime>,
}

impl FileStamp {
    fn of(meta: &std::fs::Metadata) -> Self {
        Self {
            ino: meta.ino(),
            len: meta.len(),
            modified: meta.modified().ok(),
        }
    }
}

/// Read a file together with the stamp of the version that was read.
async fn read_stamped(path: &Path) -> io::Result<(Vec<u8>, FileStamp)> {
    let mut file = tokio::fs::File::open(path).await?;
    let stamp = FileStamp::of(&file.metadata().await?);
    let mut bytes = Vec::with_capacity(stamp.len as usize);
    file.read_to_end(&mut bytes).await?;
    Ok((bytes, stamp))
}

/// Remove `path` only if it is still the version described by `seen`.
///
/// Returns `false` when the file is gone or was replaced after it was read.
async fn remove_if_unchanged(path: &Path, seen: FileStamp) -> io::Result<bool> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if FileStamp::of(&meta) == seen => {}
        Ok(_) => {
            debug!(path = %path.display(), "cache file replaced since it was read, keeping it");
            return Ok(false);
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    }
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Stamp of the record at `path` if it is expired, corrupt, or filed under a
/// key that does not match its contents.
async fn stale_record(path: &Path, key: &str) -> io::Result<Option<FileStamp>> {
    let (bytes, stamp) = match read_stamped(path).await {
        Ok(read) => read,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let Ok(record) = parse_record(&bytes) else {
        return Ok(Some(stamp));
    };
    let key_matches = RepositoryIdentity::from_storage_key(key).is_some_and(|id| record.belongs_to(&id));
    Ok((!key_matches || record.is_expired(now_ms())).then_some(stamp))
}

fn is_temp_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(TEMP_SUFFIX)
}

fn age_of(meta: &std::fs::Metadata, now: SystemTime) -> Duration {
    meta.modified()
        .ok()
        .and_then(|mtime| now.duration_since(mtime).ok())
        .unwrap_or_default()
}

async fn discard(path: &Path, seen: FileStamp) {
    if let Err(e) = remove_if_unchanged(path, seen).await {
        warn!(path = %path.display(), error = %e, "failed to remove cache file");
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "failed to remove cache file");
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn store() -> (TempDir, DiskCacheStore) {
        let dir = TempDir::new().unwrap();
        let store = DiskCacheStore::open(dir.path().join("digests")).unwrap();
        (dir, store)
    }

    fn widget() -> RepositoryIdentity {
        RepositoryIdentity::new("acme", "widget").unwrap()
    }

    fn ttl_ms() -> u64 {
        CACHE_TTL.as_millis() as u64
    }

    #[test]
    fn test_ttl_is_seven_days() {
        assert_eq!(CACHE_TTL, Duration::from_secs(604_800));
    }

    #[test]
    fn test_record_expiry_boundary() {
        let record = CacheRecord::new(&widget(), "x", 1_000);
        assert_eq!(record.expires_at_ms, 1_000 + ttl_ms());
        assert!(!record.is_expired(1_000 + ttl_ms()));
        assert!(record.is_expired(1_000 + ttl_ms() + 1));
    }

    #[test]
    fn test_open_creates_directory() {
        let (dir, store) = store();
        assert!(store.dir().is_dir());
        assert_eq!(store.dir(), dir.path().join("digests"));
    }

    #[tokio::test]
    async fn test_set_then_get_round_trips() {
        let (_dir, store) = store();
        let text = "# Repository Analysis: widget\n\nünïcode ✓";
        store.set(&widget(), text).await;
        assert_eq!(store.get(&widget()).await.as_deref(), Some(text));
        assert!(store.is_cached(&widget()).await);
    }

    #[tokio::test]
    async fn test_record_body_format() {
        let (_dir, store) = store();
        store.set(&widget(), "digest").await;

        let raw = std::fs::read_to_string(store.record_path(&widget())).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["owner"], "acme");
        assert_eq!(value["repo_name"], "widget");
        assert_eq!(value["digest_text"], "digest");
        assert_eq!(value["content_size_bytes"], 6);
        assert!(raw.contains("\n  \"owner\""), "record should be pretty-printed");
    }

    #[tokio::test]
    async fn test_set_replaces_previous_record() {
        let (_dir, store) = store();
        store.set(&widget(), "first").await;
        store.set(&widget(), "second").await;
        assert_eq!(store.get(&widget()).await.as_deref(), Some("second"));
        assert_eq!(store.stats().await.file_count, 1);
    }

    #[tokio::test]
    async fn test_set_recreates_missing_directory() {
        let (_dir, store) = store();
        std::fs::remove_dir_all(store.dir()).unwrap();
        store.set(&widget(), "again").await;
        assert_eq!(store.get(&widget()).await.as_deref(), Some("again"));
    }

    #[tokio::test]
    async fn test_expired_record_is_absent_deleted_and_uncounted() {
        let (_dir, store) = store();
        let stale = CacheRecord::new(&widget(), "old", now_ms() - ttl_ms() - 60_000);
        store.write_record(&widget(), &stale).await.unwrap();
        assert_eq!(store.stats().await.file_count, 1);

        assert_eq!(store.get(&widget()).await, None);
        assert!(!store.record_path(&widget()).exists());
        assert_eq!(store.stats().await.file_count, 0);
    }

    #[tokio::test]
    async fn test_corrupt_record_is_a_miss_and_deleted() {
        let (_dir, store) = store();
        std::fs::write(store.record_path(&widget()), b"{not json").unwrap();
        assert_eq!(store.get(&widget()).await, None);
        assert!(!store.record_path(&widget()).exists());
    }

    #[tokio::test]
    async fn test_unknown_version_is_corrupt() {
        let (_dir, store) = store();
        let mut record = CacheRecord::new(&widget(), "v2", now_ms());
        record.version = 2;
        store.write_record(&widget(), &record).await.unwrap();
        assert_eq!(store.get(&widget()).await, None);
    }

    #[tokio::test]
    async fn test_record_for_other_identity_is_rejected() {
        let (_dir, store) = store();
        let other = RepositoryIdentity::new("acme", "gadget").unwrap();
        let record = CacheRecord::new(&other, "gadget digest", now_ms());
        store.write_record(&widget(), &record).await.unwrap();
        assert_eq!(store.get(&widget()).await, None);
    }

    #[tokio::test]
    async fn test_clear() {
        let (_dir, store) = store();
        store.set(&widget(), "x").await;
        assert!(store.clear(&widget()).await);
        assert!(!store.clear(&widget()).await);
        assert!(!store.is_cached(&widget()).await);
    }

    #[tokio::test]
    async fn test_cleanup_removes_expired_corrupt_and_orphans() {
        let (_dir, store) = store();
        let fresh = RepositoryIdentity::new("acme", "fresh").unwrap();
        let expired = RepositoryIdentity::new("acme", "expired").unwrap();

        store.set(&fresh, "fresh").await;
        let old = CacheRecord::new(&expired, "expired", now_ms() - ttl_ms() - 1);
        store.write_record(&expired, &old).await.unwrap();
        std::fs::write(store.dir().join("junk--x.json"), b"garbage").unwrap();

        let orphan = store.dir().join(".acme--lost.1.1.tmp");
        std::fs::write(&orphan, b"partial").unwrap();
        std::fs::File::options()
            .write(true)
            .open(&orphan)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(2 * 60 * 60))
            .unwrap();
        let recent_tmp = store.dir().join(".acme--busy.1.2.tmp");
        std::fs::write(&recent_tmp, b"in flight").unwrap();

        let report = store.cleanup().await;
        assert_eq!(report.deleted, 3);
        assert_eq!(report.errors, 0);
        assert!(report.freed_bytes > 0);

        assert!(store.is_cached(&fresh).await);
        assert!(!store.is_cached(&expired).await);
        assert!(!orphan.exists());
        assert!(recent_tmp.exists());
    }

    #[tokio::test]
    async fn test_cleanup_on_missing_directory_is_empty() {
        let (_dir, store) = store();
        std::fs::remove_dir_all(store.dir()).unwrap();
        assert_eq!(store.cleanup().await, CleanupReport::default());
    }

    #[tokio::test]
    async fn test_stats_reports_oldest_and_newest() {
        let (_dir, store) = store();
        let a = RepositoryIdentity::new("acme", "a").unwrap();
        let b = RepositoryIdentity::new("acme", "b").unwrap();
        store.set(&a, "aaaa").await;
        store.set(&b, "bb").await;
        std::fs::File::options()
            .write(true)
            .open(store.record_path(&a))
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(3_600))
            .unwrap();

        let stats = store.stats().await;
        assert_eq!(stats.file_count, 2);
        assert!(stats.total_size > 0);
        assert_eq!(stats.oldest.as_ref().map(|o| o.key.as_str()), Some("acme--a"));
        assert_eq!(stats.newest.as_ref().map(|n| n.key.as_str()), Some("acme--b"));
        assert_eq!(
            stats.oldest.as_ref().and_then(|o| o.repository.as_deref()),
            Some("acme/a")
        );
        assert!(stats.oldest.unwrap().age_secs >= 3_599);
    }

    #[tokio::test]
    async fn test_stats_on_empty_store() {
        let (_dir, store) = store();
        assert_eq!(store.stats().await, CacheStats::default());
    }

    #[tokio::test]
    async fn test_concurrent_sets_leave_one_whole_record() {
        let (_dir, store) = store();
        let store = Arc::new(store);
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.set(&widget(), &format!("writer {i} {}", "x".repeat(4096))).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let text = store.get(&widget()).await.unwrap();
        assert!(text.starts_with("writer "));
        assert_eq!(store.stats().await.file_count, 1);
        let leftovers = std::fs::read_dir(store.dir())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(TEMP_SUFFIX))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_startup_cleanup_waits_for_delay() {
        let (_dir, store) = store();
        let store = Arc::new(store);
        let expired = CacheRecord::new(&widget(), "old", now_ms() - ttl_ms() - 1);
        store.write_record(&widget(), &expired).await.unwrap();

        let handle = spawn_startup_cleanup(store.clone(), Duration::from_millis(200));
        tokio::task::yield_now().await;
        assert!(store.record_path(&widget()).exists());

        let report = handle.await.unwrap();
        assert_eq!(report.deleted, 1);
    }

    #[tokio::test]
    async fn test_stale_removal_spares_record_replaced_after_read() {
        let (_dir, store) = store();
        let path = store.record_path(&widget());
        let expired = CacheRecord::new(&widget(), "old", now_ms() - ttl_ms() - 1);
        store.write_record(&widget(), &expired).await.unwrap();

        let (_, seen) = read_stamped(&path).await.unwrap();
        store.set(&widget(), "fresh digest from a concurrent writer").await;

        assert!(!remove_if_unchanged(&path, seen).await.unwrap());
        assert_eq!(
            store.get(&widget()).await.as_deref(),
            Some("fresh digest from a concurrent writer")
        );
    }

    #[tokio::test]
    async fn test_stale_removal_deletes_unchanged_record() {
        let (_dir, store) = store();
        let path = store.record_path(&widget());
        store.set(&widget(), "digest").await;

        let (_, seen) = read_stamped(&path).await.unwrap();
        assert!(remove_if_unchanged(&path, seen).await.unwrap());
        assert!(!path.exists());
        assert!(!remove_if_unchanged(&path, seen).await.unwrap());
    }
}
