//! Eligibility filter applied to the raw tree before ranking.

use std::path::Path;

use crate::remote::{EntryKind, RemoteFileEntry};

/// Root-level directories whose contents never enter a digest.
pub const EXCLUDED_PREFIXES: &[&str] = &[
    "node_modules/",
    "venv/",
    "dist/",
    "build/",
    ".git/",
    "assets/",
    "public/",
];

/// Binary and media extensions (lowercase, without the dot).
pub const EXCLUDED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "ico", "svg", "mp4", "mp3", "wav", "ogg", "pdf", "zip",
    "tar", "gz", "rar", "exe", "dll", "so", "pyc", "class",
];

/// Why an entry was filtered out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotABlob,
    ExcludedDirectory(&'static str),
    BinaryExtension,
    TooLarge(u64),
}

/// Size/path/extension filter.
#[derive(Debug, Clone, Copy)]
pub struct FileFilter {
    max_file_bytes: u64,
}

impl FileFilter {
    /// Files reporting `max_file_bytes` or more are rejected.
    pub fn new(max_file_bytes: u64) -> Self {
        Self { max_file_bytes }
    }

    pub fn check(&self, entry: &RemoteFileEntry) -> Result<(), Rejection> {
        if entry.kind != EntryKind::Blob {
            return Err(Rejection::NotABlob);
        }

        let lower = entry.path.to_ascii_lowercase();
        if let Some(prefix) = EXCLUDED_PREFIXES.iter().find(|p| lower.starts_with(*p)) {
            return Err(Rejection::ExcludedDirectory(*prefix));
        }

        if let Some(ext) = extension_of(&lower)
            && EXCLUDED_EXTENSIONS.iter().any(|e| *e == ext)
        {
            return Err(Rejection::BinaryExtension);
        }

        match entry.size {
            Some(size) if size >= self.max_file_bytes => Err(Rejection::TooLarge(size)),
            _ => Ok(()),
        }
    }

    /// Keep eligible entries, preserving tree order.
    pub fn apply(&self, entries: Vec<RemoteFileEntry>) -> Vec<RemoteFileEntry> {
        let total = entries.len();
        let kept: Vec<_> = entries
            .into_iter()
            .filter(|e| self.check(e).is_ok())
            .collect();
        tracing::debug!(total, eligible = kept.len(), "filtered tree entries");
        kept
    }
}

/// Extension of the final path component, without the dot.
///
/// Dotfiles such as `.gitignore` have no extension.
pub(crate) fn extension_of(path: &str) -> Option<&str> {
    Path::new(path).extension().and_then(|e| e.to_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteFileEntry;

    fn filter() -> FileFilter {
        FileFilter::new(100_000)
    }

    #[test]
    fn test_keeps_ordinary_source() {
        assert_eq!(filter().check(&RemoteFileEntry::blob("src/main.rs", 10, "a")), Ok(()));
    }

    #[test]
    fn test_rejects_trees() {
        assert_eq!(
            filter().check(&RemoteFileEntry::tree("src", "a")),
            Err(Rejection::NotABlob)
        );
    }

    #[test]
    fn test_rejects_excluded_directories_case_insensitively() {
        assert_eq!(
            filter().check(&RemoteFileEntry::blob("node_modules/x/y.js", 10, "a")),
            Err(Rejection::ExcludedDirectory("node_modules/"))
        );
        assert_eq!(
            filter().check(&RemoteFileEntry::blob("Public/index.html", 10, "a")),
            Err(Rejection::ExcludedDirectory("public/"))
        );
    }

    #[test]
    fn test_only_root_level_directories_are_excluded() {
        assert_eq!(
            filter().check(&RemoteFileEntry::blob("packages/web/dist/x.js", 10, "a")),
            Ok(())
        );
    }

    #[test]
    fn test_rejects_binary_extensions() {
        for path in ["logo.PNG", "docs/manual.pdf", "lib/native.so", "a/b/c.class"] {
            assert_eq!(
                filter().check(&RemoteFileEntry::blob(path, 10, "a")),
                Err(Rejection::BinaryExtension),
                "{path}"
            );
        }
    }

    #[test]
    fn test_size_ceiling_is_exclusive() {
        assert_eq!(
            filter().check(&RemoteFileEntry::blob("big.txt", 100_000, "a")),
            Err(Rejection::TooLarge(100_000))
        );
        assert_eq!(filter().check(&RemoteFileEntry::blob("ok.txt", 99_999, "a")), Ok(()));
    }

    #[test]
    fn test_missing_size_is_kept() {
        let mut entry = RemoteFileEntry::blob("unknown.rs", 0, "a");
        entry.size = None;
        assert_eq!(filter().check(&entry), Ok(()));
    }

    #[test]
    fn test_apply_preserves_order() {
        let kept = filter().apply(vec![
            RemoteFileEntry::blob("b.rs", 1, "1"),
            RemoteFileEntry::blob("node_modules/a.js", 1, "2"),
            RemoteFileEntry::blob("a.rs", 1, "3"),
        ]);
        let paths: Vec<_> = kept.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["b.rs", "a.rs"]);
    }

    #[test]
    fn test_dotfile_has_no_extension() {
        assert_eq!(extension_of(".gitignore"), None);
        assert_eq!(extension_of("src/.env.example"), Some("example"));
        assert_eq!(extension_of("Makefile"), None);
    }
}
