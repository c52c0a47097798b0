//! The digest artifact and its text rendering.

use std::fmt::Write as _;
use std::time::SystemTime;

use crate::identity::RepositoryIdentity;
use crate::remote::RepositoryMetadata;

/// Appended to content cut at the character cap.
pub const TRUNCATION_MARKER: &str = "\n... (content truncated)";

/// Placeholder body for a file whose content could not be fetched.
pub const UNAVAILABLE_PLACEHOLDER: &str = "Error reading file content.";

/// Why a digest has no file sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// The repository reports size zero; the tree was never fetched.
    EmptyRepository,
    /// The tree could not be fetched after retries.
    TreeUnavailable,
}

impl Notice {
    pub fn message(&self) -> &'static str {
        match self {
            Notice::EmptyRepository => "This repository is empty and contains no files.",
            Notice::TreeUnavailable => "Could not fetch repository file structure.",
        }
    }
}

/// Body of one file section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionBody {
    Content { text: String, truncated: bool },
    Unavailable,
}

/// One selected file in rank order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub path: String,
    pub score: u32,
    pub body: SectionBody,
}

/// Output of one synthesis run.
#[derive(Debug, Clone)]
pub struct Digest {
    pub identity: RepositoryIdentity,
    pub metadata: RepositoryMetadata,
    pub notice: Option<Notice>,
    pub sections: Vec<Section>,
    pub generated_at: SystemTime,
    /// Cancelled before every selected file was fetched.
    pub partial: bool,
}

impl Digest {
    pub fn overview_header(&self) -> String {
        let meta = &self.metadata;
        let mut out = String::new();
        let _ = write!(
            out,
            "# Repository Analysis: {}\n\n\
             ## Overview\n\n\
             - Repository: {}\n\
             - Description: {}\n\
             - Default Branch: {}\n\
             - License: {}\n\
             - Language: {}\n\n",
            meta.name,
            meta.full_name,
            meta.description.as_deref().unwrap_or("No description provided"),
            meta.default_branch,
            meta.license.as_deref().unwrap_or("Not specified"),
            meta.language.as_deref().unwrap_or("Not specified"),
        );
        out
    }

    /// Number of sections whose content was fetched.
    pub fn fetched_count(&self) -> usize {
        self.sections
            .iter()
            .filter(|s| matches!(s.body, SectionBody::Content { .. }))
            .count()
    }

    /// Render the digest as Markdown-flavoured text.
    pub fn render(&self) -> String {
        let mut out = self.overview_header();

        if let Some(notice) = self.notice {
            let _ = write!(out, "\n## Files\n\n{}\n", notice.message());
            return out;
        }

        let _ = write!(
            out,
            "## File Structure\n\nTotal Files in Analysis: {}\n\n",
            self.sections.len()
        );
        for section in &self.sections {
            let _ = write!(out, "### File: {}\n\n", section.path);
            match &section.body {
                SectionBody::Content { text, .. } => {
                    let _ = write!(out, "```\n{text}\n```\n\n");
                }
                SectionBody::Unavailable => {
                    let _ = write!(out, "{UNAVAILABLE_PLACEHOLDER}\n\n");
                }
            }
        }
        out
    }
}

/// Decode blob bytes and cap them at `max_chars` characters.
///
/// Returns the text and whether it was cut.
pub fn truncate_content(bytes: &[u8], max_chars: usize) -> (String, bool) {
    let text = String::from_utf8_lossy(bytes);
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => {
            let mut kept = String::with_capacity(cut + TRUNCATION_MARKER.len());
            kept.push_str(&text[..cut]);
            kept.push_str(TRUNCATION_MARKER);
            (kept, true)
        }
        None => (text.into_owned(), false),
    }
}
