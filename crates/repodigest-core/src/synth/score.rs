//! File importance scoring and ranking.
//!
//! Scores come from an ordered rule table. The first matching rule wins, so a
//! root-level `README.md` scores as a manifest, not as a Markdown file.

use crate::remote::RemoteFileEntry;

use super::filter::extension_of;

/// Score for files no rule matches.
pub const DEFAULT_SCORE: u32 = 100;

/// How a [`ScoreRule`] recognises a path. All comparisons are case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matcher {
    /// Exact file name at the repository root.
    RootFile(&'static [&'static str]),
    /// Path under a root-level directory (prefix includes the trailing `/`).
    Directory(&'static str),
    /// File extension, without the dot.
    Extension(&'static [&'static str]),
}

impl Matcher {
    /// `lower_path` must already be lowercased.
    fn matches(&self, lower_path: &str) -> bool {
        match self {
            Matcher::RootFile(names) => names.iter().any(|n| *n == lower_path),
            Matcher::Directory(prefix) => lower_path.starts_with(prefix),
            Matcher::Extension(exts) => {
                extension_of(lower_path).is_some_and(|ext| exts.iter().any(|e| *e == ext))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreRule {
    pub name: &'static str,
    pub matcher: Matcher,
    pub score: u32,
}

const fn rule(name: &'static str, matcher: Matcher, score: u32) -> ScoreRule {
    ScoreRule {
        name,
        matcher,
        score,
    }
}

/// The scoring table, in evaluation order.
pub const RULES: &[ScoreRule] = &[
    rule("readme", Matcher::RootFile(&["readme.md"]), 1000),
    rule("npm manifest", Matcher::RootFile(&["package.json"]), 960),
    rule("cargo manifest", Matcher::RootFile(&["cargo.toml"]), 955),
    rule("python project", Matcher::RootFile(&["pyproject.toml"]), 952),
    rule("pip requirements", Matcher::RootFile(&["requirements.txt"]), 950),
    rule("go module", Matcher::RootFile(&["go.mod"]), 945),
    rule("dockerfile", Matcher::RootFile(&["dockerfile"]), 910),
    rule(
        "compose file",
        Matcher::RootFile(&["docker-compose.yml", "docker-compose.yaml"]),
        900,
    ),
    rule("tsconfig", Matcher::RootFile(&["tsconfig.json"]), 850),
    rule("env example", Matcher::RootFile(&[".env.example"]), 820),
    rule("main entry", Matcher::RootFile(&["main.js", "main.ts"]), 810),
    rule(
        "index entry",
        Matcher::RootFile(&["index.js", "index.jsx", "index.ts", "index.tsx"]),
        805,
    ),
    rule(
        "app entry",
        Matcher::RootFile(&["app.js", "app.jsx", "app.ts", "app.tsx"]),
        803,
    ),
    rule("server entry", Matcher::RootFile(&["server.js", "server.ts"]), 801),
    rule("src dir", Matcher::Directory("src/"), 700),
    rule("app dir", Matcher::Directory("app/"), 690),
    rule("api dir", Matcher::Directory("api/"), 650),
    rule("components dir", Matcher::Directory("components/"), 620),
    rule("pages dir", Matcher::Directory("pages/"), 600),
    rule("lib dir", Matcher::Directory("lib/"), 560),
    rule("utils dir", Matcher::Directory("utils/"), 550),
    rule("hooks dir", Matcher::Directory("hooks/"), 520),
    rule("models dir", Matcher::Directory("models/"), 510),
    rule("controllers dir", Matcher::Directory("controllers/"), 500),
    rule("typescript", Matcher::Extension(&["ts", "tsx"]), 400),
    rule("javascript", Matcher::Extension(&["js", "jsx"]), 390),
    rule("python", Matcher::Extension(&["py"]), 380),
    rule("java", Matcher::Extension(&["java"]), 370),
    rule("go", Matcher::Extension(&["go"]), 360),
    rule("rust", Matcher::Extension(&["rs"]), 350),
    rule("markdown", Matcher::Extension(&["md"]), 300),
    rule("json", Matcher::Extension(&["json"]), 200),
    rule("yaml", Matcher::Extension(&["yml", "yaml"]), 190),
];

/// First rule matching `path`, if any.
pub fn matching_rule(path: &str) -> Option<&'static ScoreRule> {
    let lower = path.to_ascii_lowercase();
    RULES.iter().find(|r| r.matcher.matches(&lower))
}

pub fn score_path(path: &str) -> u32 {
    matching_rule(path).map_or(DEFAULT_SCORE, |r| r.score)
}

/// A tree entry with its importance score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedFile {
    pub entry: RemoteFileEntry,
    pub score: u32,
}

/// Score and order entries: score descending, ties in tree order.
pub fn rank(entries: Vec<RemoteFileEntry>) -> Vec<RankedFile> {
    let mut ranked: Vec<RankedFile> = entries
        .into_iter()
        .map(|entry| RankedFile {
            score: score_path(&entry.path),
            entry,
        })
        .collect();
    // `sort_by` is stable.
    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked
}
