//! Keyword tagging for feed entries.

use std::collections::{BTreeMap, BTreeSet};

/// Built-in tag table, used when the settings file does not define one.
///
/// Matching is plain substring containment, so short words carry their
/// surrounding spaces or punctuation: `"ai"` alone would hit "said" and
/// "email", `"rust"` would hit "trust", `"aws"` would hit "laws".
const DEFAULT_TABLE: &[(&str, &[&str])] = &[
    (
        "AI",
        &[
            " ai ",
            " ai,",
            " ai.",
            " ai-",
            " ai's",
            "(ai)",
            "a.i.",
            "artificial intelligence",
            "machine learning",
            "llm",
            "neural network",
            "openai",
            "chatgpt",
        ],
    ),
    (
        "Cloud",
        &[
            "cloud computing",
            " cloud ",
            " cloud-",
            " aws ",
            "amazon web services",
            "azure",
            "google cloud",
            "kubernetes",
            "serverless",
        ],
    ),
    (
        "Security",
        &[
            "security",
            "vulnerability",
            "data breach",
            "ransomware",
            "malware",
            "zero-day",
            "cve-",
        ],
    ),
    (
        "Programming",
        &[
            " rust ",
            " rust-",
            " rust,",
            " rust.",
            "rustlang",
            "rust lang",
            "python",
            "javascript",
            "typescript",
            "compiler",
            "open source",
            "open-source",
        ],
    ),
    ("Data", &["database", "data science", "data warehouse", "analytics", "sql"]),
    ("Hardware", &["semiconductor", " chip ", " chips ", "chipmaker", " gpu", " cpu"]),
];

/// Tag name to keywords. Built once at startup and shared read-only.
///
/// Keywords are stored lower-cased so matching only has to fold the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordTable {
    tags: BTreeMap<String, Vec<String>>,
}

impl Default for KeywordTable {
    fn default() -> Self {
        Self::new(
            DEFAULT_TABLE
                .iter()
                .map(|(tag, keywords)| {
                    (tag.to_string(), keywords.iter().map(|k| k.to_string()).collect())
                })
                .collect(),
        )
    }
}

impl KeywordTable {
    /// Blank keywords are dropped; they would match every entry.
    pub fn new(tags: BTreeMap<String, Vec<String>>) -> Self {
        let tags = tags
            .into_iter()
            .map(|(tag, keywords)| {
                let keywords = keywords
                    .into_iter()
                    .map(|k| k.to_lowercase())
                    .filter(|k| !k.trim().is_empty())
                    .collect();
                (tag, keywords)
            })
            .collect();
        Self { tags }
    }

    /// The configured table, or the built-in one when none is configured.
    pub fn from_settings(tags: &BTreeMap<String, Vec<String>>) -> Self {
        if tags.is_empty() {
            Self::default()
        } else {
            Self::new(tags.clone())
        }
    }

    /// Tags whose keywords appear anywhere in `title` or `summary`,
    /// case-insensitively.
    ///
    /// The text is padded with a space on each side so space-delimited
    /// keywords also match at the very start or end.
    pub fn tags_for(&self, title: &str, summary: &str) -> BTreeSet<String> {
        let text = format!(" {title} {summary} ").to_lowercase();
        self.tags
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|k| text.contains(k.as_str())))
            .map(|(tag, _)| tag.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }
}
