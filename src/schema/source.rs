//! Source kinds for cached content

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a cached item came from
///
/// The `u8` code is persisted in every cache entry header, so existing codes
/// must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Reddit posts and threads
    Reddit,
    /// Hacker News stories
    HackerNews,
    /// Twitter/X posts
    Twitter,
    /// Generic RSS/Atom feeds
    Rss,
    /// YouTube videos
    YouTube,
    /// Blog articles
    Blog,
    /// GitHub repositories and releases
    GitHub,
    /// Hugging Face models and papers
    HuggingFace,
    /// Research papers (arXiv and similar)
    Research,
}

impl SourceKind {
    /// Every kind, in code order
    pub const ALL: [SourceKind; 9] = [
        SourceKind::Reddit,
        SourceKind::HackerNews,
        SourceKind::Twitter,
        SourceKind::Rss,
        SourceKind::YouTube,
        SourceKind::Blog,
        SourceKind::GitHub,
        SourceKind::HuggingFace,
        SourceKind::Research,
    ];

    /// Stable wire code
    pub const fn code(self) -> u8 {
        match self {
            SourceKind::Reddit => 0,
            SourceKind::HackerNews => 1,
            SourceKind::Twitter => 2,
            SourceKind::Rss => 3,
            SourceKind::YouTube => 4,
            SourceKind::Blog => 5,
            SourceKind::GitHub => 6,
            SourceKind::HuggingFace => 7,
            SourceKind::Research => 8,
        }
    }

    /// Prefix used in cache keys
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Reddit => "reddit",
            SourceKind::HackerNews => "hackernews",
            SourceKind::Twitter => "twitter",
            SourceKind::Rss => "rss",
            SourceKind::YouTube => "youtube",
            SourceKind::Blog => "blog",
            SourceKind::GitHub => "github",
            SourceKind::HuggingFace => "huggingface",
            SourceKind::Research => "research",
        }
    }

    /// Parse a kind from its key prefix
    pub fn from_str(s: &str) -> Option<Self> {
        let lower = s.to_lowercase();
        Self::ALL.into_iter().find(|kind| kind.as_str() == lower)
    }
}

impl TryFrom<u8> for SourceKind {
    type Error = CacheError;

    fn try_from(code: u8) -> Result<Self> {
        Self::ALL
            .get(code as usize)
            .copied()
            .ok_or_else(|| CacheError::CorruptEntry(format!("unknown source kind code {}", code)))
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_positions() {
        for (i, kind) in SourceKind::ALL.iter().enumerate() {
            assert_eq!(kind.code() as usize, i);
            assert_eq!(SourceKind::try_from(kind.code()).unwrap(), *kind);
        }
        assert!(SourceKind::try_from(9).is_err());
    }

    #[test]
    fn test_prefix_parsing() {
        assert_eq!(SourceKind::from_str("reddit"), Some(SourceKind::Reddit));
        assert_eq!(SourceKind::from_str("YouTube"), Some(SourceKind::YouTube));
        assert_eq!(SourceKind::from_str("myspace"), None);
        assert_eq!(SourceKind::HuggingFace.to_string(), "huggingface");
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&SourceKind::HackerNews).unwrap();
        assert_eq!(json, "\"hackernews\"");
        let kind: SourceKind = serde_json::from_str("\"github\"").unwrap();
        assert_eq!(kind, SourceKind::GitHub);
    }
}
