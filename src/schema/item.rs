//! Cached content records

use crate::schema::source::SourceKind;
use serde::{Deserialize, Serialize};

/// Source-specific details attached to an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceMetadata {
    Reddit {
        subreddit: String,
        upvotes: i64,
        comment_count: u32,
    },
    YouTube {
        channel: String,
        view_count: u64,
        duration_secs: u32,
    },
    HuggingFace {
        model_id: String,
        downloads: u64,
        likes: u32,
    },
    Blog {
        author: String,
        reading_minutes: u16,
    },
    GitHub {
        repository: String,
        stars: u32,
        language: Option<String>,
    },
}

/// One piece of fetched content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    /// Headline or title
    pub title: String,
    /// Short summary of the content
    pub summary: String,
    /// Canonical URL
    pub url: String,
    /// Human-readable source name (e.g. "r/rust", "arXiv")
    pub source: String,
    /// Source category
    pub source_kind: SourceKind,
    /// Relevance score assigned during analysis
    pub relevance_score: f32,
    /// Publication time as unix seconds
    pub timestamp: i64,
    /// Optional source-specific details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SourceMetadata>,
}

impl NewsItem {
    /// Create an item without metadata
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        source_kind: SourceKind,
        timestamp: i64,
    ) -> Self {
        Self {
            title: title.into(),
            summary: String::new(),
            url: url.into(),
            source: source_kind.as_str().to_string(),
            source_kind,
            relevance_score: 0.0,
            timestamp,
            metadata: None,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_relevance(mut self, score: f32) -> Self {
        self.relevance_score = score;
        self
    }

    pub fn with_metadata(mut self, metadata: SourceMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
