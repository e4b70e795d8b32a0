//! Append-only arenas for item strings and per-source metadata
//!
//! Strings are appended to one growable byte buffer and handed back as
//! [`StringRef`] offset/length handles. A handle is only meaningful for the
//! arena that produced it and is invalidated when that arena is cleared or
//! dropped. Previously returned ranges are never rewritten.

use crate::error::{CacheError, Result};
use crate::schema::{SourceKind, SourceMetadata};

/// Offset/length view into a [`StringArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StringRef {
    pub offset: u32,
    pub length: u32,
}

impl StringRef {
    pub const EMPTY: StringRef = StringRef { offset: 0, length: 0 };

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    fn range(&self) -> std::ops::Range<usize> {
        let start = self.offset as usize;
        start..start + self.length as usize
    }
}

/// Growable append-only byte arena
#[derive(Debug, Default)]
pub struct StringArena {
    buf: Vec<u8>,
}

impl StringArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            buf: Vec::with_capacity(bytes),
        }
    }

    /// Append bytes and return a handle to them
    pub fn alloc(&mut self, bytes: &[u8]) -> Result<StringRef> {
        let offset = u32::try_from(self.buf.len())
            .map_err(|_| CacheError::CapacityError("string arena exceeds 4 GiB".to_string()))?;
        let length = u32::try_from(bytes.len())
            .ok()
            .filter(|len| offset.checked_add(*len).is_some())
            .ok_or_else(|| CacheError::CapacityError("string arena exceeds 4 GiB".to_string()))?;
        self.buf.extend_from_slice(bytes);
        Ok(StringRef { offset, length })
    }

    pub fn alloc_str(&mut self, s: &str) -> Result<StringRef> {
        self.alloc(s.as_bytes())
    }

    /// Borrow the bytes behind a handle; `None` if it does not fit this arena
    pub fn get(&self, r: StringRef) -> Option<&[u8]> {
        self.buf.get(r.range())
    }

    /// Borrow a handle as `&str`; `None` if out of range or not UTF-8
    pub fn get_str(&self, r: StringRef) -> Option<&str> {
        self.get(r).and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    /// Bytes stored so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Drop every string; all outstanding handles become invalid
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Handle to a record in [`MetadataPools`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetadataRef {
    pub kind: SourceKind,
    pub index: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct RedditMeta {
    pub subreddit: StringRef,
    pub upvotes: i64,
    pub comment_count: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct YouTubeMeta {
    pub channel: StringRef,
    pub view_count: u64,
    pub duration_secs: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct HuggingFaceMeta {
    pub model_id: StringRef,
    pub downloads: u64,
    pub likes: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct BlogMeta {
    pub author: StringRef,
    pub reading_minutes: u16,
}

#[derive(Debug, Clone, Copy)]
pub struct GitHubMeta {
    pub repository: StringRef,
    pub stars: u32,
    pub language: Option<StringRef>,
}

/// One typed column per metadata kind; strings live in the shared arena
#[derive(Debug, Default)]
pub struct MetadataPools {
    pub reddit: Vec<RedditMeta>,
    pub youtube: Vec<YouTubeMeta>,
    pub huggingface: Vec<HuggingFaceMeta>,
    pub blog: Vec<BlogMeta>,
    pub github: Vec<GitHubMeta>,
}

fn push_index<T>(column: &mut Vec<T>, record: T) -> Result<u32> {
    let index = u32::try_from(column.len())
        .map_err(|_| CacheError::CapacityError("metadata pool is full".to_string()))?;
    column.push(record);
    Ok(index)
}

impl MetadataPools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store metadata, interning its strings into `strings`
    pub fn alloc(&mut self, strings: &mut StringArena, meta: &SourceMetadata) -> Result<MetadataRef> {
        let handle = match meta {
            SourceMetadata::Reddit {
                subreddit,
                upvotes,
                comment_count,
            } => {
                let record = RedditMeta {
                    subreddit: strings.alloc_str(subreddit)?,
                    upvotes: *upvotes,
                    comment_count: *comment_count,
                };
                MetadataRef {
                    kind: SourceKind::Reddit,
                    index: push_index(&mut self.reddit, record)?,
                }
            }
            SourceMetadata::YouTube {
                channel,
                view_count,
                duration_secs,
            } => {
                let record = YouTubeMeta {
                    channel: strings.alloc_str(channel)?,
                    view_count: *view_count,
                    duration_secs: *duration_secs,
                };
                MetadataRef {
                    kind: SourceKind::YouTube,
                    index: push_index(&mut self.youtube, record)?,
                }
            }
            SourceMetadata::HuggingFace {
                model_id,
                downloads,
                likes,
            } => {
                let record = HuggingFaceMeta {
                    model_id: strings.alloc_str(model_id)?,
                    downloads: *downloads,
                    likes: *likes,
                };
                MetadataRef {
                    kind: SourceKind::HuggingFace,
                    index: push_index(&mut self.huggingface, record)?,
                }
            }
            SourceMetadata::Blog {
                author,
                reading_minutes,
            } => {
                let record = BlogMeta {
                    author: strings.alloc_str(author)?,
                    reading_minutes: *reading_minutes,
                };
                MetadataRef {
                    kind: SourceKind::Blog,
                    index: push_index(&mut self.blog, record)?,
                }
            }
            SourceMetadata::GitHub {
                repository,
                stars,
                language,
            } => {
                let language = match language {
                    Some(lang) => Some(strings.alloc_str(lang)?),
                    None => None,
                };
                let record = GitHubMeta {
                    repository: strings.alloc_str(repository)?,
                    stars: *stars,
                    language,
                };
                MetadataRef {
                    kind: SourceKind::GitHub,
                    index: push_index(&mut self.github, record)?,
                }
            }
        };
        Ok(handle)
    }

    /// Rebuild the owned metadata behind a handle
    pub fn get(&self, strings: &StringArena, handle: MetadataRef) -> Option<SourceMetadata> {
        let owned = |r: StringRef| strings.get_str(r).map(str::to_string);
        let i = handle.index as usize;
        match handle.kind {
            SourceKind::Reddit => {
                let m = self.reddit.get(i)?;
                Some(SourceMetadata::Reddit {
                    subreddit: owned(m.subreddit)?,
                    upvotes: m.upvotes,
                    comment_count: m.comment_count,
                })
            }
            SourceKind::YouTube => {
                let m = self.youtube.get(i)?;
                Some(SourceMetadata::YouTube {
                    channel: owned(m.channel)?,
                    view_count: m.view_count,
                    duration_secs: m.duration_secs,
                })
            }
            SourceKind::HuggingFace => {
                let m = self.huggingface.get(i)?;
                Some(SourceMetadata::HuggingFace {
                    model_id: owned(m.model_id)?,
                    downloads: m.downloads,
                    likes: m.likes,
                })
            }
            SourceKind::Blog => {
                let m = self.blog.get(i)?;
                Some(SourceMetadata::Blog {
                    author: owned(m.author)?,
                    reading_minutes: m.reading_minutes,
                })
            }
            SourceKind::GitHub => {
                let m = self.github.get(i)?;
                let language = match m.language {
                    Some(r) => Some(owned(r)?),
                    None => None,
                };
                Some(SourceMetadata::GitHub {
                    repository: owned(m.repository)?,
                    stars: m.stars,
                    language,
                })
            }
            _ => None,
        }
    }

    /// Total records across all columns
    pub fn len(&self) -> usize {
        self.reddit.len()
            + self.youtube.len()
            + self.huggingface.len()
            + self.blog.len()
            + self.github.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.reddit.clear();
        self.youtube.clear();
        self.huggingface.clear();
        self.blog.clear();
        self.github.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_and_get() {
        let mut arena = StringArena::new();
        let a = arena.alloc_str("hello").unwrap();
        let b = arena.alloc_str("").unwrap();
        let c = arena.alloc_str("wörld").unwrap();

        assert_eq!(a, StringRef { offset: 0, length: 5 });
        assert!(b.is_empty());
        assert_eq!(arena.get_str(a), Some("hello"));
        assert_eq!(arena.get_str(b), Some(""));
        assert_eq!(arena.get_str(c), Some("wörld"));
        assert_eq!(arena.len(), 5 + "wörld".len());
    }

    #[test]
    fn test_earlier_ranges_survive_growth() {
        let mut arena = StringArena::with_capacity(4);
        let first = arena.alloc_str("first").unwrap();
        for i in 0..1000 {
            arena.alloc_str(&format!("filler-{}", i)).unwrap();
        }
        assert_eq!(arena.get_str(first), Some("first"));
    }

    #[test]
    fn test_foreign_handle_is_rejected() {
        let mut big = StringArena::new();
        big.alloc_str("a long string in another arena").unwrap();
        let foreign = big.alloc_str("tail").unwrap();

        let small = StringArena::new();
        assert_eq!(small.get(foreign), None);
    }

    #[test]
    fn test_clear_invalidates_handles() {
        let mut arena = StringArena::new();
        let r = arena.alloc_str("gone").unwrap();
        arena.clear();
        assert!(arena.is_empty());
        assert_eq!(arena.get(r), None);
    }

    #[test]
    fn test_metadata_roundtrip_per_kind() {
        let mut strings = StringArena::new();
        let mut pools = MetadataPools::new();
        let samples = vec![
            SourceMetadata::Reddit {
                subreddit: "rust".to_string(),
                upvotes: -3,
                comment_count: 12,
            },
            SourceMetadata::YouTube {
                channel: "Rust Videos".to_string(),
                view_count: 1_000_000,
                duration_secs: 3600,
            },
            SourceMetadata::HuggingFace {
                model_id: "org/model".to_string(),
                downloads: 42,
                likes: 7,
            },
            SourceMetadata::Blog {
                author: "ferris".to_string(),
                reading_minutes: 8,
            },
            SourceMetadata::GitHub {
                repository: "tokio-rs/tokio".to_string(),
                stars: 25_000,
                language: None,
            },
        ];

        let handles: Vec<MetadataRef> = samples
            .iter()
            .map(|m| pools.alloc(&mut strings, m).unwrap())
            .collect();

        assert_eq!(pools.len(), 5);
        for (handle, expected) in handles.iter().zip(&samples) {
            assert_eq!(handle.index, 0);
            assert_eq!(pools.get(&strings, *handle).as_ref(), Some(expected));
        }

        let missing = MetadataRef {
            kind: SourceKind::Reddit,
            index: 9,
        };
        assert_eq!(pools.get(&strings, missing), None);
    }
}
