//! Columnar hot/cold item storage
//!
//! Each item is split into a compact hot record (score, timestamp, kind and
//! the title/url hashes) and a cold record of arena handles. Bulk passes
//! (dedup, relevance filter, timestamp sort) read only the hot column, then
//! move hot and cold records together so `hot[i].cold_index` always
//! addresses the cold record completing item `i`.
//!
//! Not safe for concurrent mutation; use one store per processing pass.

use crate::error::{CacheError, Result};
use crate::hash::hash_str;
use crate::schema::{NewsItem, SourceKind, SourceMetadata};
use crate::store::arena::{MetadataPools, MetadataRef, StringArena, StringRef};
use std::collections::HashSet;
use tracing::debug;

/// Fields touched by every bulk operation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewsItemHot {
    pub relevance_score: f32,
    pub timestamp: i64,
    pub source_kind: SourceKind,
    pub title_hash: u64,
    pub url_hash: u64,
    pub cold_index: u32,
}

/// Rarely touched fields, stored as arena handles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewsItemCold {
    pub title: StringRef,
    pub summary: StringRef,
    pub url: StringRef,
    pub source: StringRef,
    pub metadata: Option<MetadataRef>,
}

/// Borrowed view of one stored item
#[derive(Debug, Clone, PartialEq)]
pub struct NewsItemView<'a> {
    pub title: &'a str,
    pub summary: &'a str,
    pub url: &'a str,
    pub source: &'a str,
    pub source_kind: SourceKind,
    pub relevance_score: f32,
    pub timestamp: i64,
    pub metadata: Option<MetadataRef>,
}

/// Fixed-capacity hot/cold store with its own arenas
#[derive(Debug)]
pub struct HotColdStore {
    hot: Vec<NewsItemHot>,
    cold: Vec<NewsItemCold>,
    capacity: usize,
    strings: StringArena,
    metadata: MetadataPools,
}

impl HotColdStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            hot: Vec::with_capacity(capacity),
            cold: Vec::with_capacity(capacity),
            capacity,
            strings: StringArena::new(),
            metadata: MetadataPools::new(),
        }
    }

    /// Build a store sized for `items` and add them all
    pub fn from_items(items: &[NewsItem]) -> Result<Self> {
        let mut store = Self::with_capacity(items.len());
        for item in items {
            store.add_item(item)?;
        }
        Ok(store)
    }

    /// Append an item; fails with [`CacheError::CapacityError`] when full
    ///
    /// Returns the item's index.
    pub fn add_item(&mut self, item: &NewsItem) -> Result<usize> {
        let index = self.hot.len();
        if index >= self.capacity {
            return Err(CacheError::CapacityError(format!(
                "hot/cold store is full ({} items)",
                self.capacity
            )));
        }
        let cold_index = u32::try_from(index)
            .map_err(|_| CacheError::CapacityError("item index exceeds u32".to_string()))?;

        let metadata = match &item.metadata {
            Some(meta) => Some(self.metadata.alloc(&mut self.strings, meta)?),
            None => None,
        };
        let cold = NewsItemCold {
            title: self.strings.alloc_str(&item.title)?,
            summary: self.strings.alloc_str(&item.summary)?,
            url: self.strings.alloc_str(&item.url)?,
            source: self.strings.alloc_str(&item.source)?,
            metadata,
        };

        self.hot.push(NewsItemHot {
            relevance_score: item.relevance_score,
            timestamp: item.timestamp,
            source_kind: item.source_kind,
            title_hash: hash_str(&item.title),
            url_hash: hash_str(&item.url),
            cold_index,
        });
        self.cold.push(cold);
        Ok(index)
    }

    /// Drop items whose title or url matches an earlier kept item
    ///
    /// Single pass over the hot column with one hash set per field, O(n).
    /// Returns the new count.
    pub fn deduplicate_hot(&mut self) -> usize {
        let mut seen_titles = HashSet::with_capacity(self.hot.len());
        let mut seen_urls = HashSet::with_capacity(self.hot.len());
        let before = self.hot.len();

        let count = self.compact(|hot| {
            if seen_titles.contains(&hot.title_hash) || seen_urls.contains(&hot.url_hash) {
                return false;
            }
            seen_titles.insert(hot.title_hash);
            seen_urls.insert(hot.url_hash);
            true
        });

        debug!("Dedup kept {} of {} items", count, before);
        count
    }

    /// Same result as [`deduplicate_hot`](Self::deduplicate_hot), comparing
    /// each item against every kept item: O(kept × n)
    pub fn deduplicate_hot_pairwise(&mut self) -> usize {
        let mut kept: Vec<(u64, u64)> = Vec::with_capacity(self.hot.len());
        self.compact(|hot| {
            let duplicate = kept
                .iter()
                .any(|&(title, url)| title == hot.title_hash || url == hot.url_hash);
            if !duplicate {
                kept.push((hot.title_hash, hot.url_hash));
            }
            !duplicate
        })
    }

    /// Keep items with `relevance_score >= threshold`; returns the new count
    pub fn filter_by_relevance_hot(&mut self, threshold: f32) -> usize {
        self.compact(|hot| hot.relevance_score >= threshold)
    }

    /// Order items newest first; returns the count
    ///
    /// Builds a permutation over the hot column and applies it to both
    /// columns. Equal timestamps keep their insertion order.
    pub fn sort_by_timestamp(&mut self) -> usize {
        let mut order: Vec<usize> = (0..self.hot.len()).collect();
        order.sort_by(|&a, &b| self.hot[b].timestamp.cmp(&self.hot[a].timestamp));

        let mut hot = Vec::with_capacity(self.capacity);
        let mut cold = Vec::with_capacity(self.capacity);
        for (new_index, &old) in order.iter().enumerate() {
            let mut record = self.hot[old];
            cold.push(self.cold[record.cold_index as usize]);
            record.cold_index = new_index as u32;
            hot.push(record);
        }
        self.hot = hot;
        self.cold = cold;
        self.hot.len()
    }

    /// In-place stable compaction of both columns
    fn compact<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&NewsItemHot) -> bool,
    {
        let mut write = 0;
        for read in 0..self.hot.len() {
            if !keep(&self.hot[read]) {
                continue;
            }
            let mut record = self.hot[read];
            self.cold[write] = self.cold[record.cold_index as usize];
            record.cold_index = write as u32;
            self.hot[write] = record;
            write += 1;
        }
        self.hot.truncate(write);
        self.cold.truncate(write);
        write
    }

    /// Borrowed view of item `i`
    pub fn item(&self, i: usize) -> Option<NewsItemView<'_>> {
        let hot = self.hot.get(i)?;
        let cold = self.cold.get(hot.cold_index as usize)?;
        Some(NewsItemView {
            title: self.strings.get_str(cold.title)?,
            summary: self.strings.get_str(cold.summary)?,
            url: self.strings.get_str(cold.url)?,
            source: self.strings.get_str(cold.source)?,
            source_kind: hot.source_kind,
            relevance_score: hot.relevance_score,
            timestamp: hot.timestamp,
            metadata: cold.metadata,
        })
    }

    /// Owned copy of item `i`, metadata included
    pub fn to_news_item(&self, i: usize) -> Option<NewsItem> {
        let view = self.item(i)?;
        let metadata = match view.metadata {
            Some(handle) => Some(self.metadata.get(&self.strings, handle)?),
            None => None,
        };
        Some(NewsItem {
            title: view.title.to_string(),
            summary: view.summary.to_string(),
            url: view.url.to_string(),
            source: view.source.to_string(),
            source_kind: view.source_kind,
            relevance_score: view.relevance_score,
            timestamp: view.timestamp,
            metadata,
        })
    }

    /// Owned copies of every live item, in store order
    pub fn to_news_items(&self) -> Vec<NewsItem> {
        (0..self.len()).filter_map(|i| self.to_news_item(i)).collect()
    }

    /// Metadata of item `i`
    pub fn metadata_of(&self, i: usize) -> Option<SourceMetadata> {
        let handle = self.item(i)?.metadata?;
        self.metadata.get(&self.strings, handle)
    }

    pub fn len(&self) -> usize {
        self.hot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hot.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn hot(&self) -> &[NewsItemHot] {
        &self.hot
    }

    pub fn cold(&self) -> &[NewsItemCold] {
        &self.cold
    }

    pub fn strings(&self) -> &StringArena {
        &self.strings
    }

    pub fn metadata(&self) -> &MetadataPools {
        &self.metadata
    }

    /// Remove every item and reset the arenas
    pub fn clear(&mut self) {
        self.hot.clear();
        self.cold.clear();
        self.strings.clear();
        self.metadata.clear();
    }
}
