//! In-memory item storage
//!
//! - [`arena`]: append-only string arena and typed metadata pools
//! - [`hot_cold`]: columnar store with dedup, filter and sort passes

pub mod arena;
pub mod hot_cold;

pub use arena::{MetadataPools, MetadataRef, StringArena, StringRef};
pub use hot_cold::{HotColdStore, NewsItemCold, NewsItemHot, NewsItemView};
