//! Content schema module
//!
//! Record types shared by the cache coordinator and the hot/cold store:
//! the [`SourceKind`] of an item, its optional [`SourceMetadata`], and the
//! [`NewsItem`] record that gets cached.

pub mod item;
pub mod source;

pub use item::{NewsItem, SourceMetadata};
pub use source::SourceKind;
