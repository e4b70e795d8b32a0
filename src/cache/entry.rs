//! TTL-bearing cache entries and their at-rest byte layout
//!
//! ```text
//! timestamp:i64 LE | ttl_seconds:u32 LE | source_kind:u8 | content_hash:u64 LE | content_len:u32 LE | content
//! ```

use crate::error::{CacheError, Result};
use crate::hash::hash64;
use crate::schema::SourceKind;
use bytes::{Buf, BufMut};
use chrono::{DateTime, TimeZone, Utc};

/// Size of the fixed header preceding the content bytes (8 + 4 + 1 + 8 + 4)
pub const ENTRY_HEADER_LEN: usize = 25;

/// A cached payload with the metadata needed for lazy expiry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Serialized items
    pub content: Vec<u8>,
    /// Write time as unix seconds
    pub timestamp: i64,
    pub ttl_seconds: u32,
    pub source_kind: SourceKind,
    /// `hash64(content)` at write time
    pub content_hash: u64,
}

impl CacheEntry {
    /// Create an entry written at `now`, hashing the content
    pub fn new(content: Vec<u8>, source_kind: SourceKind, ttl_seconds: u32, now: i64) -> Self {
        let content_hash = hash64(&content);
        Self {
            content,
            timestamp: now,
            ttl_seconds,
            source_kind,
            content_hash,
        }
    }

    /// `now - timestamp > ttl_seconds`
    pub fn is_expired(&self, now: i64) -> bool {
        now.saturating_sub(self.timestamp) > self.ttl_seconds as i64
    }

    /// Seconds since the entry was written (negative if written in the future)
    pub fn age(&self, now: i64) -> i64 {
        now.saturating_sub(self.timestamp)
    }

    /// Seconds left before expiry, `None` once expired
    pub fn remaining_ttl(&self, now: i64) -> Option<i64> {
        if self.is_expired(now) {
            None
        } else {
            Some(self.ttl_seconds as i64 - self.age(now))
        }
    }

    /// Expiry instant, if representable
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let secs = self.timestamp.checked_add(self.ttl_seconds as i64)?;
        Utc.timestamp_opt(secs, 0).single()
    }

    /// Total encoded size in bytes
    pub fn encoded_len(&self) -> usize {
        ENTRY_HEADER_LEN + self.content.len()
    }

    /// Encode to the at-rest layout
    pub fn encode(&self) -> Result<Vec<u8>> {
        let content_len = u32::try_from(self.content.len()).map_err(|_| {
            CacheError::SerializationError(format!(
                "entry content of {} bytes exceeds u32",
                self.content.len()
            ))
        })?;

        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.put_i64_le(self.timestamp);
        buf.put_u32_le(self.ttl_seconds);
        buf.put_u8(self.source_kind.code());
        buf.put_u64_le(self.content_hash);
        buf.put_u32_le(content_len);
        buf.extend_from_slice(&self.content);
        Ok(buf)
    }

    /// Decode and validate an entry
    ///
    /// Undersized buffers, a length prefix that disagrees with the buffer,
    /// an unknown source kind or a content hash mismatch are all
    /// [`CacheError::CorruptEntry`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < ENTRY_HEADER_LEN {
            return Err(CacheError::CorruptEntry(format!(
                "entry is {} bytes, header needs {}",
                bytes.len(),
                ENTRY_HEADER_LEN
            )));
        }

        let mut buf = bytes;
        let timestamp = buf.get_i64_le();
        let ttl_seconds = buf.get_u32_le();
        let source_kind = SourceKind::try_from(buf.get_u8())?;
        let content_hash = buf.get_u64_le();
        let content_len = buf.get_u32_le() as usize;

        if content_len != buf.remaining() {
            return Err(CacheError::CorruptEntry(format!(
                "length prefix says {} content bytes, found {}",
                content_len,
                buf.remaining()
            )));
        }

        let content = buf.to_vec();
        let actual = hash64(&content);
        if actual != content_hash {
            return Err(CacheError::CorruptEntry(format!(
                "content hash mismatch: stored {:016x}, computed {:016x}",
                content_hash, actual
            )));
        }

        Ok(Self {
            content,
            timestamp,
            ttl_seconds,
            source_kind,
            content_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> CacheEntry {
        CacheEntry::new(b"[1,2,3]".to_vec(), SourceKind::Reddit, 3600, 1_700_000_000)
    }

    #[test]
    fn test_expiry_boundary() {
        let now = 1_700_000_000;
        let ttl = 3600u32;

        let stale = CacheEntry::new(vec![], SourceKind::Rss, ttl, now - ttl as i64 - 1);
        assert!(stale.is_expired(now));

        let fresh = CacheEntry::new(vec![], SourceKind::Rss, ttl, now - ttl as i64 + 1);
        assert!(!fresh.is_expired(now));

        // exactly ttl old is still live
        let edge = CacheEntry::new(vec![], SourceKind::Rss, ttl, now - ttl as i64);
        assert!(!edge.is_expired(now));
        assert_eq!(edge.remaining_ttl(now), Some(0));
    }

    #[test]
    fn test_encode_layout() {
        let e = entry();
        let bytes = e.encode().unwrap();

        assert_eq!(bytes.len(), ENTRY_HEADER_LEN + 7);
        assert_eq!(&bytes[0..8], &1_700_000_000i64.to_le_bytes());
        assert_eq!(&bytes[8..12], &3600u32.to_le_bytes());
        assert_eq!(bytes[12], SourceKind::Reddit.code());
        assert_eq!(&bytes[13..21], &e.content_hash.to_le_bytes());
        assert_eq!(&bytes[21..25], &7u32.to_le_bytes());
        assert_eq!(&bytes[25..], b"[1,2,3]");

        assert_eq!(CacheEntry::decode(&bytes).unwrap(), e);
    }

    #[test]
    fn test_decode_rejects_short_buffer() {
        let err = CacheEntry::decode(&[0u8; ENTRY_HEADER_LEN - 1]).unwrap_err();
        assert!(matches!(err, CacheError::CorruptEntry(_)));
    }

    #[test]
    fn test_decode_rejects_bad_length_prefix() {
        let mut bytes = entry().encode().unwrap();
        bytes.pop();
        assert!(matches!(
            CacheEntry::decode(&bytes),
            Err(CacheError::CorruptEntry(_))
        ));

        let mut bytes = entry().encode().unwrap();
        bytes.push(0);
        assert!(matches!(
            CacheEntry::decode(&bytes),
            Err(CacheError::CorruptEntry(_))
        ));
    }

    #[test]
    fn test_decode_rejects_unknown_kind_and_bad_hash() {
        let mut bytes = entry().encode().unwrap();
        bytes[12] = 0xEE;
        assert!(matches!(
            CacheEntry::decode(&bytes),
            Err(CacheError::CorruptEntry(_))
        ));

        let mut bytes = entry().encode().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            CacheEntry::decode(&bytes),
            Err(CacheError::CorruptEntry(_))
        ));
    }

    #[test]
    fn test_empty_content_decodes() {
        let e = CacheEntry::new(Vec::new(), SourceKind::Blog, 10, 5);
        let bytes = e.encode().unwrap();
        assert_eq!(bytes.len(), ENTRY_HEADER_LEN);
        assert_eq!(CacheEntry::decode(&bytes).unwrap(), e);
    }

    #[test]
    fn test_expires_at() {
        let e = entry();
        assert_eq!(e.expires_at().unwrap().timestamp(), 1_700_003_600);
    }
}
