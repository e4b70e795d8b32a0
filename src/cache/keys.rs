//! Cache key derivation

use crate::hash::hash_str;
use crate::schema::SourceKind;

/// `{namespace}:{kind}:{hash64(url) as 16 hex digits}`
///
/// Deterministic across processes. Partitions keys by kind; not a
/// security boundary.
pub fn cache_key(namespace: &str, url: &str, kind: SourceKind) -> String {
    format!("{}:{}:{:016x}", namespace, kind.as_str(), hash_str(url))
}
