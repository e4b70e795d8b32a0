//! Fixed-seed 64-bit hashing
//!
//! FNV-1a with the standard offset basis. The output is stable across
//! processes, platforms and releases, which cache keys and persisted content
//! hashes depend on. Not suitable where an adversary picks the input.

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Hash arbitrary bytes
pub fn hash64(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in bytes {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Hash a string's UTF-8 bytes
pub fn hash_str(s: &str) -> u64 {
    hash64(s.as_bytes())
}
