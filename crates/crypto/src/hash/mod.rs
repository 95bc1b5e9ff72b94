// Path: crates/crypto/src/hash/mod.rs
//! BLAKE3-512: BLAKE3 with a 64-byte extended output.

use arbor_types::{Hash, HASH_LEN};

/// Digests `data` into a 64-byte hash.
pub fn blake3_512(data: &[u8]) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(data);
    let mut out = [0u8; HASH_LEN];
    hasher.finalize_xof().fill(&mut out);
    out
}

/// Digests `prefix || body` into a 64-byte hash.
///
/// Used for domain-separated node hashing: the prefix is fed to the hasher
/// directly, without an intermediate concatenation buffer.
pub fn blake3_512_prefixed(prefix: &[u8], body: &[u8]) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(prefix);
    hasher.update(body);
    let mut out = [0u8; HASH_LEN];
    hasher.finalize_xof().fill(&mut out);
    out
}
