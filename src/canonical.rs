//! Canonical serialization for deterministic hashing.
//!
//! Every node must derive the same hash for the same record, so everything
//! that feeds a hash goes through this module.
//!
//! ## Determinism Guarantees
//!
//! - Stable field order: Struct fields serialize in declaration order
//! - Stable Vec order: Vectors serialize in index order
//! - No HashMap allowed: Use BTreeMap for maps in hashed data
//! - String payloads are hashed as their raw UTF-8 bytes, not as JSON strings
//!
//! ## Content Hash
//!
//! ```text
//! content_hash(type, payload) = hex(SHA256(type || 0x00 || payload))
//! ```
//!
//! The type tag is part of the preimage, so a handle and an anchor with the
//! same text never collide.

use serde::Serialize;
use sha2::{Digest, Sha256};
use xxhash_rust::xxh64::xxh64;

use crate::types::EntryHash;

/// Serialize a value to canonical JSON bytes for hashing.
///
/// This function produces deterministic output for the same input,
/// suitable for hash computation and replay verification.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(value)
}

/// Compute the SHA-256 content hash of a typed payload.
pub fn content_hash(type_tag: &str, payload: &[u8]) -> EntryHash {
    let mut hasher = Sha256::new();
    hasher.update(type_tag.as_bytes());
    hasher.update([0u8]);
    hasher.update(payload);
    EntryHash::new(hex::encode(hasher.finalize()))
}

/// Compute the content hash of a serializable payload in canonical JSON form.
pub fn content_hash_of<T: Serialize>(type_tag: &str, value: &T) -> Result<EntryHash, serde_json::Error> {
    Ok(content_hash(type_tag, &to_canonical_bytes(value)?))
}

/// Fast non-cryptographic hash, used for view fingerprints and cache keys.
pub fn fingerprint_bytes(bytes: &[u8]) -> u64 {
    xxh64(bytes, 0)
}
