//! Validation decision cache.
//!
//! Decisions are deterministic for a given commit, so a node can remember
//! them. A re-delivered write is answered from the cache without running the
//! validator again; a rejected write stays rejected.
//!
//! ## Cache Key Design
//!
//! The key is derived from everything that identifies the commit:
//! - header hash (covers author, seq, entry hash, action)
//! - validation key
//!
//! Any difference in either results in a cache miss and full validation.

use std::hash::Hasher;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::RwLock;
use xxhash_rust::xxh64::Xxh64;

use super::{Decision, ValidationKey};
use crate::types::EntryHash;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct DecisionKey(u64);

impl DecisionKey {
    fn compute(header_hash: &EntryHash, key: &ValidationKey) -> Self {
        let mut hasher = Xxh64::new(0);
        hasher.write(header_hash.as_str().as_bytes());
        hasher.write(key.to_string().as_bytes());
        Self(hasher.finish())
    }
}

/// LRU cache of validation decisions.
///
/// Thread-safe; cloning shares the underlying cache.
#[derive(Clone)]
pub struct DecisionCache {
    cache: Option<Arc<RwLock<LruCache<DecisionKey, Decision>>>>,
}

impl DecisionCache {
    /// Create a cache holding up to `max_entries` decisions. Zero disables it.
    pub fn new(max_entries: usize) -> Self {
        match NonZeroUsize::new(max_entries) {
            Some(size) => Self {
                cache: Some(Arc::new(RwLock::new(LruCache::new(size)))),
            },
            None => Self::disabled(),
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self { cache: None }
    }

    /// Look up a previous decision.
    pub fn get(&self, header_hash: &EntryHash, key: &ValidationKey) -> Option<Decision> {
        let cache = self.cache.as_ref()?;
        let cache_key = DecisionKey::compute(header_hash, key);
        // peek keeps this on the read lock
        cache.read().peek(&cache_key).cloned()
    }

    /// Remember a decision.
    pub fn put(&self, header_hash: &EntryHash, key: &ValidationKey, decision: Decision) {
        if let Some(cache) = &self.cache {
            cache.write().put(DecisionKey::compute(header_hash, key), decision);
        }
    }

    /// Get cache statistics.
    ///
    /// Returns `None` if caching is disabled.
    pub fn stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|cache| {
            let cache = cache.read();
            CacheStats {
                len: cache.len(),
                cap: cache.cap().get(),
            }
        })
    }

    /// Clear the cache.
    pub fn clear(&self) {
        if let Some(cache) = &self.cache {
            cache.write().clear();
        }
    }
}

impl std::fmt::Debug for DecisionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionCache")
            .field("stats", &self.stats())
            .finish()
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    /// Current number of entries in the cache.
    pub len: usize,
    /// Maximum capacity of the cache.
    pub cap: usize,
}
