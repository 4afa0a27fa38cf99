//! In-memory entry store.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;

use super::{EntryStore, StoreError};
use crate::types::{AgentId, Entry, EntryHash, EntryStatus, GetMask, GetResponse};

#[derive(Debug, Clone)]
struct StoredEntry {
    entry: Entry,
    /// Most recent first.
    sources: Vec<AgentId>,
    status: EntryStatus,
}

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<EntryHash, StoredEntry>,
    /// Referenced but not yet received.
    pending: BTreeSet<EntryHash>,
}

/// In-memory entry store.
///
/// Uses BTreeMap/BTreeSet for deterministic iteration order.
#[derive(Debug, Default)]
pub struct InMemoryEntryStore {
    inner: RwLock<Inner>,
}

impl InMemoryEntryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hashes referenced but not yet received.
    pub fn pending(&self) -> Vec<EntryHash> {
        self.inner.read().pending.iter().cloned().collect()
    }

    /// All stored hashes in canonical order.
    pub fn hashes(&self) -> Vec<EntryHash> {
        self.inner.read().entries.keys().cloned().collect()
    }
}

impl EntryStore for InMemoryEntryStore {
    fn put(&self, entry: Entry, source: AgentId) -> bool {
        let mut inner = self.inner.write();
        inner.pending.remove(&entry.hash);

        if let Some(stored) = inner.entries.get_mut(&entry.hash) {
            stored.sources.retain(|s| s != &source);
            stored.sources.insert(0, source);
            return false;
        }

        inner.entries.insert(
            entry.hash.clone(),
            StoredEntry {
                entry,
                sources: vec![source],
                status: EntryStatus::Live,
            },
        );
        true
    }

    fn get(&self, hash: &EntryHash, mask: GetMask) -> Result<GetResponse, StoreError> {
        let inner = self.inner.read();
        let Some(stored) = inner.entries.get(hash) else {
            return Err(if inner.pending.contains(hash) {
                StoreError::Unavailable(hash.clone())
            } else {
                StoreError::NotFound(hash.clone())
            });
        };

        Ok(GetResponse {
            hash: hash.clone(),
            entry: mask
                .contains(GetMask::ENTRY)
                .then(|| stored.entry.clone()),
            entry_type: mask
                .contains(GetMask::ENTRY_TYPE)
                .then_some(stored.entry.entry_type),
            sources: mask
                .contains(GetMask::SOURCES)
                .then(|| stored.sources.clone()),
            status: stored.status.clone(),
        })
    }

    fn announce(&self, hash: &EntryHash) {
        let mut inner = self.inner.write();
        if !inner.entries.contains_key(hash) {
            inner.pending.insert(hash.clone());
        }
    }

    fn set_status(&self, hash: &EntryHash, status: EntryStatus) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let is_pending = inner.pending.contains(hash);
        match inner.entries.get_mut(hash) {
            Some(stored) => {
                stored.status = status;
                Ok(())
            }
            None if is_pending => Err(StoreError::Unavailable(hash.clone())),
            None => Err(StoreError::NotFound(hash.clone())),
        }
    }

    fn contains(&self, hash: &EntryHash) -> bool {
        self.inner.read().entries.contains_key(hash)
    }

    fn len(&self) -> usize {
        self.inner.read().entries.len()
    }
}
