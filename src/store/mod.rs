//! Entry and link storage for one node's local view.

pub mod memory;
pub mod links;

use crate::types::{AgentId, DecodeError, Entry, EntryHash, EntryStatus, GetMask, GetResponse};
use crate::validation::ValidationRejected;

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Hash has never been seen by this node.
    #[error("hash not found: {0}")]
    NotFound(EntryHash),
    /// Hash is referenced but its content has not reached this node yet.
    #[error("hash not yet available on this node: {0}")]
    Unavailable(EntryHash),
    /// The write failed validation and was not stored.
    #[error(transparent)]
    Rejected(#[from] ValidationRejected),
    /// A validation package did not match its request.
    #[error("invalid validation package: {0}")]
    InvalidPackage(String),
    /// A published operation is internally inconsistent.
    #[error("malformed operation: {0}")]
    Malformed(String),
    /// Stored payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    /// Content could not be serialized for hashing.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Trait for entry storage backends.
///
/// Implementations use interior mutability so one store can be shared
/// between a node and its message handlers. Methods never block on I/O;
/// validation reads the store synchronously.
pub trait EntryStore: Send + Sync {
    /// Store an entry, or record another source for an existing one.
    ///
    /// Returns `true` if the content was new to this store.
    fn put(&self, entry: Entry, source: AgentId) -> bool;

    /// Fetch an entry with the fields selected by `mask`.
    fn get(&self, hash: &EntryHash, mask: GetMask) -> Result<GetResponse, StoreError>;

    /// Record that `hash` exists somewhere without having its content.
    fn announce(&self, hash: &EntryHash);

    /// Change the status of a stored entry.
    fn set_status(&self, hash: &EntryHash, status: EntryStatus) -> Result<(), StoreError>;

    /// Whether the content of `hash` is held locally.
    fn contains(&self, hash: &EntryHash) -> bool;

    /// Number of entries held.
    fn len(&self) -> usize;

    /// Whether the store holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub use memory::InMemoryEntryStore;
pub use links::LinkGraph;
