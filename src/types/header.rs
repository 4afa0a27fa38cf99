//! Source chain headers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entry::EntryType;
use super::hash::{AgentId, EntryHash};
use super::link::LinkStamp;
use crate::canonical::content_hash_of;

/// What a commit did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderAction {
    /// New entry.
    Put,
    /// New entry replacing an older one.
    Mod {
        /// Hash of the entry being replaced.
        replaces: EntryHash,
    },
    /// Deletion marker for an existing entry.
    Del {
        /// Hash of the entry being deleted.
        target: EntryHash,
    },
}

/// Header appended to the author's source chain on every commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Type of the committed entry.
    pub entry_type: EntryType,
    /// Hash of the committed entry.
    pub entry_hash: EntryHash,
    /// Author.
    pub author: AgentId,
    /// Position in the author's chain, starting at 0.
    pub seq: u64,
    /// Hash of the previous header, `None` for the first.
    pub prev: Option<EntryHash>,
    /// Commit time.
    pub timestamp: DateTime<Utc>,
    /// Commit action.
    pub action: HeaderAction,
}

impl Header {
    /// Hash of this header.
    pub fn hash(&self) -> Result<EntryHash, serde_json::Error> {
        content_hash_of("header", self)
    }

    /// Replay stamp for link operations carried by this commit.
    pub fn stamp(&self) -> LinkStamp {
        LinkStamp {
            timestamp: self.timestamp,
            author: self.author.clone(),
            seq: self.seq,
        }
    }
}
