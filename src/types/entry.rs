//! Entry types: immutable, content-addressed records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

use super::hash::{AgentId, EntryHash};
use super::link::LinkBundle;
use super::toss::Toss;
use crate::canonical::{content_hash, to_canonical_bytes};

/// Error decoding a stored payload back into typed content.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// String payload is not valid UTF-8.
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    /// Structured payload is not valid canonical JSON.
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Closed set of entry types known to this application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    /// A human-readable handle for an agent.
    Handle,
    /// A named anchor, used as a well-known link base (e.g. the directory).
    Anchor,
    /// A coin toss record binding both seed commitments and the call.
    Toss,
    /// A bundle of link operations.
    Links,
}

impl EntryType {
    /// Type tag used in content hashes.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Handle => "handle",
            Self::Anchor => "anchor",
            Self::Toss => "toss",
            Self::Links => "links",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed content of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryContent {
    /// Handle text.
    Handle(String),
    /// Anchor name.
    Anchor(String),
    /// Coin toss record.
    Toss(Toss),
    /// Link operations.
    Links(LinkBundle),
}

impl EntryContent {
    /// The entry type of this content.
    pub fn entry_type(&self) -> EntryType {
        match self {
            Self::Handle(_) => EntryType::Handle,
            Self::Anchor(_) => EntryType::Anchor,
            Self::Toss(_) => EntryType::Toss,
            Self::Links(_) => EntryType::Links,
        }
    }

    /// Canonical payload bytes.
    ///
    /// Strings hash as their UTF-8 bytes; structured content as canonical JSON.
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Self::Handle(s) | Self::Anchor(s) => Ok(s.as_bytes().to_vec()),
            Self::Toss(toss) => to_canonical_bytes(toss),
            Self::Links(bundle) => to_canonical_bytes(bundle),
        }
    }

    /// Decode canonical payload bytes for a given type.
    pub fn from_payload(entry_type: EntryType, payload: &[u8]) -> Result<Self, DecodeError> {
        Ok(match entry_type {
            EntryType::Handle => Self::Handle(String::from_utf8(payload.to_vec())?),
            EntryType::Anchor => Self::Anchor(String::from_utf8(payload.to_vec())?),
            EntryType::Toss => Self::Toss(serde_json::from_slice(payload)?),
            EntryType::Links => Self::Links(serde_json::from_slice(payload)?),
        })
    }

    /// Content hash of this content.
    pub fn hash(&self) -> Result<EntryHash, serde_json::Error> {
        Ok(content_hash(self.entry_type().as_str(), &self.to_payload()?))
    }
}

/// A stored entry.
///
/// `author` and `timestamp` describe the first commit this node observed.
/// They are not part of the hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Content hash of `(entry_type, payload)`.
    pub hash: EntryHash,
    /// Entry type.
    pub entry_type: EntryType,
    /// Canonical payload bytes.
    pub payload: Vec<u8>,
    /// Author of the first observed commit.
    pub author: AgentId,
    /// Time of the first observed commit.
    pub timestamp: DateTime<Utc>,
}

impl Entry {
    /// Build an entry from typed content.
    pub fn new(
        content: &EntryContent,
        author: AgentId,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        let entry_type = content.entry_type();
        let payload = content.to_payload()?;
        Ok(Self {
            hash: content_hash(entry_type.as_str(), &payload),
            entry_type,
            payload,
            author,
            timestamp,
        })
    }

    /// Decode the payload into typed content.
    pub fn content(&self) -> Result<EntryContent, DecodeError> {
        EntryContent::from_payload(self.entry_type, &self.payload)
    }

    /// Recompute the content hash and compare with the recorded one.
    pub fn verify_hash(&self) -> bool {
        content_hash(self.entry_type.as_str(), &self.payload) == self.hash
    }
}

/// Lifecycle status of an entry on one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryStatus {
    /// Current version.
    Live,
    /// Superseded; content is still readable.
    Modified {
        /// Hash of the replacing entry.
        replaced_by: EntryHash,
    },
    /// Marked deleted; content is still readable.
    Deleted,
}

/// Field selection for `get`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GetMask(u8);

impl GetMask {
    /// No explicit selection; treated as [`GetMask::ENTRY`].
    pub const DEFAULT: Self = Self(0x00);
    /// Include the entry.
    pub const ENTRY: Self = Self(0x01);
    /// Include the entry type.
    pub const ENTRY_TYPE: Self = Self(0x02);
    /// Include the sources.
    pub const SOURCES: Self = Self(0x04);
    /// Everything.
    pub const ALL: Self = Self(0xFF);

    /// Whether all bits of `other` are set, after applying the default.
    pub fn contains(self, other: Self) -> bool {
        let effective = if self == Self::DEFAULT { Self::ENTRY } else { self };
        effective.0 & other.0 == other.0
    }
}

impl Default for GetMask {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl BitOr for GetMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Response to a `get`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetResponse {
    /// Requested hash.
    pub hash: EntryHash,
    /// Entry, if requested.
    pub entry: Option<Entry>,
    /// Entry type, if requested.
    pub entry_type: Option<EntryType>,
    /// Sources, most recent first, if requested.
    pub sources: Option<Vec<AgentId>>,
    /// Current status on this node.
    pub status: EntryStatus,
}
