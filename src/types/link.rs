//! Link types for the entry graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::hash::{AgentId, EntryHash};

/// System tag linking a modified entry to its replacement.
pub const REPLACED_BY_TAG: &str = "replacedBy";

/// Whether a link operation adds or tombstones an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LinkAction {
    /// Add the edge.
    Add,
    /// Tombstone a prior Add of the same `(base, target, tag)`.
    Del,
}

impl Default for LinkAction {
    fn default() -> Self {
        Self::Add
    }
}

impl fmt::Display for LinkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Del => write!(f, "del"),
        }
    }
}

/// A tagged, directed link operation from `base` to `target`.
///
/// Implements `Ord` for deterministic ordering: (base, tag, target, action).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    /// Hash the link hangs off.
    pub base: EntryHash,
    /// Hash being linked to.
    pub target: EntryHash,
    /// Tag.
    pub tag: String,
    /// Add or Del.
    #[serde(default)]
    pub action: LinkAction,
}

impl Link {
    /// Create an Add link.
    pub fn add(base: EntryHash, target: EntryHash, tag: impl Into<String>) -> Self {
        Self {
            base,
            target,
            tag: tag.into(),
            action: LinkAction::Add,
        }
    }

    /// Create a Del link.
    pub fn del(base: EntryHash, target: EntryHash, tag: impl Into<String>) -> Self {
        Self {
            base,
            target,
            tag: tag.into(),
            action: LinkAction::Del,
        }
    }
}

impl PartialOrd for Link {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Link {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.base
            .cmp(&other.base)
            .then_with(|| self.tag.cmp(&other.tag))
            .then_with(|| self.target.cmp(&other.target))
            .then_with(|| self.action.cmp(&other.action))
    }
}

/// A set of link operations committed and validated as one unit.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LinkBundle {
    /// Operations in author order.
    pub links: Vec<Link>,
}

impl LinkBundle {
    /// Create a bundle.
    pub fn new(links: Vec<Link>) -> Self {
        Self { links }
    }

    /// The tag shared by every link, if the bundle is non-empty and uniform.
    pub fn tag(&self) -> Option<&str> {
        let first = self.links.first()?;
        self.links
            .iter()
            .all(|l| l.tag == first.tag)
            .then_some(first.tag.as_str())
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether the bundle has no operations.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// Author stamp of a link operation, used as the replay order.
///
/// Orders by `(timestamp, author, seq)`. Every node that observed the same
/// operations sorts them the same way, whatever their arrival order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkStamp {
    /// Author's commit time.
    pub timestamp: DateTime<Utc>,
    /// Author.
    pub author: AgentId,
    /// Position in the author's source chain.
    pub seq: u64,
}
