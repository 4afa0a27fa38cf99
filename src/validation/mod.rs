//! Validation pipeline.
//!
//! Every node that observes a write re-runs the validator registered for the
//! write's entry type or link tag. Validators are pure: given the same
//! request they return the same [`Decision`] on every node, which is what
//! lets independent nodes converge without coordination.
//!
//! ## Flow
//!
//! ```text
//! commit/ingest → ValidationKey → registry lookup → package check
//!                                        ↓
//!                        Validator::validate(request) → Accept | Reject
//!                                        ↓
//!                             DecisionCache (by commit)
//! ```
//!
//! A rejected write is never stored, so there is nothing to roll back.
//! Validators never suspend and never fetch remote data; whatever context
//! they need is declared up front as a [`PackageRequirement`] and shipped
//! with the write.

pub mod package;
pub mod registry;
pub mod cache;
pub mod rules;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{AgentId, EntryContent, EntryHash, EntryType, Header};

pub use package::{ChainItem, Package, PackageRequirement};
pub use registry::{ValidationPipeline, ValidationRegistry};
pub use cache::{CacheStats, DecisionCache};

/// What a validator is registered under.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ValidationKey {
    /// An entry type.
    Entry(EntryType),
    /// A link tag; used for link bundles.
    LinkTag(String),
}

impl fmt::Display for ValidationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entry(t) => write!(f, "entry:{t}"),
            Self::LinkTag(tag) => write!(f, "link:{tag}"),
        }
    }
}

/// Outcome of a validator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Decision {
    /// The write may be stored.
    Accept,
    /// The write must not be stored.
    Reject(String),
}

impl Decision {
    /// Reject with a reason.
    pub fn reject(reason: impl Into<String>) -> Self {
        Self::Reject(reason.into())
    }

    /// Accept if `cond`, else reject with `reason`.
    pub fn require(cond: bool, reason: impl Into<String>) -> Self {
        if cond {
            Self::Accept
        } else {
            Self::Reject(reason.into())
        }
    }

    /// Whether the write was accepted.
    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// A write that failed validation.
///
/// This is a normal negative outcome, not a fault. It is never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("validation rejected {hash} ({key}): {reason}")]
pub struct ValidationRejected {
    /// Key the validator was registered under.
    pub key: ValidationKey,
    /// Hash of the rejected entry.
    pub hash: EntryHash,
    /// Validator's reason.
    pub reason: String,
}

/// The kind of change being validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationAction {
    /// A new entry.
    Put,
    /// A new entry replacing `replaces`.
    Mod {
        /// Entry being replaced.
        replaces: EntryHash,
        /// Sources of the replaced entry on this node, most recent first.
        replaced_sources: Vec<AgentId>,
    },
    /// Deletion of `target`.
    Del {
        /// Entry being deleted.
        target: EntryHash,
        /// Sources of the deleted entry on this node, most recent first.
        target_sources: Vec<AgentId>,
    },
}

/// Everything a validator may look at.
#[derive(Debug, Clone, Copy)]
pub struct ValidationRequest<'a> {
    /// Registry key being validated.
    pub key: &'a ValidationKey,
    /// Typed content of the entry.
    pub content: &'a EntryContent,
    /// Commit header.
    pub header: &'a Header,
    /// Declared ancillary context.
    pub package: &'a Package,
    /// Authoring identities, most recent first.
    pub sources: &'a [AgentId],
    /// Kind of change.
    pub action: &'a ValidationAction,
}

impl ValidationRequest<'_> {
    /// The identity that issued this write.
    pub fn author(&self) -> Option<&AgentId> {
        self.sources.first()
    }
}

/// Validation rule for one entry type or link tag.
///
/// Implementations must be deterministic and side-effect free.
pub trait Validator: Send + Sync {
    /// Context that must accompany every write under this key.
    fn package_requirement(&self) -> PackageRequirement {
        PackageRequirement::None
    }

    /// Decide whether the write is acceptable.
    fn validate(&self, request: &ValidationRequest<'_>) -> Decision;
}

/// Validator that accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Validator for AcceptAll {
    fn validate(&self, _request: &ValidationRequest<'_>) -> Decision {
        Decision::Accept
    }
}
