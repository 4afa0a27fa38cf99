//! Link graph: tagged edges between entry hashes.
//!
//! The graph keeps every Add/Del operation it has observed, grouped by
//! `(base, tag, target)`. The active set is derived by replaying each
//! target's operations in [`LinkStamp`] order; the last operation wins.
//!
//! ## Convergence
//!
//! Replay order depends only on the operations, never on arrival order.
//! Two nodes that have observed the same operation set report the same
//! active set and the same [`LinkGraph::fingerprint`]. Until then their views
//! may differ; that is expected, not an error.

use std::collections::BTreeMap;
use std::hash::Hasher;

use parking_lot::RwLock;
use xxhash_rust::xxh64::Xxh64;

use crate::types::{AgentId, EntryHash, LinkAction, LinkBundle, LinkStamp};

/// One observed link operation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct LinkEvent {
    stamp: LinkStamp,
    /// Position inside the committing bundle.
    index: usize,
    action: LinkAction,
}

type TargetEvents = BTreeMap<EntryHash, Vec<LinkEvent>>;

/// Link graph for one node's local view.
#[derive(Debug, Default)]
pub struct LinkGraph {
    /// `(base, tag)` -> target -> events sorted by replay order.
    events: RwLock<BTreeMap<(EntryHash, String), TargetEvents>>,
}

impl LinkGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the operations of a validated bundle.
    ///
    /// Re-applying an already observed bundle is a no-op. Returns the number
    /// of operations that were new.
    pub fn apply(&self, bundle: &LinkBundle, stamp: &LinkStamp) -> usize {
        let mut events = self.events.write();
        let mut applied = 0;

        for (index, link) in bundle.links.iter().enumerate() {
            let event = LinkEvent {
                stamp: stamp.clone(),
                index,
                action: link.action,
            };
            let log = events
                .entry((link.base.clone(), link.tag.clone()))
                .or_default()
                .entry(link.target.clone())
                .or_default();

            if let Err(pos) = log.binary_search(&event) {
                log.insert(pos, event);
                applied += 1;
            }
        }

        applied
    }

    /// Active targets for `(base, tag)`.
    ///
    /// Ordered by the stamp of each target's effective Add, oldest first, so
    /// the last element is the most recently added.
    pub fn list_links(&self, base: &EntryHash, tag: &str) -> Vec<EntryHash> {
        self.list_links_with_sources(base, tag)
            .into_iter()
            .map(|(target, _)| target)
            .collect()
    }

    /// Active targets for `(base, tag)` with the author of their effective Add.
    pub fn list_links_with_sources(&self, base: &EntryHash, tag: &str) -> Vec<(EntryHash, AgentId)> {
        let events = self.events.read();
        let Some(targets) = events.get(&(base.clone(), tag.to_string())) else {
            return Vec::new();
        };

        let mut active: Vec<(&LinkStamp, &EntryHash)> = targets
            .iter()
            .filter_map(|(target, log)| {
                let last = log.last()?;
                (last.action == LinkAction::Add).then_some((&last.stamp, target))
            })
            .collect();
        active.sort();

        active
            .into_iter()
            .map(|(stamp, target)| (target.clone(), stamp.author.clone()))
            .collect()
    }

    /// Whether `target` is currently linked from `base` under `tag`.
    pub fn is_active(&self, base: &EntryHash, target: &EntryHash, tag: &str) -> bool {
        self.events
            .read()
            .get(&(base.clone(), tag.to_string()))
            .and_then(|targets| targets.get(target))
            .and_then(|log| log.last())
            .is_some_and(|event| event.action == LinkAction::Add)
    }

    /// Total number of observed operations.
    pub fn op_count(&self) -> usize {
        self.events
            .read()
            .values()
            .flat_map(|targets| targets.values())
            .map(Vec::len)
            .sum()
    }

    /// Fingerprint of the observed operation set.
    ///
    /// Equal on two nodes exactly when they have observed the same operations.
    pub fn fingerprint(&self) -> String {
        let events = self.events.read();
        let mut hasher = Xxh64::new(0);

        for ((base, tag), targets) in events.iter() {
            for (target, log) in targets {
                for event in log {
                    hasher.write(base.as_str().as_bytes());
                    hasher.write(tag.as_bytes());
                    hasher.write(target.as_str().as_bytes());
                    hasher.write(event.stamp.timestamp.to_rfc3339().as_bytes());
                    hasher.write(event.stamp.author.as_hash().as_str().as_bytes());
                    hasher.write(&event.stamp.seq.to_le_bytes());
                    hasher.write(&(event.index as u64).to_le_bytes());
                    hasher.write(&[event.action as u8]);
                }
            }
        }

        format!("{:016x}", hasher.finish())
    }
}
