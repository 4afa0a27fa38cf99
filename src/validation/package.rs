//! Validation packages: declared context shipped with a write.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::{Entry, EntryContent, EntryHash, EntryType, Header, HeaderAction, LinkAction};

/// Context a validator requires before it can decide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageRequirement {
    /// Nothing beyond the write itself.
    None,
    /// The author's prior headers.
    ChainHeaders,
    /// The author's prior headers and entries, restricted to `types`.
    ChainEntries {
        /// Entry types to include.
        types: Vec<EntryType>,
    },
    /// The author's full prior history.
    FullChain,
}

impl Default for PackageRequirement {
    fn default() -> Self {
        Self::None
    }
}

/// One item of an author's source chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainItem {
    /// Commit header.
    pub header: Header,
    /// Committed entry, if the requirement includes entries.
    pub entry: Option<Entry>,
}

/// Ancillary context built by the author for a specific write.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Package {
    /// Prior chain items, oldest first.
    pub items: Vec<ChainItem>,
}

impl Package {
    /// An empty package.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a package from the author's chain, up to but excluding `before_seq`.
    pub fn build(chain: &[ChainItem], requirement: &PackageRequirement, before_seq: u64) -> Self {
        let prior = chain.iter().filter(|item| item.header.seq < before_seq);

        let items = match requirement {
            PackageRequirement::None => Vec::new(),
            PackageRequirement::ChainHeaders => prior
                .map(|item| ChainItem {
                    header: item.header.clone(),
                    entry: None,
                })
                .collect(),
            PackageRequirement::ChainEntries { types } => prior
                .map(|item| ChainItem {
                    header: item.header.clone(),
                    entry: item
                        .entry
                        .clone()
                        .filter(|_| types.contains(&item.header.entry_type)),
                })
                .collect(),
            PackageRequirement::FullChain => prior.cloned().collect(),
        };

        Self { items }
    }

    /// Check the package is the complete, untampered prior chain of
    /// `header`'s author, as `requirement` demands.
    ///
    /// For any requirement other than `None` the items must be exactly the
    /// author's headers `0..header.seq`, each `prev` pointing at the hash of
    /// the item before it, and the last one being `header.prev`. Every
    /// carried entry must hash to its header's `entry_hash`, and entries the
    /// requirement asks for must be present.
    pub fn verify_for(&self, header: &Header, requirement: &PackageRequirement) -> Result<(), String> {
        for item in &self.items {
            if item.header.author != header.author {
                return Err(format!("item seq {} has a different author", item.header.seq));
            }
            if let Some(entry) = &item.entry {
                if entry.hash != item.header.entry_hash || !entry.verify_hash() {
                    return Err(format!("item seq {} carries a mismatched entry", item.header.seq));
                }
            }
        }

        if *requirement == PackageRequirement::None {
            return Ok(());
        }

        if self.items.len() as u64 != header.seq {
            return Err(format!(
                "expected {} chain items before seq {}, got {}",
                header.seq,
                header.seq,
                self.items.len()
            ));
        }

        let mut prev: Option<EntryHash> = None;
        for (i, item) in self.items.iter().enumerate() {
            let h = &item.header;
            if h.seq != i as u64 {
                return Err(format!("item {} has seq {}", i, h.seq));
            }
            if h.prev != prev {
                return Err(format!("item seq {} breaks the chain", h.seq));
            }
            let wants_entry = match requirement {
                PackageRequirement::ChainEntries { types } => types.contains(&h.entry_type),
                PackageRequirement::FullChain => true,
                _ => false,
            };
            if wants_entry && item.entry.is_none() {
                return Err(format!("item seq {} is missing its entry", h.seq));
            }
            prev = Some(h.hash().map_err(|e| e.to_string())?);
        }

        if header.prev != prev {
            return Err("package does not end at the header's predecessor".to_string());
        }

        Ok(())
    }

    /// Targets the author has linked from `base` under `tag`, replaying the
    /// link bundles carried in this package.
    pub fn authored_links(&self, base: &EntryHash, tag: &str) -> BTreeSet<EntryHash> {
        let mut active = BTreeSet::new();

        let bundles = self
            .items
            .iter()
            .filter(|item| !matches!(item.header.action, HeaderAction::Del { .. }))
            .filter_map(|item| item.entry.as_ref())
            .filter(|entry| entry.entry_type == EntryType::Links)
            .filter_map(|entry| match entry.content() {
                Ok(EntryContent::Links(bundle)) => Some(bundle),
                _ => None,
            });

        for bundle in bundles {
            for link in bundle.links.iter().filter(|l| &l.base == base && l.tag == tag) {
                match link.action {
                    LinkAction::Add => active.insert(link.target.clone()),
                    LinkAction::Del => active.remove(&link.target),
                };
            }
        }

        active
    }
}
