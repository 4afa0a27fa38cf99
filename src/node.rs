//! One peer's local view of the shared entry graph.
//!
//! A [`Node`] owns its configuration, its source chain, an entry store, a
//! link graph and a validation pipeline. Every write, local or received from
//! a peer, goes through the same path:
//!
//! ```text
//! Op{entry, header, package} → consistency checks → ValidationPipeline
//!                                                        ↓ accept
//!                                  EntryStore::put + status change + LinkGraph::apply
//! ```
//!
//! Local writes are additionally appended to the source chain and queued in
//! the outbox; [`Node::published`] drains that queue so the host can deliver
//! the operations to other nodes, which apply them with [`Node::ingest`].

use std::collections::BTreeSet;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::NodeConfig;
use crate::store::{EntryStore, InMemoryEntryStore, LinkGraph, StoreError};
use crate::types::{
    AgentId, Entry, EntryContent, EntryHash, EntryStatus, GetMask, GetResponse, Header,
    HeaderAction, Link, LinkBundle, REPLACED_BY_TAG,
};
use crate::validation::{
    ChainItem, DecisionCache, Package, ValidationAction, ValidationKey, ValidationPipeline,
    ValidationRegistry, ValidationRejected, ValidationRequest,
};

/// A published write, as delivered between nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Op {
    /// The entry. For a Del this is the entry being deleted.
    pub entry: Entry,
    /// The author's commit header.
    pub header: Header,
    /// Context declared by the validator for this write.
    pub package: Package,
}

/// Registry key for a piece of content.
///
/// Link bundles validate under their tag; a bundle without a single shared
/// tag has no key and is refused.
pub fn validation_key(content: &EntryContent) -> Result<ValidationKey, String> {
    match content {
        EntryContent::Links(bundle) => bundle
            .tag()
            .map(|tag| ValidationKey::LinkTag(tag.to_string()))
            .ok_or_else(|| "link bundle must be non-empty with a single tag".to_string()),
        other => Ok(ValidationKey::Entry(other.entry_type())),
    }
}

/// A peer's local view.
pub struct Node {
    config: NodeConfig,
    store: InMemoryEntryStore,
    links: LinkGraph,
    pipeline: ValidationPipeline,
    chain: RwLock<Vec<ChainItem>>,
    outbox: Mutex<Vec<Op>>,
    /// Header hashes already applied.
    applied: RwLock<BTreeSet<EntryHash>>,
}

impl Node {
    /// Create a node with this application's validators.
    pub fn new(config: NodeConfig) -> Self {
        let registry = ValidationRegistry::with_defaults(&config);
        Self::with_registry(config, registry)
    }

    /// Create a node with a custom validator registry.
    pub fn with_registry(config: NodeConfig, registry: ValidationRegistry) -> Self {
        let cache = DecisionCache::new(config.decision_cache_size);
        Self {
            config,
            store: InMemoryEntryStore::new(),
            links: LinkGraph::new(),
            pipeline: ValidationPipeline::new(registry, cache),
            chain: RwLock::new(Vec::new()),
            outbox: Mutex::new(Vec::new()),
            applied: RwLock::new(BTreeSet::new()),
        }
    }

    /// Node configuration.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Local agent identity.
    pub fn agent(&self) -> &AgentId {
        &self.config.agent
    }

    /// The entry store.
    pub fn store(&self) -> &InMemoryEntryStore {
        &self.store
    }

    /// The validation pipeline.
    pub fn pipeline(&self) -> &ValidationPipeline {
        &self.pipeline
    }

    /// Commit the collection root anchor. Safe to call more than once.
    pub fn genesis(&self) -> Result<EntryHash, StoreError> {
        self.commit(EntryContent::Anchor(self.config.collection_name.clone()))
    }

    // ── write surface ──────────────────────────────────────────────────

    /// Commit new content. Returns its content hash.
    pub fn commit(&self, content: EntryContent) -> Result<EntryHash, StoreError> {
        self.author(content, HeaderAction::Put)
    }

    /// Commit `content` as the replacement of `old`.
    ///
    /// `old` keeps its content and moves to `Modified`, with a `replacedBy`
    /// link to the new hash.
    pub fn update(&self, old: &EntryHash, content: EntryContent) -> Result<EntryHash, StoreError> {
        self.author(content, HeaderAction::Mod { replaces: old.clone() })
    }

    /// Mark a locally held entry deleted.
    pub fn remove(&self, target: &EntryHash) -> Result<EntryHash, StoreError> {
        let entry = self
            .store
            .get(target, GetMask::ENTRY)?
            .entry
            .ok_or_else(|| StoreError::NotFound(target.clone()))?;
        self.author(entry.content()?, HeaderAction::Del { target: target.clone() })
    }

    /// Add a single link.
    pub fn add_link(&self, base: &EntryHash, target: &EntryHash, tag: &str) -> Result<EntryHash, StoreError> {
        self.link_bundle(vec![Link::add(base.clone(), target.clone(), tag)])
    }

    /// Tombstone a single link.
    pub fn del_link(&self, base: &EntryHash, target: &EntryHash, tag: &str) -> Result<EntryHash, StoreError> {
        self.link_bundle(vec![Link::del(base.clone(), target.clone(), tag)])
    }

    /// Commit several link operations as one validated unit.
    pub fn link_bundle(&self, links: Vec<Link>) -> Result<EntryHash, StoreError> {
        self.commit(EntryContent::Links(LinkBundle::new(links)))
    }

    // ── read surface ───────────────────────────────────────────────────

    /// Fetch an entry.
    pub fn get(&self, hash: &EntryHash, mask: GetMask) -> Result<GetResponse, StoreError> {
        self.store.get(hash, mask)
    }

    /// Fetch and decode the content of an entry.
    pub fn get_content(&self, hash: &EntryHash) -> Result<EntryContent, StoreError> {
        let entry = self
            .store
            .get(hash, GetMask::ENTRY)?
            .entry
            .ok_or_else(|| StoreError::NotFound(hash.clone()))?;
        Ok(entry.content()?)
    }

    /// Active link targets for `(base, tag)`.
    pub fn list_links(&self, base: &EntryHash, tag: &str) -> Vec<EntryHash> {
        self.links.list_links(base, tag)
    }

    /// Active link targets for `(base, tag)` with the author of each Add.
    pub fn list_links_with_sources(&self, base: &EntryHash, tag: &str) -> Vec<(EntryHash, AgentId)> {
        self.links.list_links_with_sources(base, tag)
    }

    /// Fingerprint of the link operations this node has observed.
    pub fn link_fingerprint(&self) -> String {
        self.links.fingerprint()
    }

    /// Length of the local source chain.
    pub fn chain_len(&self) -> usize {
        self.chain.read().len()
    }

    // ── replication ────────────────────────────────────────────────────

    /// Drain operations committed locally since the last call.
    pub fn published(&self) -> Vec<Op> {
        std::mem::take(&mut *self.outbox.lock())
    }

    /// Apply an operation received from a peer, after re-validating it.
    ///
    /// Returns `false` if the operation was already applied. A rejected
    /// operation is not stored and will be refused again if re-delivered.
    pub fn ingest(&self, op: &Op) -> Result<bool, StoreError> {
        let header_hash = op.header.hash()?;
        if self.applied.read().contains(&header_hash) {
            return Ok(false);
        }
        self.apply(op, &header_hash)?;
        debug!(
            node = %self.agent().short(),
            author = %op.header.author.short(),
            hash = %op.entry.hash,
            "ingested op"
        );
        Ok(true)
    }

    fn author(&self, content: EntryContent, action: HeaderAction) -> Result<EntryHash, StoreError> {
        let key = validation_key(&content).map_err(|reason| rejected(&content, reason))?;
        let requirement = self.pipeline.registry().requirement(&key);

        let mut chain = self.chain.write();
        let last = chain.last().map(|item| &item.header);
        let prev = last.map(Header::hash).transpose()?;
        let now = Utc::now();
        let timestamp = last.map_or(now, |h| h.timestamp.max(now));
        let seq = chain.len() as u64;

        let entry = Entry::new(&content, self.agent().clone(), timestamp)?;
        let header = Header {
            entry_type: entry.entry_type,
            entry_hash: entry.hash.clone(),
            author: self.agent().clone(),
            seq,
            prev,
            timestamp,
            action,
        };
        let package = Package::build(&chain, &requirement, seq);
        let op = Op { entry, header, package };

        let header_hash = op.header.hash()?;
        self.apply(&op, &header_hash)?;

        chain.push(ChainItem {
            header: op.header.clone(),
            entry: Some(op.entry.clone()),
        });
        let hash = op.entry.hash.clone();
        self.outbox.lock().push(op);

        info!(
            node = %self.agent().short(),
            entry_type = %content.entry_type(),
            hash = %hash,
            seq = seq,
            "committed"
        );
        Ok(hash)
    }

    fn apply(&self, op: &Op, header_hash: &EntryHash) -> Result<(), StoreError> {
        let Op { entry, header, package } = op;

        if !entry.verify_hash() {
            return Err(StoreError::Malformed(format!("entry {} does not match its content", entry.hash)));
        }
        if header.entry_hash != entry.hash || header.entry_type != entry.entry_type {
            return Err(StoreError::Malformed("header does not describe its entry".to_string()));
        }
        if let HeaderAction::Del { target } = &header.action {
            if target != &entry.hash {
                return Err(StoreError::Malformed("Del must carry the deleted entry".to_string()));
            }
        }

        let content = entry.content()?;
        let key = validation_key(&content).map_err(|reason| rejected(&content, reason))?;
        let action = match &header.action {
            HeaderAction::Put => ValidationAction::Put,
            HeaderAction::Mod { replaces } => ValidationAction::Mod {
                replaces: replaces.clone(),
                replaced_sources: self.sources_of(replaces)?,
            },
            HeaderAction::Del { target } => ValidationAction::Del {
                target: target.clone(),
                target_sources: self.sources_of(target)?,
            },
        };

        let mut sources = vec![header.author.clone()];
        if let Ok(existing) = self.sources_of(&entry.hash) {
            sources.extend(existing.into_iter().filter(|s| s != &header.author));
        }

        let request = ValidationRequest {
            key: &key,
            content: &content,
            header,
            package,
            sources: &sources,
            action: &action,
        };
        self.pipeline.check(header_hash, &entry.hash, &request)?;

        match &header.action {
            HeaderAction::Put => {
                self.store.put(entry.clone(), header.author.clone());
            }
            HeaderAction::Mod { replaces } => {
                self.store.put(entry.clone(), header.author.clone());
                self.store.set_status(
                    replaces,
                    EntryStatus::Modified { replaced_by: entry.hash.clone() },
                )?;
                let replaced_by = LinkBundle::new(vec![Link::add(
                    replaces.clone(),
                    entry.hash.clone(),
                    REPLACED_BY_TAG,
                )]);
                self.links.apply(&replaced_by, &header.stamp());
            }
            HeaderAction::Del { target } => {
                self.store.set_status(target, EntryStatus::Deleted)?;
            }
        }

        // deleting a bundle entry retires the entry, not its link ops
        if let (EntryContent::Links(bundle), HeaderAction::Put | HeaderAction::Mod { .. }) =
            (&content, &header.action)
        {
            for link in &bundle.links {
                self.store.announce(&link.base);
                self.store.announce(&link.target);
            }
            self.links.apply(bundle, &header.stamp());
        }

        self.applied.write().insert(header_hash.clone());
        Ok(())
    }

    fn sources_of(&self, hash: &EntryHash) -> Result<Vec<AgentId>, StoreError> {
        Ok(self
            .store
            .get(hash, GetMask::SOURCES)?
            .sources
            .unwrap_or_default())
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("agent", &self.config.agent)
            .field("entries", &self.store.len())
            .field("chain_len", &self.chain_len())
            .finish()
    }
}

fn rejected(content: &EntryContent, reason: String) -> StoreError {
    let key = ValidationKey::Entry(content.entry_type());
    let hash = content
        .hash()
        .unwrap_or_else(|_| EntryHash::new(String::new()));
    ValidationRejected { key, hash, reason }.into()
}
