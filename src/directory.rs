//! Handle directory.
//!
//! Agents publish a human-readable handle and link it both from their own
//! identity and from the collection root, so the directory can list every
//! handle and each agent's current one. Replacing a handle commits a Mod of
//! the old entry plus a Del+Add bundle on each base; the `handle` link
//! validator only admits those two bundle shapes.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::canonical::content_hash;
use crate::node::Node;
use crate::store::StoreError;
use crate::types::{AgentId, EntryContent, EntryHash, EntryType, GetMask, Link};

/// Tag linking an agent or the collection root to a handle entry.
pub const HANDLE_TAG: &str = "handle";

/// Hash of the anchor entry named `name`.
pub fn anchor_hash(name: &str) -> EntryHash {
    content_hash(EntryType::Anchor.as_str(), name.as_bytes())
}

/// Hash a handle entry with this text would have.
pub fn handle_hash(handle: &str) -> EntryHash {
    content_hash(EntryType::Handle.as_str(), handle.as_bytes())
}

/// One row of the directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleRecord {
    /// Handle text.
    pub handle: String,
    /// Original author of the handle, if known to this node.
    pub agent: Option<AgentId>,
}

/// Publish a first handle for the local agent.
pub fn add_handle(node: &Node, handle: &str) -> Result<EntryHash, StoreError> {
    let key = node.commit(EntryContent::Handle(handle.to_string()))?;
    let me = node.agent().as_hash().clone();
    let directory = node.config().collection_root.clone();

    node.add_link(&me, &key, HANDLE_TAG)?;
    node.add_link(&directory, &key, HANDLE_TAG)?;

    info!(agent = %node.agent().short(), handle = %handle, "handle added");
    Ok(key)
}

/// Replace the local agent's handle, or add one if it has none.
pub fn new_handle(node: &Node, handle: &str) -> Result<EntryHash, StoreError> {
    let me = node.agent().as_hash().clone();
    let Some(old) = node.list_links(&me, HANDLE_TAG).pop() else {
        return add_handle(node, handle);
    };

    let key = node.update(&old, EntryContent::Handle(handle.to_string()))?;
    let directory = node.config().collection_root.clone();
    for base in [me, directory] {
        node.link_bundle(vec![
            Link::del(base.clone(), old.clone(), HANDLE_TAG),
            Link::add(base, key.clone(), HANDLE_TAG),
        ])?;
    }

    info!(agent = %node.agent().short(), handle = %handle, replaces = %old, "handle replaced");
    Ok(key)
}

/// All handles in the directory, sorted by handle text.
///
/// Handles whose content has not reached this node yet are skipped.
pub fn get_handles(node: &Node) -> Result<Vec<HandleRecord>, StoreError> {
    let directory = &node.config().collection_root;
    let mut records = Vec::new();

    for target in node.list_links(directory, HANDLE_TAG) {
        let handle = match load_handle(node, &target) {
            Ok(handle) => handle,
            Err(e) if e.is_transient() => continue,
            Err(e) => return Err(e),
        };
        let agent = get_agent(node, &handle);
        records.push(HandleRecord { handle, agent });
    }

    records.sort_by(|a, b| a.handle.cmp(&b.handle));
    Ok(records)
}

/// The current handle of `agent`: the most recently linked one.
pub fn get_handle(node: &Node, agent: &AgentId) -> Result<Option<String>, StoreError> {
    match node.list_links(agent.as_hash(), HANDLE_TAG).pop() {
        Some(target) => load_handle(node, &target).map(Some),
        None => Ok(None),
    }
}

/// The agent that first published `handle`, from the entry's sources.
pub fn get_agent(node: &Node, handle: &str) -> Option<AgentId> {
    node.get(&handle_hash(handle), GetMask::SOURCES)
        .ok()
        .and_then(|rsp| rsp.sources)
        .and_then(|mut sources| sources.pop())
}

fn load_handle(node: &Node, hash: &EntryHash) -> Result<String, StoreError> {
    match node.get_content(hash)? {
        EntryContent::Handle(text) => Ok(text),
        other => Err(StoreError::Malformed(format!(
            "{hash} is a {} entry, not a handle",
            other.entry_type()
        ))),
    }
}
