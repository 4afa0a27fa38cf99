//! Replication tests: nodes that observe the same operations agree.

use entry_graph_kernel::directory::{add_handle, get_handles, new_handle, HANDLE_TAG};
use entry_graph_kernel::{
    Decision, EntryContent, EntryHash, EntryStatus, EntryType, GetMask, Link, Node, NodeConfig, Op,
    PackageRequirement, StoreError, ValidationRegistry, ValidationRequest, Validator,
};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

const AUTHORS: [&str; 3] = ["alice", "bob", "carol"];

fn node(name: &str) -> Node {
    Node::new(NodeConfig::for_agent(name))
}

fn target(i: u8) -> EntryHash {
    EntryContent::Anchor(format!("target-{i}")).hash().unwrap()
}

fn base() -> EntryHash {
    EntryContent::Anchor("board".to_string()).hash().unwrap()
}

/// Run a script of single-link "follow" bundles and return the published ops.
fn script_ops(script: &[(usize, u8, bool)]) -> Vec<Op> {
    let authors: Vec<Node> = AUTHORS.iter().map(|a| node(a)).collect();
    for &(author, t, add) in script {
        let n = &authors[author % AUTHORS.len()];
        let link = if add {
            Link::add(base(), target(t), "follow")
        } else {
            Link::del(base(), target(t), "follow")
        };
        n.link_bundle(vec![link]).unwrap();
    }
    authors.iter().flat_map(|n| n.published()).collect()
}

fn observe(ops: &[Op]) -> Node {
    let observer = node("observer");
    for op in ops {
        observer.ingest(op).unwrap();
    }
    observer
}

// ─────────────────────────────────────────────────────────────────────────────
// Link replay
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_add_then_del_excludes_target() {
    let ops = script_ops(&[(0, 1, true), (0, 1, false)]);
    let observer = observe(&ops);
    assert!(observer.list_links(&base(), "follow").is_empty());
}

#[test]
fn test_del_observed_before_add_converges() {
    let ops = script_ops(&[(0, 1, true), (0, 1, false)]);
    let reversed: Vec<Op> = ops.iter().rev().cloned().collect();

    let observer = node("observer");
    observer.ingest(&reversed[0]).unwrap();
    // tombstone only
    assert!(observer.list_links(&base(), "follow").is_empty());
    observer.ingest(&reversed[1]).unwrap();
    assert!(observer.list_links(&base(), "follow").is_empty());

    assert_eq!(observer.link_fingerprint(), observe(&ops).link_fingerprint());
}

#[test]
fn test_links_from_several_authors_merge() {
    let ops = script_ops(&[(0, 1, true), (1, 2, true), (2, 3, true), (1, 2, false)]);
    let observer = observe(&ops);
    let mut active = observer.list_links(&base(), "follow");
    active.sort();
    let mut expected = vec![target(1), target(3)];
    expected.sort();
    assert_eq!(active, expected);
}

proptest! {
    /// Same operation set, any arrival order: same active set and fingerprint.
    #[test]
    fn prop_arrival_order_does_not_matter(
        script in prop::collection::vec((0usize..3, 0u8..4, any::<bool>()), 1..24),
        seed in any::<u64>(),
    ) {
        let ops = script_ops(&script);
        let mut shuffled = ops.clone();
        shuffled.shuffle(&mut StdRng::seed_from_u64(seed));

        let a = observe(&ops);
        let b = observe(&shuffled);
        prop_assert_eq!(a.link_fingerprint(), b.link_fingerprint());
        prop_assert_eq!(a.list_links(&base(), "follow"), b.list_links(&base(), "follow"));
    }

    /// Committing the same content twice yields one hash and one stored entry.
    #[test]
    fn prop_commit_is_content_addressed(handle in "[a-z][a-z0-9_]{0,30}") {
        let n = node("alice");
        let first = n.commit(EntryContent::Handle(handle.clone())).unwrap();
        let second = n.commit(EntryContent::Handle(handle.clone())).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(n.store().hashes(), vec![first.clone()]);

        let other = node("bob");
        prop_assert_eq!(other.commit(EntryContent::Handle(handle)).unwrap(), first);
    }

    /// Re-delivering operations never changes a node's view.
    #[test]
    fn prop_ingest_is_idempotent(
        script in prop::collection::vec((0usize..3, 0u8..4, any::<bool>()), 1..12),
    ) {
        let ops = script_ops(&script);
        let observer = observe(&ops);
        let before = observer.link_fingerprint();
        for op in &ops {
            prop_assert!(!observer.ingest(op).unwrap());
        }
        prop_assert_eq!(observer.link_fingerprint(), before);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Rejected writes
// ─────────────────────────────────────────────────────────────────────────────

/// Accepts any handle link but ships the same package honest nodes expect.
struct AnyHandleLink;

impl Validator for AnyHandleLink {
    fn package_requirement(&self) -> PackageRequirement {
        PackageRequirement::ChainEntries { types: vec![EntryType::Links] }
    }

    fn validate(&self, _request: &ValidationRequest<'_>) -> Decision {
        Decision::Accept
    }
}

/// A node that forges handle links honest nodes refuse.
fn permissive(name: &str) -> Node {
    let config = NodeConfig::for_agent(name);
    let mut registry = ValidationRegistry::with_defaults(&config);
    registry.register_tag(HANDLE_TAG, AnyHandleLink);
    Node::with_registry(config, registry)
}

#[test]
fn test_forged_handle_link_rejected_by_honest_node() {
    let alice = node("alice");
    let mallory = permissive("mallory");

    let fake = mallory.commit(EntryContent::Handle("alice-is-mallory".into())).unwrap();
    // link on alice's identity, which only alice may write
    mallory
        .add_link(alice.agent().as_hash(), &fake, HANDLE_TAG)
        .unwrap();

    let ops = mallory.published();
    alice.ingest(&ops[0]).unwrap();
    let err = alice.ingest(&ops[1]).unwrap_err();
    assert!(matches!(err, StoreError::Rejected(ref r) if r.hash == ops[1].entry.hash));

    assert!(alice.list_links(alice.agent().as_hash(), HANDLE_TAG).is_empty());
    assert!(matches!(
        alice.get(&ops[1].entry.hash, GetMask::ENTRY),
        Err(StoreError::NotFound(_))
    ));

    // re-delivery is refused again, from the decision cache
    let cached = |n: &Node| n.pipeline().cache().stats().map(|s| s.len);
    let before = cached(&alice);
    assert!(matches!(alice.ingest(&ops[1]), Err(StoreError::Rejected(_))));
    assert_eq!(cached(&alice), before);
}

#[test]
fn test_local_rejection_leaves_no_trace() {
    let alice = node("alice");
    let bob = node("bob");
    let err = bob
        .add_link(alice.agent().as_hash(), &target(1), HANDLE_TAG)
        .unwrap_err();
    assert!(matches!(err, StoreError::Rejected(_)));
    assert!(bob.published().is_empty());
    assert_eq!(bob.chain_len(), 0);
    assert!(bob.list_links(alice.agent().as_hash(), HANDLE_TAG).is_empty());
}

#[test]
fn test_truncated_package_is_invalid() {
    let alice = node("alice");
    let bob = node("bob");
    add_handle(&alice, "al").unwrap();

    let mut ops = alice.published();
    // the link op on alice's identity carries her chain; drop part of it
    let link_op = &mut ops[1];
    link_op.package.items.clear();
    bob.ingest(&ops[0]).unwrap();
    assert!(matches!(bob.ingest(&ops[1]), Err(StoreError::InvalidPackage(_))));
}

// ─────────────────────────────────────────────────────────────────────────────
// Directory replication
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_handle_replacement_replicates() {
    let alice = node("alice");
    let bob = node("bob");
    alice.genesis().unwrap();
    let old = add_handle(&alice, "al").unwrap();
    let new = new_handle(&alice, "alice").unwrap();

    for op in alice.published() {
        bob.ingest(&op).unwrap();
    }

    let listed = get_handles(&bob).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].handle, "alice");
    assert_eq!(listed[0].agent.as_ref(), Some(alice.agent()));

    let rsp = bob.get(&old, GetMask::ENTRY).unwrap();
    assert_eq!(rsp.status, EntryStatus::Modified { replaced_by: new });
    assert_eq!(bob.link_fingerprint(), alice.link_fingerprint());
}
