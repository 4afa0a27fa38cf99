//! End-to-end tests for the coin toss protocol over the in-memory transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use entry_graph_kernel::cointoss::commitment_of;
use entry_graph_kernel::messaging::memory::PeerState;
use entry_graph_kernel::messaging::UnreachableReason;
use entry_graph_kernel::{
    AgentId, CancelToken, CoinToss, EntryContent, EntryHash, GetMask, InMemoryNetwork,
    MessageHandler, MessagingError, Node, NodeConfig, PeerMessage, PeerResponse, SeedVault, Toss,
    TossError, TossOutcome, TossResponder, TossSession, TossState,
};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

struct Party {
    node: Arc<Node>,
    vault: Arc<SeedVault>,
    toss: CoinToss,
}

fn party_with_timeout(net: &Arc<InMemoryNetwork>, name: &str, timeout: Duration) -> Party {
    let config = NodeConfig::for_agent(name).with_send_timeout(timeout);
    let node = Arc::new(Node::new(config));
    let vault = Arc::new(SeedVault::new());
    let messenger = net.messenger(node.agent().clone(), timeout);
    let toss = CoinToss::new(node.clone(), vault.clone(), messenger);
    net.register(node.agent().clone(), Arc::new(toss.responder()));
    Party { node, vault, toss }
}

fn party(net: &Arc<InMemoryNetwork>, name: &str) -> Party {
    party_with_timeout(net, name, Duration::from_secs(2))
}

fn toss_record(node: &Node, hash: &EntryHash) -> Toss {
    match node.get_content(hash).unwrap() {
        EntryContent::Toss(toss) => toss,
        other => panic!("expected toss, got {other:?}"),
    }
}

/// Wraps an honest responder and rewrites its replies.
struct Tampering<F> {
    inner: TossResponder,
    rewrite: F,
}

impl<F> MessageHandler for Tampering<F>
where
    F: Fn(PeerResponse) -> PeerResponse + Send + Sync,
{
    fn receive(&self, from: &AgentId, message: PeerMessage) -> PeerResponse {
        (self.rewrite)(self.inner.receive(from, message))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Happy path
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_both_sides_record_identical_toss() {
    let net = InMemoryNetwork::new();
    let alice = party(&net, "alice");
    let bob = party(&net, "bob");

    let session = alice
        .toss
        .request_toss(bob.node.agent(), &CancelToken::new())
        .await
        .unwrap();
    let hash = session.toss.unwrap();

    let a = alice.node.get(&hash, GetMask::ENTRY | GetMask::SOURCES).unwrap();
    let b = bob.node.get(&hash, GetMask::ENTRY | GetMask::SOURCES).unwrap();
    assert_eq!(a.entry.unwrap().payload, b.entry.unwrap().payload);
    assert_eq!(a.sources.unwrap(), vec![alice.node.agent().clone()]);
    assert_eq!(b.sources.unwrap(), vec![bob.node.agent().clone()]);

    let record = toss_record(&alice.node, &hash);
    assert_eq!(&record.initiator, alice.node.agent());
    assert_eq!(&record.responder, bob.node.agent());
}

#[tokio::test]
async fn test_outcome_follows_seed_parity() {
    let net = InMemoryNetwork::new();
    let alice = party(&net, "alice");
    let bob = party(&net, "bob");
    let cancel = CancelToken::new();

    for _ in 0..5 {
        let mut session = alice.toss.request_toss(bob.node.agent(), &cancel).await.unwrap();
        let hash = session.toss.clone().unwrap();
        let record = toss_record(&alice.node, &hash);

        let i = alice.vault.get(&record.initiator_seed_hash).unwrap().digit();
        let r = bob.vault.get(&record.responder_seed_hash).unwrap().digit();
        let expected = record.outcome(u32::from(i), u32::from(r));

        let outcome = alice.toss.confirm_toss(&mut session, &cancel).await.unwrap();
        assert_eq!(outcome, expected);
        assert_eq!(session.state, TossState::Confirmed(expected));

        let mut observer = TossSession::recorded(hash);
        assert_eq!(bob.toss.confirm_toss(&mut observer, &cancel).await.unwrap(), expected);
    }
}

#[test]
fn test_outcome_table() {
    let toss = Toss {
        initiator: AgentId::from_key("alice"),
        initiator_seed_hash: commitment_of("a-4"),
        responder: AgentId::from_key("bob"),
        responder_seed_hash: commitment_of("b-6"),
        call: true,
    };
    assert_eq!(toss.outcome(4, 6), TossOutcome::Win);
    assert_eq!(toss.outcome(4, 7), TossOutcome::Loss);

    let odd_call = Toss { call: false, ..toss };
    assert_eq!(odd_call.outcome(4, 7), TossOutcome::Win);
    assert_eq!(odd_call.outcome(4, 6), TossOutcome::Loss);
}

// ─────────────────────────────────────────────────────────────────────────────
// Refusals and disputes
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_seed_request_for_unknown_commitment_refused() {
    let net = InMemoryNetwork::new();
    let alice = party(&net, "alice");
    let bob = party(&net, "bob");
    let cancel = CancelToken::new();

    let session = alice.toss.request_toss(bob.node.agent(), &cancel).await.unwrap();
    let hash = session.toss.unwrap();

    let carol = net.messenger(AgentId::from_key("carol"), Duration::from_secs(1));
    let rsp = carol
        .send(
            bob.node.agent(),
            PeerMessage::SeedReq {
                seed_hash: commitment_of("not-in-the-toss-5"),
                toss: hash.clone(),
            },
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(rsp, PeerResponse::Refused);

    // a toss bob never recorded
    let rsp = carol
        .send(
            bob.node.agent(),
            PeerMessage::SeedReq {
                seed_hash: toss_record(&alice.node, &hash).responder_seed_hash,
                toss: commitment_of("unknown-toss-1"),
            },
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(rsp, PeerResponse::Refused);
}

#[tokio::test]
async fn test_wrong_seed_reveal_is_disputed() {
    let net = InMemoryNetwork::new();
    let alice = party(&net, "alice");
    let bob = party(&net, "bob");
    let cancel = CancelToken::new();

    let mut session = alice.toss.request_toss(bob.node.agent(), &cancel).await.unwrap();

    // bob now lies about his seed
    net.register(
        bob.node.agent().clone(),
        Arc::new(Tampering {
            inner: bob.toss.responder(),
            rewrite: |rsp: PeerResponse| match rsp {
                PeerResponse::Seed { .. } => PeerResponse::Seed { plaintext: "forged-1".to_string() },
                other => other,
            },
        }),
    );

    let err = alice.toss.confirm_toss(&mut session, &cancel).await.unwrap_err();
    assert!(matches!(err, TossError::CommitmentMismatch { ref peer, .. } if peer == bob.node.agent()));
    assert!(err.is_dispute());
    assert_eq!(session.state, TossState::Disputed);
}

#[tokio::test]
async fn test_disputed_session_stays_disputed() {
    let net = InMemoryNetwork::new();
    let alice = party(&net, "alice");
    let bob = party(&net, "bob");
    let cancel = CancelToken::new();

    let mut session = alice.toss.request_toss(bob.node.agent(), &cancel).await.unwrap();

    // bob forges his first reveal and answers honestly afterwards
    let lied = AtomicBool::new(false);
    net.register(
        bob.node.agent().clone(),
        Arc::new(Tampering {
            inner: bob.toss.responder(),
            rewrite: move |rsp: PeerResponse| match rsp {
                PeerResponse::Seed { .. } if !lied.swap(true, Ordering::SeqCst) => {
                    PeerResponse::Seed { plaintext: "forged-1".to_string() }
                }
                other => other,
            },
        }),
    );

    let err = alice.toss.confirm_toss(&mut session, &cancel).await.unwrap_err();
    assert!(err.is_dispute());
    assert_eq!(session.state, TossState::Disputed);

    let err = alice.toss.confirm_toss(&mut session, &cancel).await.unwrap_err();
    assert!(matches!(err, TossError::Terminal(TossState::Disputed)));
    assert_eq!(session.state, TossState::Disputed);
}

#[tokio::test]
async fn test_confirmed_session_is_not_replayed() {
    let net = InMemoryNetwork::new();
    let alice = party(&net, "alice");
    let bob = party(&net, "bob");
    let cancel = CancelToken::new();

    let mut session = alice.toss.request_toss(bob.node.agent(), &cancel).await.unwrap();
    let outcome = alice.toss.confirm_toss(&mut session, &cancel).await.unwrap();

    let err = alice.toss.confirm_toss(&mut session, &cancel).await.unwrap_err();
    assert!(matches!(err, TossError::Terminal(TossState::Confirmed(o)) if o == outcome));
}

#[tokio::test]
async fn test_pending_seed_not_revealed_through_another_toss() {
    let net = InMemoryNetwork::new();
    let alice = party(&net, "alice");
    let bob = party(&net, "bob");
    let cancel = CancelToken::new();

    let first = alice.toss.request_toss(bob.node.agent(), &cancel).await.unwrap();
    let pending = toss_record(&alice.node, first.toss.as_ref().unwrap()).responder_seed_hash;

    // offering bob's own commitment back as an initiator seed is refused
    let mallory = net.messenger(AgentId::from_key("mallory"), Duration::from_secs(1));
    let rsp = mallory
        .send(bob.node.agent(), PeerMessage::TossReq { seed_hash: pending.clone() }, &cancel)
        .await
        .unwrap();
    assert_eq!(rsp, PeerResponse::Refused);

    // a toss bob holds with the pending commitment outside his own slot
    let carol = Node::new(NodeConfig::for_agent("carol"));
    let forged = carol
        .commit(EntryContent::Toss(Toss {
            initiator: carol.agent().clone(),
            initiator_seed_hash: pending.clone(),
            responder: bob.node.agent().clone(),
            responder_seed_hash: commitment_of("carol-picked-2"),
            call: true,
        }))
        .unwrap();
    for op in carol.published() {
        bob.node.ingest(&op).unwrap();
    }

    let rsp = mallory
        .send(
            bob.node.agent(),
            PeerMessage::SeedReq { seed_hash: pending.clone(), toss: forged },
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(rsp, PeerResponse::Refused);
    assert!(bob.vault.get(&pending).is_some());
}

#[tokio::test]
async fn test_mismatched_toss_hash_detected() {
    let net = InMemoryNetwork::new();
    let alice = party(&net, "alice");
    let bob = party(&net, "bob");

    net.register(
        bob.node.agent().clone(),
        Arc::new(Tampering {
            inner: bob.toss.responder(),
            rewrite: |rsp: PeerResponse| match rsp {
                PeerResponse::TossAccepted { seed_hash, call, .. } => PeerResponse::TossAccepted {
                    seed_hash,
                    call,
                    toss: commitment_of("some-other-toss-0"),
                },
                other => other,
            },
        }),
    );

    let err = alice
        .toss
        .request_toss(bob.node.agent(), &CancelToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TossError::TossMismatch { .. }));
}

// ─────────────────────────────────────────────────────────────────────────────
// Unreachable peers
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_silent_peer_unreachable_within_timeout() {
    let net = InMemoryNetwork::new();
    let alice = party_with_timeout(&net, "alice", Duration::from_millis(100));
    let bob = party(&net, "bob");
    net.set_state(bob.node.agent(), PeerState::Silent);

    let start = Instant::now();
    let err = alice
        .toss
        .request_toss(bob.node.agent(), &CancelToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TossError::Messaging(MessagingError::Unreachable { reason: UnreachableReason::Timeout, .. })
    ));
    assert!(start.elapsed() < Duration::from_secs(2));
    // nothing recorded on the initiator side
    assert_eq!(alice.node.chain_len(), 0);
}

#[tokio::test]
async fn test_offline_peer_during_reveal_leaves_toss_unresolved() {
    let net = InMemoryNetwork::new();
    let alice = party(&net, "alice");
    let bob = party(&net, "bob");
    let cancel = CancelToken::new();

    let mut session = alice.toss.request_toss(bob.node.agent(), &cancel).await.unwrap();
    net.set_state(bob.node.agent(), PeerState::Offline);

    let err = alice.toss.confirm_toss(&mut session, &cancel).await.unwrap_err();
    assert!(matches!(err, TossError::Messaging(MessagingError::Unreachable { .. })));
    assert_eq!(session.state, TossState::RevealRequested);
    assert!(!session.state.is_terminal());

    // once bob is back the same session can still be confirmed
    net.set_state(bob.node.agent(), PeerState::Online);
    let outcome = alice.toss.confirm_toss(&mut session, &cancel).await.unwrap();
    assert_eq!(session.state, TossState::Confirmed(outcome));
}

#[tokio::test]
async fn test_cancelled_request_is_unreachable() {
    let net = InMemoryNetwork::new();
    let alice = party(&net, "alice");
    let bob = party(&net, "bob");
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = alice.toss.request_toss(bob.node.agent(), &cancel).await.unwrap_err();
    assert!(matches!(
        err,
        TossError::Messaging(MessagingError::Unreachable { reason: UnreachableReason::Cancelled, .. })
    ));
}
