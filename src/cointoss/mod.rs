//! Two-party commit-reveal coin toss.
//!
//! ## Protocol
//!
//! ```text
//! initiator                                   responder
//!   seed_I → vault, H_I
//!   TossReq{H_I}  ───────────────────────────▶
//!                                             seed_R → vault, H_R, random call
//!                                             commit Toss{I, H_I, R, H_R, call}
//!             ◀─────────────────────────────  TossAccepted{H_R, call, toss}
//!   commit Toss{I, H_I, R, H_R, call}
//!   (hash must equal `toss`)
//!
//! anyone holding the toss
//!   SeedReq{H_x, toss} ──▶ participant x ──▶ Seed{plaintext} | Refused
//!   commitment(plaintext) == H_x, else Disputed
//!   (digit_I + digit_R) even == call  →  responder Win, else Loss
//! ```
//!
//! Neither side learns the other's digit before both commitments and the
//! call are bound in a public Toss entry. Plaintexts stay in each agent's
//! [`SeedVault`] and are released only for a toss the holder itself has
//! recorded.

pub mod seed;

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::messaging::{CancelToken, MessageHandler, MessagingError, PeerMessage, PeerMessenger, PeerResponse};
use crate::node::Node;
use crate::store::StoreError;
use crate::types::{AgentId, EntryContent, EntryHash, Toss, TossOutcome};

pub use seed::{commitment_of, Seed, SeedError, SeedVault};

/// Error type for coin toss operations.
#[derive(Debug, thiserror::Error)]
pub enum TossError {
    /// Local store or validation failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The peer could not be reached.
    #[error(transparent)]
    Messaging(#[from] MessagingError),
    /// The two copies of the toss entry differ.
    #[error("toss mismatch: responder recorded {expected}, initiator recorded {actual}")]
    TossMismatch {
        /// Hash reported by the responder.
        expected: EntryHash,
        /// Hash of the initiator's copy.
        actual: EntryHash,
    },
    /// The peer declined to reveal or to take part.
    #[error("peer {peer} refused")]
    Refused {
        /// Refusing peer.
        peer: AgentId,
    },
    /// A revealed seed does not match its commitment.
    #[error("seed revealed by {peer} does not match commitment {seed_hash}")]
    CommitmentMismatch {
        /// Revealing peer.
        peer: AgentId,
        /// Commitment recorded in the toss.
        seed_hash: EntryHash,
    },
    /// A revealed seed matches its commitment but is not a valid seed.
    #[error("seed revealed by {peer} is malformed")]
    MalformedSeed {
        /// Revealing peer.
        peer: AgentId,
    },
    /// The hash names an entry of another type.
    #[error("{0} is not a toss entry")]
    NotATossEntry(EntryHash),
    /// The agent is not one of the toss participants.
    #[error("agent {0} is not a toss participant")]
    NotParticipant(AgentId),
    /// The session already reached a final state.
    #[error("toss session is already {0}")]
    Terminal(TossState),
}

impl TossError {
    /// Whether this error ends the instance as disputed.
    pub fn is_dispute(&self) -> bool {
        matches!(self, Self::CommitmentMismatch { .. } | Self::MalformedSeed { .. })
    }
}

/// Where one toss instance stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TossState {
    /// Nothing done yet.
    Idle,
    /// The local seed is in the vault.
    SeedCommitted {
        /// Local commitment.
        seed_hash: EntryHash,
    },
    /// `TossReq` sent, waiting for the responder.
    AwaitingPeerCommitment,
    /// Both copies of the toss entry agree.
    TossRecorded,
    /// Seeds requested from the participants.
    RevealRequested,
    /// Both seeds verified.
    Confirmed(TossOutcome),
    /// A participant revealed a seed that does not verify.
    Disputed,
}

impl TossState {
    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed(_) | Self::Disputed)
    }
}

impl fmt::Display for TossState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::SeedCommitted { .. } => f.write_str("seed_committed"),
            Self::AwaitingPeerCommitment => f.write_str("awaiting_peer_commitment"),
            Self::TossRecorded => f.write_str("toss_recorded"),
            Self::RevealRequested => f.write_str("reveal_requested"),
            Self::Confirmed(outcome) => write!(f, "confirmed({outcome})"),
            Self::Disputed => f.write_str("disputed"),
        }
    }
}

/// One toss instance as seen by the local agent.
#[derive(Debug, Clone)]
pub struct TossSession {
    /// Local correlation id for logs.
    pub id: Uuid,
    /// Current state.
    pub state: TossState,
    /// The toss entry, once recorded.
    pub toss: Option<EntryHash>,
}

impl TossSession {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: TossState::Idle,
            toss: None,
        }
    }

    /// Session for a toss recorded elsewhere, ready to be confirmed.
    pub fn recorded(toss: EntryHash) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: TossState::TossRecorded,
            toss: Some(toss),
        }
    }

    fn advance(&mut self, next: TossState) {
        info!(session = %self.id, from = %self.state, to = %next, "toss state");
        self.state = next;
    }
}

/// Answers peer messages for one agent: accepts toss requests and reveals
/// seeds for tosses the agent has recorded.
#[derive(Debug, Clone)]
pub struct TossResponder {
    node: Arc<Node>,
    vault: Arc<SeedVault>,
}

impl TossResponder {
    /// Create a responder over the agent's node and vault.
    pub fn new(node: Arc<Node>, vault: Arc<SeedVault>) -> Self {
        Self { node, vault }
    }

    fn accept(&self, from: &AgentId, initiator_seed_hash: EntryHash) -> Result<PeerResponse, TossError> {
        // a commitment of ours offered back as the initiator's
        if self.vault.get(&initiator_seed_hash).is_some() {
            return Err(TossError::Refused { peer: self.node.agent().clone() });
        }
        let seed_hash = self.vault.generate();
        let call = rand::random::<bool>();
        let toss = Toss {
            initiator: from.clone(),
            initiator_seed_hash,
            responder: self.node.agent().clone(),
            responder_seed_hash: seed_hash.clone(),
            call,
        };
        let toss = self.node.commit(EntryContent::Toss(toss))?;
        info!(agent = %self.node.agent().short(), initiator = %from.short(), toss = %toss, "toss accepted");
        Ok(PeerResponse::TossAccepted { seed_hash, call, toss })
    }

    /// Reveal the seed behind `seed_hash` for the recorded toss `toss`.
    ///
    /// Only answers when this agent holds the toss, is one of its
    /// participants, the hash is the commitment in this agent's own slot and
    /// the vault holds the seed.
    pub fn reveal(&self, seed_hash: &EntryHash, toss: &EntryHash) -> Result<Seed, TossError> {
        let me = self.node.agent();
        let EntryContent::Toss(record) = self.node.get_content(toss)? else {
            return Err(TossError::NotATossEntry(toss.clone()));
        };
        let Some(own) = record.seed_hash_of(me) else {
            return Err(TossError::NotParticipant(me.clone()));
        };
        if own != seed_hash {
            return Err(TossError::Refused { peer: me.clone() });
        }
        self.vault
            .get(seed_hash)
            .ok_or_else(|| TossError::Refused { peer: me.clone() })
    }
}

impl MessageHandler for TossResponder {
    fn receive(&self, from: &AgentId, message: PeerMessage) -> PeerResponse {
        let result = match message {
            PeerMessage::TossReq { seed_hash } => self.accept(from, seed_hash),
            PeerMessage::SeedReq { seed_hash, toss } => self
                .reveal(&seed_hash, &toss)
                .map(|seed| PeerResponse::Seed { plaintext: seed.to_string() }),
        };
        result.unwrap_or_else(|e| {
            warn!(agent = %self.node.agent().short(), from = %from.short(), error = %e, "request refused");
            PeerResponse::Refused
        })
    }
}

/// Drives toss instances for one agent.
#[derive(Debug, Clone)]
pub struct CoinToss {
    responder: TossResponder,
    messenger: PeerMessenger,
}

impl CoinToss {
    /// Create a driver. The messenger must send as the node's agent.
    pub fn new(node: Arc<Node>, vault: Arc<SeedVault>, messenger: PeerMessenger) -> Self {
        Self {
            responder: TossResponder::new(node, vault),
            messenger,
        }
    }

    /// Handler to register with the transport for this agent.
    pub fn responder(&self) -> TossResponder {
        self.responder.clone()
    }

    fn node(&self) -> &Node {
        &self.responder.node
    }

    /// Ask `peer` for a toss and record it. Returns the session in
    /// [`TossState::TossRecorded`].
    pub async fn request_toss(&self, peer: &AgentId, cancel: &CancelToken) -> Result<TossSession, TossError> {
        let me = self.node().agent().clone();
        if peer == &me {
            return Err(TossError::NotParticipant(me));
        }
        let mut session = TossSession::new();

        let seed_hash = self.responder.vault.generate();
        session.advance(TossState::SeedCommitted { seed_hash: seed_hash.clone() });

        session.advance(TossState::AwaitingPeerCommitment);
        let request = PeerMessage::TossReq { seed_hash: seed_hash.clone() };
        let (responder_seed_hash, call, expected) = match self.messenger.send(peer, request, cancel).await? {
            PeerResponse::TossAccepted { seed_hash, call, toss } => (seed_hash, call, toss),
            PeerResponse::Refused => return Err(TossError::Refused { peer: peer.clone() }),
            response => {
                return Err(MessagingError::UnexpectedResponse { peer: peer.clone(), response }.into())
            }
        };

        let toss = Toss {
            initiator: me,
            initiator_seed_hash: seed_hash,
            responder: peer.clone(),
            responder_seed_hash,
            call,
        };
        let actual = self.node().commit(EntryContent::Toss(toss))?;
        if actual != expected {
            warn!(session = %session.id, expected = %expected, actual = %actual, "toss mismatch");
            return Err(TossError::TossMismatch { expected, actual });
        }

        session.toss = Some(actual);
        session.advance(TossState::TossRecorded);
        Ok(session)
    }

    /// Collect both seeds for the session's toss and compute the outcome.
    ///
    /// A seed that fails verification moves the session to
    /// [`TossState::Disputed`]. Unreachable or refusing participants leave it
    /// in [`TossState::RevealRequested`]. A session that is already confirmed
    /// or disputed is left as is.
    pub async fn confirm_toss(
        &self,
        session: &mut TossSession,
        cancel: &CancelToken,
    ) -> Result<TossOutcome, TossError> {
        if session.state.is_terminal() {
            return Err(TossError::Terminal(session.state.clone()));
        }
        let hash = match &session.toss {
            Some(hash) => hash.clone(),
            None => return Err(StoreError::Malformed("session has no recorded toss".to_string()).into()),
        };
        let EntryContent::Toss(toss) = self.node().get_content(&hash)? else {
            return Err(TossError::NotATossEntry(hash));
        };

        session.advance(TossState::RevealRequested);
        let revealed = async {
            let i = self.collect(&toss.initiator, &toss.initiator_seed_hash, &hash, cancel).await?;
            let r = self.collect(&toss.responder, &toss.responder_seed_hash, &hash, cancel).await?;
            Ok::<_, TossError>((i, r))
        }
        .await;

        let (i, r) = match revealed {
            Ok(seeds) => seeds,
            Err(e) => {
                if e.is_dispute() {
                    warn!(session = %session.id, toss = %hash, error = %e, "toss disputed");
                    session.advance(TossState::Disputed);
                }
                return Err(e);
            }
        };

        let outcome = toss.outcome(u32::from(i.digit()), u32::from(r.digit()));
        info!(
            session = %session.id,
            toss = %hash,
            call = toss.call,
            sum = u32::from(i.digit()) + u32::from(r.digit()),
            outcome = %outcome,
            "responder outcome"
        );
        session.advance(TossState::Confirmed(outcome));
        Ok(outcome)
    }

    /// Obtain and verify one participant's seed.
    async fn collect(
        &self,
        peer: &AgentId,
        seed_hash: &EntryHash,
        toss: &EntryHash,
        cancel: &CancelToken,
    ) -> Result<Seed, TossError> {
        let plaintext = if peer == self.node().agent() {
            self.responder.reveal(seed_hash, toss)?.to_string()
        } else {
            let request = PeerMessage::SeedReq {
                seed_hash: seed_hash.clone(),
                toss: toss.clone(),
            };
            match self.messenger.send(peer, request, cancel).await? {
                PeerResponse::Seed { plaintext } => plaintext,
                PeerResponse::Refused => return Err(TossError::Refused { peer: peer.clone() }),
                response => {
                    return Err(MessagingError::UnexpectedResponse { peer: peer.clone(), response }.into())
                }
            }
        };

        if &commitment_of(&plaintext) != seed_hash {
            return Err(TossError::CommitmentMismatch {
                peer: peer.clone(),
                seed_hash: seed_hash.clone(),
            });
        }
        Seed::parse(&plaintext).map_err(|_| TossError::MalformedSeed { peer: peer.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::messaging::InMemoryNetwork;
    use std::time::Duration;

    struct Party {
        node: Arc<Node>,
        vault: Arc<SeedVault>,
        toss: CoinToss,
    }

    fn party(net: &Arc<InMemoryNetwork>, name: &str) -> Party {
        let node = Arc::new(Node::new(NodeConfig::for_agent(name)));
        let vault = Arc::new(SeedVault::new());
        let messenger = net.messenger(node.agent().clone(), Duration::from_secs(1));
        let toss = CoinToss::new(node.clone(), vault.clone(), messenger);
        net.register(node.agent().clone(), Arc::new(toss.responder()));
        Party { node, vault, toss }
    }

    #[tokio::test]
    async fn test_full_toss_confirms_on_both_sides() {
        let net = InMemoryNetwork::new();
        let alice = party(&net, "alice");
        let bob = party(&net, "bob");
        let cancel = CancelToken::new();

        let mut session = alice.toss.request_toss(bob.node.agent(), &cancel).await.unwrap();
        assert_eq!(session.state, TossState::TossRecorded);
        let hash = session.toss.clone().unwrap();

        // bob recorded the same entry
        assert!(bob.node.get(&hash, crate::types::GetMask::ENTRY).is_ok());
        assert_eq!(alice.vault.len(), 1);
        assert_eq!(bob.vault.len(), 1);

        let a = alice.toss.confirm_toss(&mut session, &cancel).await.unwrap();
        let mut bob_view = TossSession::recorded(hash);
        let b = bob.toss.confirm_toss(&mut bob_view, &cancel).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(session.state, TossState::Confirmed(a));
    }

    #[tokio::test]
    async fn test_reveal_refuses_foreign_commitment() {
        let net = InMemoryNetwork::new();
        let alice = party(&net, "alice");
        let bob = party(&net, "bob");
        let cancel = CancelToken::new();

        let session = alice.toss.request_toss(bob.node.agent(), &cancel).await.unwrap();
        let hash = session.toss.unwrap();

        let stranger = commitment_of("stranger-3");
        let err = bob.toss.responder().reveal(&stranger, &hash).unwrap_err();
        assert!(matches!(err, TossError::Refused { .. }));

        // alice's commitment is in the toss, but bob's vault does not hold it
        let EntryContent::Toss(t) = bob.node.get_content(&hash).unwrap() else { panic!() };
        let err = bob.toss.responder().reveal(&t.initiator_seed_hash, &hash).unwrap_err();
        assert!(matches!(err, TossError::Refused { .. }));
    }

    #[tokio::test]
    async fn test_reveal_requires_toss_entry() {
        let net = InMemoryNetwork::new();
        let bob = party(&net, "bob");
        let handle = bob.node.commit(EntryContent::Handle("bob".into())).unwrap();
        let h = bob.vault.generate();
        let err = bob.toss.responder().reveal(&h, &handle).unwrap_err();
        assert!(matches!(err, TossError::NotATossEntry(_)));
    }

    #[tokio::test]
    async fn test_toss_with_self_rejected() {
        let net = InMemoryNetwork::new();
        let alice = party(&net, "alice");
        let err = alice
            .toss
            .request_toss(alice.node.agent(), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TossError::NotParticipant(_)));
    }
}
