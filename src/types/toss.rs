//! Coin toss record.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::hash::{AgentId, EntryHash};

/// Immutable record binding both seed commitments and the responder's call.
///
/// Written before either plaintext seed is disclosed. Field order is part of
/// the canonical form; do not reorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toss {
    /// Agent that requested the toss.
    pub initiator: AgentId,
    /// Commitment to the initiator's seed.
    pub initiator_seed_hash: EntryHash,
    /// Agent that answered the request.
    pub responder: AgentId,
    /// Commitment to the responder's seed.
    pub responder_seed_hash: EntryHash,
    /// Responder's guess: `true` calls an even sum.
    pub call: bool,
}

impl Toss {
    /// The commitment recorded for `agent`, if it took part.
    pub fn seed_hash_of(&self, agent: &AgentId) -> Option<&EntryHash> {
        if &self.responder == agent {
            Some(&self.responder_seed_hash)
        } else if &self.initiator == agent {
            Some(&self.initiator_seed_hash)
        } else {
            None
        }
    }

    /// Whether `agent` is one of the two participants.
    pub fn is_participant(&self, agent: &AgentId) -> bool {
        &self.initiator == agent || &self.responder == agent
    }

    /// Resolve the outcome from the two revealed seed values.
    ///
    /// The responder wins when the parity of the sum matches the call.
    pub fn outcome(&self, initiator_value: u32, responder_value: u32) -> TossOutcome {
        let even = (initiator_value % 2 + responder_value % 2) % 2 == 0;
        if even == self.call {
            TossOutcome::Win
        } else {
            TossOutcome::Loss
        }
    }
}

/// Outcome of a toss, from the responder's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TossOutcome {
    /// Parity matched the call.
    Win,
    /// Parity did not match the call.
    Loss,
}

impl fmt::Display for TossOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Win => write!(f, "win"),
            Self::Loss => write!(f, "loss"),
        }
    }
}
