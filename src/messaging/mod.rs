//! Direct request/response messaging between two peers.
//!
//! Messages bypass the shared graph. A [`PeerMessenger`] wraps a
//! [`PeerTransport`] and bounds every send by the configured timeout and a
//! [`CancelToken`]; any failure to get an answer surfaces as
//! [`MessagingError::Unreachable`], never as a default response.

pub mod memory;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::types::{AgentId, EntryHash};

pub use memory::InMemoryNetwork;

/// Request sent to a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PeerMessage {
    /// Start a toss with the sender's seed commitment.
    TossReq {
        /// Sender's seed commitment.
        seed_hash: EntryHash,
    },
    /// Ask a participant to reveal the seed behind `seed_hash`.
    SeedReq {
        /// Commitment to reveal.
        seed_hash: EntryHash,
        /// Toss entry binding the commitment.
        toss: EntryHash,
    },
}

/// Reply from a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PeerResponse {
    /// The responder committed its seed and its copy of the toss.
    TossAccepted {
        /// Responder's seed commitment.
        seed_hash: EntryHash,
        /// Responder's call.
        call: bool,
        /// Hash of the responder's toss entry.
        toss: EntryHash,
    },
    /// Revealed seed plaintext.
    Seed {
        /// Seed in `salt-digit` form.
        plaintext: String,
    },
    /// The peer declined the request.
    Refused,
}

/// Message with routing and correlation metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Correlation id.
    pub id: Uuid,
    /// Sender.
    pub from: AgentId,
    /// Recipient.
    pub to: AgentId,
    /// Send time.
    pub sent_at: DateTime<Utc>,
    /// Payload.
    pub message: PeerMessage,
}

impl Envelope {
    /// Wrap a message with a fresh correlation id.
    pub fn new(from: AgentId, to: AgentId, message: PeerMessage) -> Self {
        Self {
            id: Uuid::new_v4(),
            from,
            to,
            sent_at: Utc::now(),
            message,
        }
    }
}

/// Why a peer could not answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnreachableReason {
    /// The transport does not know the peer.
    UnknownPeer,
    /// The peer is known but not accepting messages.
    Offline,
    /// No reply within the send timeout.
    Timeout,
    /// The caller cancelled the send.
    Cancelled,
}

impl fmt::Display for UnreachableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UnknownPeer => "unknown peer",
            Self::Offline => "offline",
            Self::Timeout => "timed out",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Error type for peer messaging.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MessagingError {
    /// No response could be obtained.
    #[error("peer {peer} unreachable: {reason}")]
    Unreachable {
        /// Intended recipient.
        peer: AgentId,
        /// Cause.
        reason: UnreachableReason,
    },
    /// The peer answered with a response that does not fit the request.
    #[error("unexpected response from {peer}: {response:?}")]
    UnexpectedResponse {
        /// Responding peer.
        peer: AgentId,
        /// What it sent.
        response: PeerResponse,
    },
}

/// Delivers envelopes to peers.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Deliver `envelope` and wait for the recipient's reply.
    ///
    /// May wait forever; callers bound it with a timeout.
    async fn deliver(&self, envelope: Envelope) -> Result<PeerResponse, MessagingError>;
}

/// Receiving side of peer messaging.
///
/// Handlers run synchronously against the local node and must not block.
pub trait MessageHandler: Send + Sync {
    /// Handle a message from `from`.
    fn receive(&self, from: &AgentId, message: PeerMessage) -> PeerResponse;
}

/// Cooperative cancellation shared between a caller and its sends.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    /// Request cancellation. Every clone observes it.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Non-blocking check.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Sends messages on behalf of one agent.
#[derive(Clone)]
pub struct PeerMessenger {
    me: AgentId,
    transport: Arc<dyn PeerTransport>,
    timeout: Duration,
}

impl PeerMessenger {
    /// Create a messenger for `me`.
    pub fn new(me: AgentId, transport: Arc<dyn PeerTransport>, timeout: Duration) -> Self {
        Self { me, transport, timeout }
    }

    /// The sending agent.
    pub fn agent(&self) -> &AgentId {
        &self.me
    }

    /// Send `message` to `to` and wait for the reply.
    pub async fn send(
        &self,
        to: &AgentId,
        message: PeerMessage,
        cancel: &CancelToken,
    ) -> Result<PeerResponse, MessagingError> {
        let unreachable = |reason| MessagingError::Unreachable { peer: to.clone(), reason };
        if cancel.is_cancelled() {
            return Err(unreachable(UnreachableReason::Cancelled));
        }

        let envelope = Envelope::new(self.me.clone(), to.clone(), message);
        let id = envelope.id;
        debug!(id = %id, from = %self.me.short(), to = %to.short(), message = ?envelope.message, "send");

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(unreachable(UnreachableReason::Cancelled)),
            delivered = tokio::time::timeout(self.timeout, self.transport.deliver(envelope)) => {
                delivered.unwrap_or_else(|_| Err(unreachable(UnreachableReason::Timeout)))
            }
        };

        match &result {
            Ok(response) => debug!(id = %id, to = %to.short(), response = ?response, "reply"),
            Err(e) => warn!(id = %id, to = %to.short(), error = %e, "send failed"),
        }
        result
    }
}

impl fmt::Debug for PeerMessenger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerMessenger")
            .field("me", &self.me)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_token_wakes_waiters() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        assert!(!token.is_cancelled());
        token.cancel();
        handle.await.unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_already_cancelled_resolves_immediately() {
        let token = CancelToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .unwrap();
    }

    #[test]
    fn test_message_wire_form() {
        let msg = PeerMessage::TossReq { seed_hash: EntryHash::from("abc") };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "tossReq");
        assert_eq!(json["seed_hash"], "abc");
    }
}
