//! In-process peer transport.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{
    Envelope, MessageHandler, MessagingError, PeerMessenger, PeerResponse, PeerTransport,
    UnreachableReason,
};
use crate::types::AgentId;

/// Reachability of a registered peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Delivers and replies.
    Online,
    /// Refuses delivery immediately.
    Offline,
    /// Accepts delivery and never replies.
    Silent,
}

struct Peer {
    handler: Arc<dyn MessageHandler>,
    state: PeerState,
}

/// Transport connecting handlers registered in the same process.
#[derive(Default)]
pub struct InMemoryNetwork {
    peers: RwLock<BTreeMap<AgentId, Peer>>,
}

impl InMemoryNetwork {
    /// Create an empty network.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `handler` as `agent`, online.
    pub fn register(&self, agent: AgentId, handler: Arc<dyn MessageHandler>) {
        self.peers.write().insert(
            agent,
            Peer {
                handler,
                state: PeerState::Online,
            },
        );
    }

    /// Change a registered peer's reachability. Unknown peers are ignored.
    pub fn set_state(&self, agent: &AgentId, state: PeerState) {
        if let Some(peer) = self.peers.write().get_mut(agent) {
            peer.state = state;
        }
    }

    /// Messenger sending as `me` over this network.
    pub fn messenger(self: &Arc<Self>, me: AgentId, timeout: Duration) -> PeerMessenger {
        PeerMessenger::new(me, self.clone(), timeout)
    }
}

#[async_trait]
impl PeerTransport for InMemoryNetwork {
    async fn deliver(&self, envelope: Envelope) -> Result<PeerResponse, MessagingError> {
        let (handler, state) = {
            let peers = self.peers.read();
            match peers.get(&envelope.to) {
                Some(peer) => (peer.handler.clone(), peer.state),
                None => {
                    return Err(MessagingError::Unreachable {
                        peer: envelope.to,
                        reason: UnreachableReason::UnknownPeer,
                    })
                }
            }
        };

        match state {
            PeerState::Online => {
                tokio::task::yield_now().await;
                Ok(handler.receive(&envelope.from, envelope.message))
            }
            PeerState::Offline => Err(MessagingError::Unreachable {
                peer: envelope.to,
                reason: UnreachableReason::Offline,
            }),
            PeerState::Silent => std::future::pending().await,
        }
    }
}

impl std::fmt::Debug for InMemoryNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryNetwork")
            .field("peers", &self.peers.read().len())
            .finish()
    }
}
