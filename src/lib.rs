//! # entry-graph-kernel
//!
//! Content-addressed entries, a tagged link graph, per-node validation and a
//! two-party commit-reveal coin toss built on top of them.
//!
//! The kernel answers one question for every write a node observes:
//!
//! > Given this operation and the author's declared history, is it admissible?
//!
//! ## Core Contract
//!
//! 1. Entries are immutable and addressed by the SHA-256 of `(type, payload)`
//! 2. Links are Add/Del events replayed in author-stamp order, so two nodes
//!    that observed the same operations agree on every active set
//! 3. Every node re-runs the same validators on every operation; a rejected
//!    write is never stored
//!
//! ## Architecture
//!
//! ```text
//! CoinToss ──▶ PeerMessenger ──▶ PeerTransport ──▶ TossResponder (peer)
//!     │
//!     ▼
//!   Node ──▶ ValidationPipeline (registry + decision cache)
//!     │            ↓ accept
//!     └──▶ EntryStore + LinkGraph
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Same content → same hash, stored once
//! - Same observed link operations → same active sets and same fingerprint
//! - Same toss record and seeds → same outcome on every node

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod canonical;
pub mod cointoss;
pub mod config;
pub mod directory;
pub mod messaging;
pub mod node;
pub mod store;
pub mod types;
pub mod validation;

// Re-exports
pub use canonical::{content_hash, content_hash_of, fingerprint_bytes, to_canonical_bytes};
pub use cointoss::{CoinToss, Seed, SeedVault, TossError, TossResponder, TossSession, TossState};
pub use config::{ConfigError, NodeConfig};
pub use directory::{HandleRecord, HANDLE_TAG};
pub use messaging::{
    CancelToken, InMemoryNetwork, MessageHandler, MessagingError, PeerMessage, PeerMessenger,
    PeerResponse, PeerTransport,
};
pub use node::{Node, Op};
pub use store::{EntryStore, InMemoryEntryStore, LinkGraph, StoreError};
pub use types::{
    AgentId, Entry, EntryContent, EntryHash, EntryStatus, EntryType, GetMask, GetResponse, Header,
    HeaderAction, Link, LinkAction, LinkBundle, LinkStamp, Toss, TossOutcome,
};
pub use validation::{
    Decision, Package, PackageRequirement, ValidationKey, ValidationPipeline, ValidationRegistry,
    ValidationRejected, ValidationRequest, Validator,
};
