//! Core types for the entry graph.

pub mod hash;
pub mod entry;
pub mod header;
pub mod link;
pub mod toss;

pub use hash::{AgentId, EntryHash};
pub use entry::{DecodeError, Entry, EntryContent, EntryStatus, EntryType, GetMask, GetResponse};
pub use header::{Header, HeaderAction};
pub use link::{Link, LinkAction, LinkBundle, LinkStamp, REPLACED_BY_TAG};
pub use toss::{Toss, TossOutcome};
