//! Hash and identity types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::canonical::content_hash;

/// Type tag used when hashing an agent's public key name.
const AGENT_KEY_TAG: &str = "key";

fn hash_pattern() -> &'static regex_lite::Regex {
    static PATTERN: OnceLock<regex_lite::Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        regex_lite::Regex::new(r"^[0-9a-f]{64}$").expect("static hash pattern compiles")
    })
}

/// Content hash of an entry, as 64 lowercase hex characters.
///
/// Implements `Ord` so maps keyed by hash iterate deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryHash(String);

impl EntryHash {
    /// Wrap a hex string. No format check is done here; see [`EntryHash::is_well_formed`].
    pub fn new(hex: String) -> Self {
        Self(hex)
    }

    /// Get the hash as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is a 64-character lowercase hex SHA-256 digest.
    pub fn is_well_formed(&self) -> bool {
        hash_pattern().is_match(&self.0)
    }
}

impl fmt::Display for EntryHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntryHash {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identity of an agent (peer).
///
/// An agent is addressed by the hash of its key, so it can be used directly
/// as the base of a link ("my handles").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(EntryHash);

impl AgentId {
    /// Derive an agent identity from its key name.
    pub fn from_key(key: &str) -> Self {
        Self(content_hash(AGENT_KEY_TAG, key.as_bytes()))
    }

    /// Wrap an existing key hash.
    pub fn from_hash(hash: EntryHash) -> Self {
        Self(hash)
    }

    /// The agent's key hash.
    pub fn as_hash(&self) -> &EntryHash {
        &self.0
    }

    /// Short form for log output.
    pub fn short(&self) -> &str {
        let s = self.0.as_str();
        &s[..s.len().min(8)]
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
