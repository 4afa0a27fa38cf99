//! Node configuration.
//!
//! Identity and the collection root are supplied here and passed into the
//! node explicitly; nothing reads them from global state.
//!
//! ## Environment
//!
//! - `NODE_AGENT`: agent key name (required)
//! - `COLLECTION_ROOT`: name of the directory anchor (default: `directory`)
//! - `SEND_TIMEOUT_MS`: peer message timeout (default: 5000)
//! - `DECISION_CACHE_SIZE`: validation decision cache entries, 0 disables (default: 10000)
//! - `STRICT_VALIDATION`: reject writes without a registered validator (default: false)

use std::time::Duration;

use crate::directory::anchor_hash;
use crate::types::{AgentId, EntryHash};

/// Default name of the directory anchor.
pub const DEFAULT_COLLECTION: &str = "directory";

/// Default peer message timeout.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Default decision cache size.
pub const DEFAULT_DECISION_CACHE_SIZE: usize = 10_000;

/// Error loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    /// A variable could not be parsed.
    #[error("invalid value for {name}: {value}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Configuration for one node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Key name the agent identity is derived from.
    pub agent_key: String,
    /// Local agent identity.
    pub agent: AgentId,
    /// Name of the directory anchor.
    pub collection_name: String,
    /// Hash of the directory anchor; base of directory links.
    pub collection_root: EntryHash,
    /// How long `send` waits for a peer.
    pub send_timeout: Duration,
    /// Capacity of the validation decision cache.
    pub decision_cache_size: usize,
    /// Reject writes whose key has no registered validator.
    pub strict_validation: bool,
}

impl NodeConfig {
    /// Default configuration for an agent key.
    pub fn for_agent(agent_key: impl Into<String>) -> Self {
        let agent_key = agent_key.into();
        Self {
            agent: AgentId::from_key(&agent_key),
            agent_key,
            collection_name: DEFAULT_COLLECTION.to_string(),
            collection_root: anchor_hash(DEFAULT_COLLECTION),
            send_timeout: DEFAULT_SEND_TIMEOUT,
            decision_cache_size: DEFAULT_DECISION_CACHE_SIZE,
            strict_validation: false,
        }
    }

    /// Use a different directory anchor.
    pub fn with_collection(mut self, name: impl Into<String>) -> Self {
        self.collection_name = name.into();
        self.collection_root = anchor_hash(&self.collection_name);
        self
    }

    /// Use a different send timeout.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let agent_key = std::env::var("NODE_AGENT").map_err(|_| ConfigError::Missing("NODE_AGENT"))?;
        let mut config = Self::for_agent(agent_key);

        if let Ok(name) = std::env::var("COLLECTION_ROOT") {
            config = config.with_collection(name);
        }
        if let Ok(value) = std::env::var("SEND_TIMEOUT_MS") {
            let ms = parse("SEND_TIMEOUT_MS", &value)?;
            config.send_timeout = Duration::from_millis(ms);
        }
        if let Ok(value) = std::env::var("DECISION_CACHE_SIZE") {
            config.decision_cache_size = parse("DECISION_CACHE_SIZE", &value)?;
        }
        if let Ok(value) = std::env::var("STRICT_VALIDATION") {
            config.strict_validation = parse("STRICT_VALIDATION", &value)?;
        }

        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        value: value.to_string(),
    })
}
