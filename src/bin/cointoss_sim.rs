//! Coin Toss Simulation Binary
//!
//! Runs two in-process nodes over the in-memory transport: both publish a
//! handle, replicate their operations to each other, play a number of tosses
//! and confirm each one from both sides.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `NODE_AGENT`: initiator key name (default: alice)
//! - `PEER_AGENT`: responder key name (default: bob)
//! - `TOSSES`: number of tosses to play (default: 3)
//! - `COLLECTION_ROOT`, `SEND_TIMEOUT_MS`, `DECISION_CACHE_SIZE`, `STRICT_VALIDATION`: see `NodeConfig`
//! - `RUST_LOG`: Log level filter (default: info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: pretty)
//!
//! ## Usage
//!
//! ```bash
//! TOSSES=5 LOG_FORMAT=pretty cargo run --bin cointoss_sim
//! ```

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use entry_graph_kernel::directory::{add_handle, get_handles};
use entry_graph_kernel::{
    CancelToken, CoinToss, ConfigError, InMemoryNetwork, Node, NodeConfig, SeedVault, StoreError,
    TossOutcome, TossSession,
};

/// Initialize the tracing subscriber with JSON or pretty format
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cointoss_sim=info,entry_graph_kernel=info".into());

    if log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).flatten_event(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

/// Node config for `agent_key`, taking the other settings from the environment.
fn config_for(agent_key: &str) -> Result<NodeConfig, ConfigError> {
    let env = match NodeConfig::from_env() {
        Ok(env) => env,
        Err(ConfigError::Missing(_)) => return Ok(NodeConfig::for_agent(agent_key)),
        Err(e) => return Err(e),
    };
    let mut config = NodeConfig::for_agent(agent_key)
        .with_collection(env.collection_name)
        .with_send_timeout(env.send_timeout);
    config.decision_cache_size = env.decision_cache_size;
    config.strict_validation = env.strict_validation;
    Ok(config)
}

/// Deliver everything `from` published since the last call to `to`.
fn replicate(from: &Node, to: &Node) -> Result<usize, StoreError> {
    let mut applied = 0;
    for op in from.published() {
        if to.ingest(&op)? {
            applied += 1;
        }
    }
    Ok(applied)
}

struct Player {
    node: Arc<Node>,
    toss: CoinToss,
}

fn player(net: &Arc<InMemoryNetwork>, config: NodeConfig) -> Player {
    let timeout = config.send_timeout;
    let node = Arc::new(Node::new(config));
    let messenger = net.messenger(node.agent().clone(), timeout);
    let toss = CoinToss::new(node.clone(), Arc::new(SeedVault::new()), messenger);
    net.register(node.agent().clone(), Arc::new(toss.responder()));
    Player { node, toss }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let initiator_key = std::env::var("NODE_AGENT").unwrap_or_else(|_| "alice".to_string());
    let responder_key = std::env::var("PEER_AGENT").unwrap_or_else(|_| "bob".to_string());
    let tosses: usize = std::env::var("TOSSES")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        initiator = %initiator_key,
        responder = %responder_key,
        tosses = tosses,
        "Starting coin toss simulation"
    );

    let net = InMemoryNetwork::new();
    let a = player(&net, config_for(&initiator_key)?);
    let b = player(&net, config_for(&responder_key)?);

    for p in [&a, &b] {
        p.node.genesis()?;
        add_handle(&p.node, &p.node.config().agent_key)?;
    }
    replicate(&a.node, &b.node)?;
    replicate(&b.node, &a.node)?;

    for record in get_handles(&a.node)? {
        info!(handle = %record.handle, agent = ?record.agent.map(|id| id.short().to_string()), "directory");
    }

    let cancel = CancelToken::new();
    let mut wins = 0;
    for round in 0..tosses {
        let mut session = match a.toss.request_toss(b.node.agent(), &cancel).await {
            Ok(session) => session,
            Err(e) => {
                error!(round = round, error = %e, "toss request failed");
                continue;
            }
        };
        let Some(hash) = session.toss.clone() else { continue };

        let from_initiator = a.toss.confirm_toss(&mut session, &cancel).await?;
        let mut observer = TossSession::recorded(hash.clone());
        let from_responder = b.toss.confirm_toss(&mut observer, &cancel).await?;

        if from_initiator != from_responder {
            error!(round = round, toss = %hash, "nodes disagree on the outcome");
            return Err("outcome mismatch".into());
        }
        if from_initiator == TossOutcome::Win {
            wins += 1;
        }
        info!(round = round, toss = %hash, outcome = %from_initiator, "toss confirmed");
    }

    replicate(&a.node, &b.node)?;
    replicate(&b.node, &a.node)?;

    info!(
        responder_wins = wins,
        tosses = tosses,
        initiator_fingerprint = %a.node.link_fingerprint(),
        responder_fingerprint = %b.node.link_fingerprint(),
        "Simulation finished"
    );
    Ok(())
}
