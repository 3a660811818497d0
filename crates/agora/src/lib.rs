//! Agora - multi-agent decision orchestration
//!
//! Registers a pool of decision-making agents, collects their decisions under a
//! deadline, routes prioritized messages between them and keeps a bounded,
//! normalized weight vector up to date from their realized returns.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use agora::agents::{Agent, AgentManager, StaticAgent};
//! use agora::comms::CommunicationHub;
//! use agora::models::config::AgoraConfig;
//! use agora::models::{MarketInput, Message};
//! use agora::weights::WeightAdjuster;
//! ```

pub use agora_agents as agents;
pub use agora_comms as comms;
pub use agora_models as models;
pub use agora_weights as weights;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use agora_agents::{AgentManager, StaticAgent};
use agora_models::config::AgoraConfig;
use agora_models::{Decision, MarketInput};
use anyhow::Context;
use serde::Serialize;
use tracing::info;

/// Read and validate a TOML config file.
pub fn load_config(path: impl AsRef<Path>) -> Result<AgoraConfig, anyhow::Error> {
    let path = path.as_ref();
    let config_str = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let config: AgoraConfig =
        toml::from_str(&config_str).with_context(|| "Failed to parse config")?;
    config.validate().context("Invalid config")?;
    Ok(config)
}

/// Build a manager from configuration and register the configured static agents.
pub fn build_manager(config: &AgoraConfig) -> Result<AgentManager, anyhow::Error> {
    let manager = AgentManager::new(config).context("Failed to build agent manager")?;

    for agent_config in &config.agents {
        let agent = Arc::new(StaticAgent::from_config(agent_config));
        manager
            .register_agent(agent, agent_config.weight, agent_config.auto_start)
            .with_context(|| format!("Failed to register agent {}", agent_config.id))?;
    }

    info!(agents = config.agents.len(), "Agents registered from config");
    Ok(manager)
}

/// Result of one collection round.
#[derive(Debug, Clone, Serialize)]
pub struct RoundReport {
    pub round: usize,
    pub decisions: Vec<Decision>,
    pub weights: BTreeMap<String, f64>,
    /// Weight adjustments recorded when a scheduled rebalance ran this round.
    pub adjustments: usize,
}

/// Collect one round of decisions, then rebalance if one is due.
pub async fn run_round(
    manager: &AgentManager,
    round: usize,
    input: &MarketInput,
    timeout: Option<Duration>,
) -> RoundReport {
    let mut decisions = manager.collect_decisions(input, timeout).await;
    decisions.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));

    let adjustments = if manager.should_rebalance() {
        manager.rebalance_weights(false).len()
    } else {
        0
    };

    RoundReport {
        round,
        decisions,
        weights: manager.weights().into_iter().collect(),
        adjustments,
    }
}

/// Parse newline-delimited `MarketInput` JSON, skipping blank lines.
pub fn parse_inputs(raw: &str) -> Result<Vec<MarketInput>, anyhow::Error> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("Failed to parse MarketInput JSON on line {}", i + 1))
        })
        .collect()
}
