use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use agora_models::{Decision, MarketInput, StaticAgentConfig, TradeAction};
use async_trait::async_trait;
use tracing::debug;

use crate::agent::Agent;
use crate::error::AgentError;

/// An agent that always answers with the same action and confidence.
///
/// Built from `[[agents]]` entries in the config file; useful for wiring and dry runs.
pub struct StaticAgent {
    id: String,
    name: String,
    action: TradeAction,
    confidence: f64,
    latency: Duration,
    active: AtomicBool,
}

impl StaticAgent {
    pub fn new(id: impl Into<String>, action: TradeAction, confidence: f64) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            action,
            confidence,
            latency: Duration::ZERO,
            active: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &StaticAgentConfig) -> Self {
        Self {
            id: config.id.clone(),
            name: config.name.clone().unwrap_or_else(|| config.id.clone()),
            action: config.action,
            confidence: config.confidence,
            latency: Duration::from_millis(config.latency_ms),
            active: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Agent for StaticAgent {
    fn agent_id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    async fn make_decision(
        &self,
        input: &MarketInput,
        _context: Option<&serde_json::Value>,
    ) -> Result<Decision, AgentError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        debug!(agent = %self.id, action = ?self.action, "Static decision");
        Ok(
            Decision::new(&self.id, self.action, self.confidence).with_metadata(serde_json::json!({
                "symbol": input.symbol,
                "source": "static",
            })),
        )
    }
}
