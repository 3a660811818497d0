use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What an agent recommends doing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
    #[default]
    Hold,
}

/// Lifecycle state of a registered agent as seen by the manager.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Inactive,
    /// Last decision call failed or timed out.
    Error,
}

/// Market snapshot handed to every agent in a collection round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketInput {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Opaque market data; agents interpret it however they like.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl MarketInput {
    pub fn new(data: serde_json::Value) -> Self {
        Self {
            symbol: None,
            timestamp: Utc::now(),
            data,
        }
    }

    pub fn for_symbol(symbol: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            symbol: Some(symbol.into()),
            timestamp: Utc::now(),
            data,
        }
    }
}

/// A single agent's output for one collection round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub agent_id: String,
    pub action: TradeAction,
    /// 0.0 to 1.0.
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Decision {
    pub fn new(agent_id: impl Into<String>, action: TradeAction, confidence: f64) -> Self {
        Self {
            agent_id: agent_id.into(),
            action,
            confidence: confidence.clamp(0.0, 1.0),
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}
