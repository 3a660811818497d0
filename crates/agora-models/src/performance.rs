use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse market regime attached to each performance record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum MarketCondition {
    Bull,
    Bear,
    #[default]
    Sideways,
    Volatile,
}

/// One realized-return report for an agent. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceRecord {
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
    pub decision_return: f64,
    pub cumulative_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub confidence: f64,
    pub position_size: f64,
    pub market_condition: MarketCondition,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl PerformanceRecord {
    /// A record carrying only a return; derived statistics are zero.
    pub fn from_return(agent_id: impl Into<String>, decision_return: f64) -> Self {
        Self {
            agent_id: agent_id.into(),
            timestamp: Utc::now(),
            decision_return,
            cumulative_return: 0.0,
            volatility: 0.0,
            sharpe_ratio: 0.0,
            max_drawdown: 0.0,
            win_rate: 0.0,
            confidence: 0.5,
            position_size: 1.0,
            market_condition: MarketCondition::default(),
            metadata: serde_json::Value::Null,
        }
    }
}

/// Rolling summary used by summary-based rebalancing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PerformanceSummary {
    pub sharpe_ratio: f64,
    pub win_rate: f64,
    /// Reported as a non-positive fraction (e.g. -0.12) or its magnitude; callers use `abs()`.
    pub max_drawdown: f64,
    pub avg_return: f64,
    pub volatility: f64,
    pub total_return: f64,
    pub records: usize,
}

/// Audit record of one rebalancing step for one agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeightAdjustment {
    pub agent_id: String,
    pub old_weight: f64,
    pub new_weight: f64,
    /// `new_weight / old_weight`, or 1.0 when there was no previous weight.
    pub adjustment_ratio: f64,
    pub reason: String,
    pub performance_score: f64,
    pub risk_score: f64,
    pub confidence_score: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl WeightAdjustment {
    pub fn delta(&self) -> f64 {
        self.new_weight - self.old_weight
    }
}
