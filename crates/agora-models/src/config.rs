use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::decision::TradeAction;
use crate::error::ConfigError;

/// Top-level configuration for Agora.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AgoraConfig {
    #[serde(default)]
    pub manager: ManagerConfig,
    #[serde(default)]
    pub communication: CommunicationConfig,
    #[serde(default)]
    pub weights: WeightConfig,
    /// Agents the CLI registers on startup.
    #[serde(default)]
    pub agents: Vec<StaticAgentConfig>,
}

impl AgoraConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.weights.validate()?;
        self.communication.validate()?;
        self.manager.validate(&self.weights)?;

        for agent in &self.agents {
            if !(0.0..=1.0).contains(&agent.confidence) {
                return Err(ConfigError::Invalid(format!(
                    "agent {} confidence {} outside [0, 1]",
                    agent.id, agent.confidence
                )));
            }
        }
        Ok(())
    }
}

/// Configuration for the agent manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManagerConfig {
    /// Registry capacity; also sizes the decision worker pool.
    #[serde(default = "default_max_agents")]
    pub max_agents: usize,
    /// Weight given to agents registered without an explicit one.
    #[serde(default = "default_weight")]
    pub default_weight: f64,
    #[serde(default = "default_rebalance_frequency_days")]
    pub rebalance_frequency_days: i64,
    /// When false, agents are asked one after another under the same deadline.
    #[serde(default = "default_true")]
    pub enable_concurrent_collection: bool,
    /// Deadline for a collection round when the caller passes none.
    #[serde(default = "default_decision_timeout_ms")]
    pub decision_timeout_ms: u64,
    #[serde(default = "default_decision_history_size")]
    pub decision_history_size: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_agents: default_max_agents(),
            default_weight: default_weight(),
            rebalance_frequency_days: default_rebalance_frequency_days(),
            enable_concurrent_collection: true,
            decision_timeout_ms: default_decision_timeout_ms(),
            decision_history_size: default_decision_history_size(),
        }
    }
}

impl ManagerConfig {
    pub fn validate(&self, weights: &WeightConfig) -> Result<(), ConfigError> {
        if self.max_agents == 0 {
            return Err(ConfigError::Invalid("max_agents must be positive".to_string()));
        }
        if !self.default_weight.is_finite()
            || self.default_weight < weights.min_weight
            || self.default_weight > weights.max_weight
        {
            return Err(ConfigError::Invalid(format!(
                "default_weight {} outside [{}, {}]",
                self.default_weight, weights.min_weight, weights.max_weight
            )));
        }
        if self.rebalance_frequency_days < 0 {
            return Err(ConfigError::Invalid(
                "rebalance_frequency_days must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the communication hub.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommunicationConfig {
    /// Capacity of each agent's queue. Sends to a full queue are rejected.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    #[serde(default = "default_broadcast_history_size")]
    pub broadcast_history_size: usize,
    /// How `receive` behaves without an explicit timeout: poll (false) or wait forever (true).
    #[serde(default)]
    pub block_without_timeout: bool,
}

impl Default for CommunicationConfig {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
            broadcast_history_size: default_broadcast_history_size(),
            block_without_timeout: false,
        }
    }
}

impl CommunicationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_queue_size == 0 {
            return Err(ConfigError::Invalid(
                "max_queue_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Scoring strategy used by the weight adjuster.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentMethod {
    PerformanceBased,
    RiskAdjusted,
    SharpeRatio,
    KellyCriterion,
    MachineLearning,
    #[default]
    Ensemble,
}

impl AdjustmentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PerformanceBased => "performance_based",
            Self::RiskAdjusted => "risk_adjusted",
            Self::SharpeRatio => "sharpe_ratio",
            Self::KellyCriterion => "kelly_criterion",
            Self::MachineLearning => "machine_learning",
            Self::Ensemble => "ensemble",
        }
    }
}

impl fmt::Display for AdjustmentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdjustmentMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "performance_based" => Ok(Self::PerformanceBased),
            "risk_adjusted" => Ok(Self::RiskAdjusted),
            "sharpe_ratio" => Ok(Self::SharpeRatio),
            "kelly_criterion" => Ok(Self::KellyCriterion),
            "machine_learning" => Ok(Self::MachineLearning),
            "ensemble" => Ok(Self::Ensemble),
            other => Err(ConfigError::UnknownMethod(other.to_string())),
        }
    }
}

/// Configuration for the dynamic weight adjuster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeightConfig {
    #[serde(default)]
    pub adjustment_method: AdjustmentMethod,
    /// Number of most recent records each strategy scores.
    #[serde(default = "default_performance_window")]
    pub performance_window: usize,
    /// Rolling history capacity per agent; oldest records are evicted.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_min_weight")]
    pub min_weight: f64,
    #[serde(default = "default_max_weight")]
    pub max_weight: f64,
    /// Fraction of the previous weight kept when moving toward a new target.
    #[serde(default)]
    pub weight_decay: f64,
    /// Annual risk-free rate.
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,
    /// Weight changes at or below this size are applied but not audited.
    #[serde(default = "default_min_adjustment")]
    pub min_adjustment: f64,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            adjustment_method: AdjustmentMethod::default(),
            performance_window: default_performance_window(),
            history_capacity: default_history_capacity(),
            min_weight: default_min_weight(),
            max_weight: default_max_weight(),
            weight_decay: 0.0,
            risk_free_rate: default_risk_free_rate(),
            min_adjustment: default_min_adjustment(),
        }
    }
}

impl WeightConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("min_weight", self.min_weight),
            ("max_weight", self.max_weight),
            ("risk_free_rate", self.risk_free_rate),
            ("min_adjustment", self.min_adjustment),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::Invalid(format!("{name} must be finite, got {value}")));
            }
        }
        if self.min_weight <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "min_weight must be positive, got {}",
                self.min_weight
            )));
        }
        if self.min_weight > self.max_weight {
            return Err(ConfigError::Invalid(format!(
                "min_weight {} exceeds max_weight {}",
                self.min_weight, self.max_weight
            )));
        }
        if self.max_weight > 1.0 {
            return Err(ConfigError::Invalid(format!(
                "max_weight must not exceed 1.0, got {}",
                self.max_weight
            )));
        }
        if self.performance_window == 0 || self.history_capacity == 0 {
            return Err(ConfigError::Invalid(
                "performance_window and history_capacity must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.weight_decay) {
            return Err(ConfigError::Invalid(format!(
                "weight_decay must be in [0, 1), got {}",
                self.weight_decay
            )));
        }
        if self.min_adjustment < 0.0 {
            return Err(ConfigError::Invalid(
                "min_adjustment must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// A fixed-output agent declared in the config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StaticAgentConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub action: TradeAction,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Simulated decision latency.
    #[serde(default)]
    pub latency_ms: u64,
    /// Falls back to `ManagerConfig::default_weight`.
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default = "default_true")]
    pub auto_start: bool,
}

fn default_max_agents() -> usize {
    10
}
fn default_weight() -> f64 {
    0.1
}
fn default_rebalance_frequency_days() -> i64 {
    7
}
fn default_decision_timeout_ms() -> u64 {
    30_000
}
fn default_decision_history_size() -> usize {
    1_000
}
fn default_max_queue_size() -> usize {
    1_000
}
fn default_broadcast_history_size() -> usize {
    100
}
fn default_performance_window() -> usize {
    30
}
fn default_history_capacity() -> usize {
    1_000
}
fn default_min_weight() -> f64 {
    0.01
}
fn default_max_weight() -> f64 {
    0.8
}
fn default_risk_free_rate() -> f64 {
    0.02
}
fn default_min_adjustment() -> f64 {
    0.01
}
fn default_confidence() -> f64 {
    0.5
}
fn default_true() -> bool {
    true
}
