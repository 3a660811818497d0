use std::collections::{HashMap, VecDeque};

use agora_models::config::{AdjustmentMethod, WeightConfig};
use agora_models::{MarketCondition, PerformanceRecord, PerformanceSummary, WeightAdjustment};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::WeightError;
use crate::normalize::{apply_constraints, scores_to_weights};
use crate::stats::{cumulative_return, max_drawdown, mean, sharpe_ratio, std_dev, win_rate};
use crate::strategy::{build_strategy, PerformanceBased, ScoringContext, ScoringStrategy};

/// Weight change needed for the "performance improved/degraded" labels.
const SIGNIFICANT_CHANGE: f64 = 0.1;

/// How far a weight total may drift from 1 and still count as normalized.
const UNIT_SUM_EPSILON: f64 = 1e-6;

/// Distribution of the current weight vector.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WeightStatistics {
    pub count: usize,
    pub total: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// Herfindahl index: 1/n for equal weights, 1.0 when one agent holds everything.
    pub concentration: f64,
}

/// Keeps a rolling performance window per agent and redistributes weights from it.
///
/// Not internally synchronized; the owner serializes access.
pub struct WeightAdjuster {
    config: WeightConfig,
    strategy: Box<dyn ScoringStrategy>,
    histories: HashMap<String, VecDeque<PerformanceRecord>>,
    current_weights: HashMap<String, f64>,
    adjustment_history: Vec<WeightAdjustment>,
}

impl WeightAdjuster {
    pub fn new(config: WeightConfig) -> Result<Self, WeightError> {
        let strategy = build_strategy(config.adjustment_method);
        Self::with_strategy(config, strategy)
    }

    /// Use a custom scoring strategy instead of the configured method.
    pub fn with_strategy(
        config: WeightConfig,
        strategy: Box<dyn ScoringStrategy>,
    ) -> Result<Self, WeightError> {
        config.validate()?;
        info!(method = %strategy.method(), window = config.performance_window, "Weight adjuster ready");
        Ok(Self {
            config,
            strategy,
            histories: HashMap::new(),
            current_weights: HashMap::new(),
            adjustment_history: Vec::new(),
        })
    }

    pub fn config(&self) -> &WeightConfig {
        &self.config
    }

    pub fn method(&self) -> AdjustmentMethod {
        self.strategy.method()
    }

    fn context(&self) -> ScoringContext {
        ScoringContext::from_config(&self.config)
    }

    /// Append a record to the agent's rolling window, evicting the oldest on overflow.
    pub fn update_performance(&mut self, record: PerformanceRecord) {
        let capacity = self.config.history_capacity;
        let history = self.histories.entry(record.agent_id.clone()).or_default();
        while history.len() >= capacity {
            history.pop_front();
        }
        history.push_back(record);
    }

    /// Build a record for a realized return, deriving the rolling statistics, and store it.
    pub fn record_return(
        &mut self,
        agent_id: &str,
        decision_return: f64,
        confidence: f64,
        position_size: f64,
        market_condition: MarketCondition,
    ) -> PerformanceRecord {
        let window = self.config.performance_window;
        let (previous_cumulative, mut returns) = match self.histories.get(agent_id) {
            Some(h) => {
                let skip = h.len().saturating_sub(window.saturating_sub(1));
                (
                    h.back().map(|r| r.cumulative_return).unwrap_or(0.0),
                    h.iter().skip(skip).map(|r| r.decision_return).collect(),
                )
            }
            None => (0.0, Vec::new()),
        };
        returns.push(decision_return);

        let record = PerformanceRecord {
            agent_id: agent_id.to_string(),
            timestamp: Utc::now(),
            decision_return,
            cumulative_return: (1.0 + previous_cumulative) * (1.0 + decision_return) - 1.0,
            volatility: std_dev(&returns),
            sharpe_ratio: sharpe_ratio(&returns, self.config.risk_free_rate),
            max_drawdown: max_drawdown(&returns),
            win_rate: win_rate(&returns),
            confidence: confidence.clamp(0.0, 1.0),
            position_size,
            market_condition,
            metadata: serde_json::Value::Null,
        };
        self.update_performance(record.clone());
        record
    }

    pub fn history(&self, agent_id: &str) -> Vec<PerformanceRecord> {
        self.histories
            .get(agent_id)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn history_len(&self, agent_id: &str) -> usize {
        self.histories.get(agent_id).map_or(0, VecDeque::len)
    }

    pub fn has_history(&self) -> bool {
        self.histories.values().any(|h| !h.is_empty())
    }

    /// Summary over the most recent `window` records (the configured window if `None`).
    pub fn performance_summary(
        &self,
        agent_id: &str,
        window: Option<usize>,
    ) -> Option<PerformanceSummary> {
        let history = self.histories.get(agent_id).filter(|h| !h.is_empty())?;
        let window = window.unwrap_or(self.config.performance_window);
        let skip = history.len().saturating_sub(window);
        let returns: Vec<f64> = history.iter().skip(skip).map(|r| r.decision_return).collect();

        Some(PerformanceSummary {
            sharpe_ratio: sharpe_ratio(&returns, self.config.risk_free_rate),
            win_rate: win_rate(&returns),
            max_drawdown: max_drawdown(&returns),
            avg_return: mean(&returns),
            volatility: std_dev(&returns),
            total_return: cumulative_return(&returns),
            records: returns.len(),
        })
    }

    /// Raw strategy score per agent. Agents without history score 0.
    pub fn score_agents(&self, agent_ids: &[String]) -> HashMap<String, f64> {
        let ctx = self.context();
        agent_ids
            .iter()
            .map(|id| {
                let history: Vec<PerformanceRecord> = self.history(id);
                let score = if history.is_empty() {
                    0.0
                } else {
                    self.strategy.score(&history, &ctx)
                };
                (id.clone(), score)
            })
            .collect()
    }

    /// Target weights for `agent_ids` without changing any state.
    pub fn calculate_optimal_weights(&self, agent_ids: &[String]) -> HashMap<String, f64> {
        self.targets_from_scores(&self.score_agents(agent_ids))
    }

    fn targets_from_scores(&self, scores: &HashMap<String, f64>) -> HashMap<String, f64> {
        let mut targets = scores_to_weights(scores);

        let decay = self.config.weight_decay;
        if decay > 0.0 {
            for (id, target) in targets.iter_mut() {
                if let Some(old) = self.current_weights.get(id) {
                    *target = decay * old + (1.0 - decay) * *target;
                }
            }
        }

        apply_constraints(&mut targets, self.config.min_weight, self.config.max_weight);
        targets
    }

    /// Score `agent_ids` with the configured strategy and apply the resulting weights.
    pub fn adjust_weights(&mut self, agent_ids: &[String]) -> Vec<WeightAdjustment> {
        let scores = self.score_agents(agent_ids);
        self.apply_scores(&scores)
    }

    /// Turn raw scores into the new weight vector.
    ///
    /// Every weight is updated; only changes larger than `min_adjustment` are
    /// returned and appended to the audit history. Agents missing from `scores`
    /// lose their weight entry.
    pub fn apply_scores(&mut self, scores: &HashMap<String, f64>) -> Vec<WeightAdjustment> {
        let targets = self.targets_from_scores(scores);
        let ctx = self.context();
        let now = Utc::now();
        let mut adjustments = Vec::new();

        let mut ids: Vec<&String> = targets.keys().collect();
        ids.sort();
        for id in ids {
            let new_weight = targets[id];
            let old_weight = self.current_weights.get(id).copied();
            let delta = new_weight - old_weight.unwrap_or(0.0);

            if delta.abs() > self.config.min_adjustment {
                let history = self.history(id);
                let recent_start = history.len().saturating_sub(ctx.window);
                let recent = &history[recent_start..];
                let returns: Vec<f64> = recent.iter().map(|r| r.decision_return).collect();
                let confidences: Vec<f64> = recent.iter().map(|r| r.confidence).collect();

                let performance_score = PerformanceBased.score(&history, &ctx);
                let risk_score = std_dev(&returns);
                let old = old_weight.unwrap_or(0.0);

                adjustments.push(WeightAdjustment {
                    agent_id: id.clone(),
                    old_weight: old,
                    new_weight,
                    adjustment_ratio: if old > 0.0 { new_weight / old } else { 1.0 },
                    reason: classify_adjustment(delta, performance_score).to_string(),
                    performance_score,
                    risk_score,
                    confidence_score: mean(&confidences),
                    timestamp: now,
                    metadata: serde_json::json!({
                        "method": self.strategy.method().as_str(),
                        "raw_score": scores.get(id).copied().unwrap_or(0.0),
                        "records": history.len(),
                    }),
                });
            } else {
                debug!(agent = %id, delta, "Weight change below audit threshold");
            }
        }

        self.current_weights = targets;
        self.adjustment_history.extend(adjustments.iter().cloned());
        info!(
            method = %self.strategy.method(),
            agents = self.current_weights.len(),
            recorded = adjustments.len(),
            "Weights adjusted"
        );
        adjustments
    }

    pub fn current_weights(&self) -> &HashMap<String, f64> {
        &self.current_weights
    }

    pub fn weight(&self, agent_id: &str) -> Option<f64> {
        self.current_weights.get(agent_id).copied()
    }

    /// Set a weight directly, e.g. at registration. Not clamped or renormalized.
    pub fn set_weight(&mut self, agent_id: &str, weight: f64) {
        self.current_weights.insert(agent_id.to_string(), weight);
    }

    /// Forget an agent's weight and history.
    ///
    /// If the weights summed to 1 before the removal, the remaining ones are
    /// re-constrained so they still do.
    pub fn remove_agent(&mut self, agent_id: &str) {
        let total: f64 = self.current_weights.values().sum();
        let was_normalized = (total - 1.0).abs() < UNIT_SUM_EPSILON;
        self.histories.remove(agent_id);
        if self.current_weights.remove(agent_id).is_none() {
            return;
        }
        if was_normalized && !self.current_weights.is_empty() {
            apply_constraints(
                &mut self.current_weights,
                self.config.min_weight,
                self.config.max_weight,
            );
            debug!(agent = %agent_id, remaining = self.current_weights.len(), "Weights renormalized after removal");
        }
    }

    pub fn adjustment_history(&self) -> &[WeightAdjustment] {
        &self.adjustment_history
    }

    pub fn weight_statistics(&self) -> WeightStatistics {
        let weights: Vec<f64> = self.current_weights.values().copied().collect();
        if weights.is_empty() {
            return WeightStatistics::default();
        }
        WeightStatistics {
            count: weights.len(),
            total: weights.iter().sum(),
            mean: mean(&weights),
            std_dev: std_dev(&weights),
            min: weights.iter().copied().fold(f64::INFINITY, f64::min),
            max: weights.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            concentration: weights.iter().map(|w| w * w).sum(),
        }
    }
}

fn classify_adjustment(delta: f64, performance_score: f64) -> &'static str {
    if delta > SIGNIFICANT_CHANGE && performance_score > 0.0 {
        "performance improved"
    } else if delta < -SIGNIFICANT_CHANGE && performance_score <= 0.0 {
        "performance degraded"
    } else {
        "minor adjustment"
    }
}
