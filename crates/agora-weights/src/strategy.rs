use agora_models::config::{AdjustmentMethod, WeightConfig};
use agora_models::PerformanceRecord;
use tracing::debug;

use crate::regression::{training_rows, window_features, RidgeRegressor, FEATURE_WINDOW};
use crate::stats::{daily_risk_free, mean, std_dev, win_rate, ZERO_VARIANCE};

/// Parameters every strategy may consult.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringContext {
    /// Most recent records considered.
    pub window: usize,
    pub min_weight: f64,
    pub max_weight: f64,
    /// Annual.
    pub risk_free_rate: f64,
}

impl ScoringContext {
    pub fn from_config(config: &WeightConfig) -> Self {
        Self {
            window: config.performance_window,
            min_weight: config.min_weight,
            max_weight: config.max_weight,
            risk_free_rate: config.risk_free_rate,
        }
    }

    fn recent<'a>(&self, history: &'a [PerformanceRecord]) -> &'a [PerformanceRecord] {
        let start = history.len().saturating_sub(self.window);
        &history[start..]
    }
}

/// Turns one agent's history (oldest first) into a raw, unnormalized score.
///
/// Strategies never fail: short histories yield a documented fallback.
pub trait ScoringStrategy: Send + Sync {
    fn method(&self) -> AdjustmentMethod;

    fn score(&self, history: &[PerformanceRecord], ctx: &ScoringContext) -> f64;
}

fn returns(records: &[PerformanceRecord]) -> Vec<f64> {
    records.iter().map(|r| r.decision_return).collect()
}

/// `avg_return * win_rate`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerformanceBased;

impl ScoringStrategy for PerformanceBased {
    fn method(&self) -> AdjustmentMethod {
        AdjustmentMethod::PerformanceBased
    }

    fn score(&self, history: &[PerformanceRecord], ctx: &ScoringContext) -> f64 {
        let r = returns(ctx.recent(history));
        if r.is_empty() {
            return 0.0;
        }
        mean(&r) * win_rate(&r)
    }
}

/// `avg_return / std(return)`; the plain average under zero variance. Needs two records.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskAdjusted;

impl ScoringStrategy for RiskAdjusted {
    fn method(&self) -> AdjustmentMethod {
        AdjustmentMethod::RiskAdjusted
    }

    fn score(&self, history: &[PerformanceRecord], ctx: &ScoringContext) -> f64 {
        let r = returns(ctx.recent(history));
        if r.len() < 2 {
            return 0.0;
        }
        let avg = mean(&r);
        let sd = std_dev(&r);
        if sd < ZERO_VARIANCE {
            avg
        } else {
            avg / sd
        }
    }
}

/// Mean excess return over its standard deviation, not annualized.
#[derive(Debug, Clone, Copy, Default)]
pub struct SharpeRatio;

impl ScoringStrategy for SharpeRatio {
    fn method(&self) -> AdjustmentMethod {
        AdjustmentMethod::SharpeRatio
    }

    fn score(&self, history: &[PerformanceRecord], ctx: &ScoringContext) -> f64 {
        let r = returns(ctx.recent(history));
        if r.len() < 2 {
            return 0.0;
        }
        let rf = daily_risk_free(ctx.risk_free_rate);
        let excess: Vec<f64> = r.iter().map(|x| x - rf).collect();
        let avg = mean(&excess);
        let sd = std_dev(&excess);
        if sd < ZERO_VARIANCE {
            avg
        } else {
            avg / sd
        }
    }
}

/// Kelly fraction `(b*p - q) / b` clamped to the weight bounds.
///
/// Returns `min_weight` until there are five records including at least one win and one loss.
#[derive(Debug, Clone, Copy, Default)]
pub struct KellyCriterion;

impl KellyCriterion {
    pub const MIN_RECORDS: usize = 5;
}

impl ScoringStrategy for KellyCriterion {
    fn method(&self) -> AdjustmentMethod {
        AdjustmentMethod::KellyCriterion
    }

    fn score(&self, history: &[PerformanceRecord], ctx: &ScoringContext) -> f64 {
        let r = returns(ctx.recent(history));
        if r.len() < Self::MIN_RECORDS {
            return ctx.min_weight;
        }

        let wins: Vec<f64> = r.iter().copied().filter(|x| *x > 0.0).collect();
        let losses: Vec<f64> = r.iter().copied().filter(|x| *x < 0.0).map(f64::abs).collect();
        if wins.is_empty() || losses.is_empty() {
            return ctx.min_weight;
        }

        let avg_loss = mean(&losses);
        if avg_loss <= 0.0 {
            return ctx.min_weight;
        }
        let b = mean(&wins) / avg_loss;
        let p = wins.len() as f64 / r.len() as f64;
        let fraction = (b * p - (1.0 - p)) / b;
        fraction.clamp(ctx.min_weight, ctx.max_weight)
    }
}

/// Ridge regression on 5-record feature windows predicting the next return.
///
/// Falls back to [`PerformanceBased`] below ten training rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct MachineLearning;

impl ScoringStrategy for MachineLearning {
    fn method(&self) -> AdjustmentMethod {
        AdjustmentMethod::MachineLearning
    }

    fn score(&self, history: &[PerformanceRecord], ctx: &ScoringContext) -> f64 {
        let agent_id = history.first().map(|r| r.agent_id.as_str()).unwrap_or("");
        let rows = training_rows(history);

        match RidgeRegressor::fit(agent_id, &rows) {
            Ok(model) => {
                let latest = &history[history.len() - FEATURE_WINDOW..];
                model.predict(&window_features(latest)).max(0.0)
            }
            Err(e) => {
                debug!(agent = %agent_id, reason = %e, "Falling back to performance-based score");
                PerformanceBased.score(history, ctx)
            }
        }
    }
}

/// `0.4 * performance + 0.3 * risk_adjusted + 0.3 * sharpe`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ensemble;

impl Ensemble {
    pub const PERFORMANCE_WEIGHT: f64 = 0.4;
    pub const RISK_WEIGHT: f64 = 0.3;
    pub const SHARPE_WEIGHT: f64 = 0.3;
}

impl ScoringStrategy for Ensemble {
    fn method(&self) -> AdjustmentMethod {
        AdjustmentMethod::Ensemble
    }

    fn score(&self, history: &[PerformanceRecord], ctx: &ScoringContext) -> f64 {
        Self::PERFORMANCE_WEIGHT * PerformanceBased.score(history, ctx)
            + Self::RISK_WEIGHT * RiskAdjusted.score(history, ctx)
            + Self::SHARPE_WEIGHT * SharpeRatio.score(history, ctx)
    }
}

pub fn build_strategy(method: AdjustmentMethod) -> Box<dyn ScoringStrategy> {
    match method {
        AdjustmentMethod::PerformanceBased => Box::new(PerformanceBased),
        AdjustmentMethod::RiskAdjusted => Box::new(RiskAdjusted),
        AdjustmentMethod::SharpeRatio => Box::new(SharpeRatio),
        AdjustmentMethod::KellyCriterion => Box::new(KellyCriterion),
        AdjustmentMethod::MachineLearning => Box::new(MachineLearning),
        AdjustmentMethod::Ensemble => Box::new(Ensemble),
    }
}
