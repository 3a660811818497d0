//! Next-period return prediction from rolling feature windows.

use agora_models::PerformanceRecord;
use nalgebra::{DMatrix, DVector};

use crate::error::WeightError;
use crate::stats::{mean, std_dev, win_rate, ZERO_VARIANCE};

/// Records per feature window.
pub const FEATURE_WINDOW: usize = 5;

/// Feature rows needed before a model is fitted.
pub const MIN_TRAINING_ROWS: usize = 10;

pub const FEATURE_COUNT: usize = 10;

const RIDGE_PENALTY: f64 = 1.0;

/// Summarize one window of records as a feature vector.
///
/// Layout: mean/std of return, mean/std of confidence, mean position size,
/// win rate, max/min return, latest Sharpe, latest drawdown.
pub fn window_features(window: &[PerformanceRecord]) -> [f64; FEATURE_COUNT] {
    let returns: Vec<f64> = window.iter().map(|r| r.decision_return).collect();
    let confidences: Vec<f64> = window.iter().map(|r| r.confidence).collect();
    let sizes: Vec<f64> = window.iter().map(|r| r.position_size).collect();
    let latest = window.last();

    [
        mean(&returns),
        std_dev(&returns),
        mean(&confidences),
        std_dev(&confidences),
        mean(&sizes),
        win_rate(&returns),
        extreme(&returns, f64::max),
        extreme(&returns, f64::min),
        latest.map(|r| r.sharpe_ratio).unwrap_or(0.0),
        latest.map(|r| r.max_drawdown).unwrap_or(0.0),
    ]
}

fn extreme(values: &[f64], pick: fn(f64, f64) -> f64) -> f64 {
    values.iter().copied().reduce(pick).unwrap_or(0.0)
}

/// Training rows: each window of [`FEATURE_WINDOW`] records paired with the return that followed it.
pub fn training_rows(history: &[PerformanceRecord]) -> Vec<([f64; FEATURE_COUNT], f64)> {
    if history.len() <= FEATURE_WINDOW {
        return Vec::new();
    }
    (0..history.len() - FEATURE_WINDOW)
        .map(|start| {
            let window = &history[start..start + FEATURE_WINDOW];
            (
                window_features(window),
                history[start + FEATURE_WINDOW].decision_return,
            )
        })
        .collect()
}

/// L2-regularized linear regression on standardized features.
#[derive(Debug, Clone)]
pub struct RidgeRegressor {
    feature_means: Vec<f64>,
    feature_scales: Vec<f64>,
    intercept: f64,
    coefficients: DVector<f64>,
}

impl RidgeRegressor {
    pub fn fit(
        agent_id: &str,
        rows: &[([f64; FEATURE_COUNT], f64)],
    ) -> Result<Self, WeightError> {
        if rows.len() < MIN_TRAINING_ROWS {
            return Err(WeightError::InsufficientHistory {
                agent_id: agent_id.to_string(),
                required: MIN_TRAINING_ROWS,
                available: rows.len(),
            });
        }

        let n = rows.len();
        let mut feature_means = Vec::with_capacity(FEATURE_COUNT);
        let mut feature_scales = Vec::with_capacity(FEATURE_COUNT);
        for j in 0..FEATURE_COUNT {
            let column: Vec<f64> = rows.iter().map(|(x, _)| x[j]).collect();
            let sd = std_dev(&column);
            feature_means.push(mean(&column));
            feature_scales.push(if sd > ZERO_VARIANCE { sd } else { 1.0 });
        }

        let targets: Vec<f64> = rows.iter().map(|(_, y)| *y).collect();
        let intercept = mean(&targets);

        let x = DMatrix::from_fn(n, FEATURE_COUNT, |i, j| {
            (rows[i].0[j] - feature_means[j]) / feature_scales[j]
        });
        let y = DVector::from_iterator(n, targets.iter().map(|t| t - intercept));

        let gram = x.transpose() * &x
            + DMatrix::identity(FEATURE_COUNT, FEATURE_COUNT) * RIDGE_PENALTY;
        let rhs = x.transpose() * y;
        let coefficients = gram
            .cholesky()
            .ok_or_else(|| {
                WeightError::Regression("normal equations not positive definite".to_string())
            })?
            .solve(&rhs);

        if coefficients.iter().any(|c| !c.is_finite()) {
            return Err(WeightError::Regression("non-finite coefficients".to_string()));
        }

        Ok(Self {
            feature_means,
            feature_scales,
            intercept,
            coefficients,
        })
    }

    pub fn predict(&self, features: &[f64; FEATURE_COUNT]) -> f64 {
        let standardized = DVector::from_fn(FEATURE_COUNT, |j, _| {
            (features[j] - self.feature_means[j]) / self.feature_scales[j]
        });
        self.intercept + self.coefficients.dot(&standardized)
    }
}
