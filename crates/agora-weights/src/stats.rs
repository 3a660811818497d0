//! Return statistics shared by the scoring strategies.

use statrs::statistics::Statistics;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Standard deviations below this are treated as zero variance.
pub const ZERO_VARIANCE: f64 = 1e-12;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().mean()
}

/// Population standard deviation; zero for fewer than two values.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values.iter().population_std_dev()
}

/// Fraction of strictly positive values.
pub fn win_rate(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().filter(|r| **r > 0.0).count() as f64 / values.len() as f64
}

/// Compounded return of a sequence of per-period returns.
pub fn cumulative_return(returns: &[f64]) -> f64 {
    returns.iter().fold(1.0, |equity, r| equity * (1.0 + r)) - 1.0
}

/// Largest peak-to-trough decline of the compounded equity curve, as a value <= 0.
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut equity = 1.0f64;
    let mut peak = 1.0f64;
    let mut worst = 0.0f64;
    for r in returns {
        equity *= 1.0 + r;
        peak = peak.max(equity);
        if peak > 0.0 {
            worst = worst.min((equity - peak) / peak);
        }
    }
    worst
}

/// Daily risk-free rate from an annual one.
pub fn daily_risk_free(annual: f64) -> f64 {
    annual / TRADING_DAYS_PER_YEAR
}

/// Mean excess return over its standard deviation, not annualized.
///
/// Zero variance yields the mean excess return; fewer than two values yield 0.
pub fn sharpe_ratio(returns: &[f64], annual_risk_free: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let rf = daily_risk_free(annual_risk_free);
    let excess: Vec<f64> = returns.iter().map(|r| r - rf).collect();
    let avg = mean(&excess);
    let sd = std_dev(&excess);
    if sd < ZERO_VARIANCE {
        avg
    } else {
        avg / sd
    }
}
