//! Score-to-weight conversion and weight constraints.

use std::collections::HashMap;

use tracing::warn;

/// Added to every shifted score so no agent ends up with a zero weight.
pub const SCORE_FLOOR: f64 = 0.1;

const TOLERANCE: f64 = 1e-12;

pub fn equal_weights<'a, I>(agent_ids: I) -> HashMap<String, f64>
where
    I: IntoIterator<Item = &'a String>,
{
    let ids: Vec<&String> = agent_ids.into_iter().collect();
    if ids.is_empty() {
        return HashMap::new();
    }
    let w = 1.0 / ids.len() as f64;
    ids.into_iter().map(|id| (id.clone(), w)).collect()
}

/// Shift scores so the minimum is non-negative, add [`SCORE_FLOOR`], divide by the total.
///
/// Non-finite scores count as zero. A zero total yields equal weights.
pub fn scores_to_weights(scores: &HashMap<String, f64>) -> HashMap<String, f64> {
    if scores.is_empty() {
        return HashMap::new();
    }

    let clean: HashMap<&String, f64> = scores
        .iter()
        .map(|(id, s)| (id, if s.is_finite() { *s } else { 0.0 }))
        .collect();
    let min = clean.values().copied().fold(f64::INFINITY, f64::min);
    let shift = if min < 0.0 { -min } else { 0.0 };

    let adjusted: HashMap<&String, f64> = clean
        .into_iter()
        .map(|(id, s)| (id, s + shift + SCORE_FLOOR))
        .collect();
    let total: f64 = adjusted.values().sum();
    if total <= 0.0 {
        return equal_weights(scores.keys());
    }

    adjusted
        .into_iter()
        .map(|(id, s)| (id.clone(), s / total))
        .collect()
}

/// Clamp every weight into `[min_weight, max_weight]` and renormalize to a unit sum.
///
/// Clamping and rescaling repeat until both hold: weights pinned at a bound stay
/// there while the remaining ones absorb the difference proportionally. Bounds that
/// cannot be met (`n * max < 1` or `n * min > 1`) degrade to equal weights.
pub fn apply_constraints(weights: &mut HashMap<String, f64>, min_weight: f64, max_weight: f64) {
    let n = weights.len();
    if n == 0 {
        return;
    }

    let nf = n as f64;
    if nf * max_weight < 1.0 - TOLERANCE || nf * min_weight > 1.0 + TOLERANCE {
        warn!(agents = n, min_weight, max_weight, "Weight bounds infeasible, using equal weights");
        let equal = 1.0 / nf;
        weights.values_mut().for_each(|w| *w = equal);
        return;
    }

    for w in weights.values_mut() {
        if !w.is_finite() || *w < 0.0 {
            *w = 0.0;
        }
    }

    for _ in 0..=n * 2 {
        for w in weights.values_mut() {
            *w = w.clamp(min_weight, max_weight);
        }

        let total: f64 = weights.values().sum();
        let diff = 1.0 - total;
        if diff.abs() <= TOLERANCE {
            return;
        }

        // Grow only weights below max, shrink only weights above min.
        let adjustable = |w: f64| {
            if diff > 0.0 {
                w < max_weight
            } else {
                w > min_weight
            }
        };
        let movable: f64 = weights.values().copied().filter(|w| adjustable(*w)).sum();
        if movable <= 0.0 {
            break;
        }
        let factor = (movable + diff) / movable;
        for w in weights.values_mut() {
            if adjustable(*w) {
                *w *= factor;
            }
        }
    }

    // Numerical leftovers only; the loop above settles in at most n rounds.
    let total: f64 = weights.values().sum();
    if total > 0.0 {
        weights.values_mut().for_each(|w| *w /= total);
    }
}
