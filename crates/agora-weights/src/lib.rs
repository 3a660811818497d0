//! Dynamic weight adjustment for a pool of agents.
//!
//! Each agent's realized returns are kept in a fixed-capacity rolling window.
//! A [`ScoringStrategy`] turns that history into a raw score; the adjuster then
//! normalizes the scores, clamps them into `[min_weight, max_weight]` and
//! renormalizes so the weights always sum to one.

pub mod adjuster;
pub mod error;
pub mod normalize;
pub mod regression;
pub mod stats;
pub mod strategy;

pub use adjuster::{WeightAdjuster, WeightStatistics};
pub use error::WeightError;
pub use normalize::{apply_constraints, equal_weights, scores_to_weights};
pub use strategy::{build_strategy, ScoringContext, ScoringStrategy};
