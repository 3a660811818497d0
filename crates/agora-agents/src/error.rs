use thiserror::Error;

/// Failure of a single agent's decision call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    #[error("Decision failed: {0}")]
    Decision(String),

    #[error("Agent timed out after {0} ms")]
    Timeout(u64),

    #[error("Agent task panicked")]
    Panicked,

    #[error("Agent inactive: {0}")]
    Inactive(String),

    #[error("Previous decision still running: {0}")]
    Busy(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistrationError {
    #[error("Agent already registered: {0}")]
    DuplicateAgent(String),

    #[error("Agent registry full (max {max})")]
    CapacityExceeded { max: usize },

    #[error("Weight {weight} outside [{min}, {max}]")]
    InvalidWeight { weight: f64, min: f64, max: f64 },

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),
}
