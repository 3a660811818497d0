use agora_models::ConfigError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WeightError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Insufficient history for {agent_id}: need {required}, have {available}")]
    InsufficientHistory {
        agent_id: String,
        required: usize,
        available: usize,
    },

    #[error("Regression failed: {0}")]
    Regression(String),
}
