pub mod config;
pub mod decision;
pub mod error;
pub mod message;
pub mod performance;

pub use config::{
    AdjustmentMethod, AgoraConfig, CommunicationConfig, ManagerConfig, StaticAgentConfig,
    WeightConfig,
};
pub use decision::{AgentStatus, Decision, MarketInput, TradeAction};
pub use error::ConfigError;
pub use message::{priority, Message};
pub use performance::{MarketCondition, PerformanceRecord, PerformanceSummary, WeightAdjustment};
