use agora_models::{Decision, MarketInput, PerformanceSummary};
use async_trait::async_trait;

use crate::error::AgentError;

/// A decision-producing unit orchestrated by the manager. Mockable for testing.
///
/// `make_decision` runs on a worker task and may be abandoned at the round
/// deadline; an agent that holds resources across calls must clean up on its own.
#[async_trait]
pub trait Agent: Send + Sync {
    fn agent_id(&self) -> &str;

    fn name(&self) -> &str;

    fn is_active(&self) -> bool;

    fn set_active(&self, active: bool);

    /// `context` carries round information from the manager (round number, current weight).
    async fn make_decision(
        &self,
        input: &MarketInput,
        context: Option<&serde_json::Value>,
    ) -> Result<Decision, AgentError>;

    /// Rolling summary over the last `window_days`, if the agent tracks its own performance.
    fn performance_summary(&self, _window_days: u32) -> Option<PerformanceSummary> {
        None
    }
}
