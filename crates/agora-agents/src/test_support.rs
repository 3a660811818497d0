//! Test support module providing configurable mock agents.
//!
//! `MockAgent` covers the behaviors the manager has to cope with: answering
//! normally, returning an error, overrunning the round deadline and panicking.
//! Every call is counted so tests can assert who was asked.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agora_models::{Decision, MarketInput, PerformanceSummary, TradeAction};
use async_trait::async_trait;

use crate::agent::Agent;
use crate::error::AgentError;

#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Answer immediately.
    Respond,
    /// Return `AgentError::Decision` with this message.
    Fail(String),
    /// Sleep before answering.
    Delay(Duration),
    Panic,
}

pub struct MockAgent {
    id: String,
    action: TradeAction,
    confidence: f64,
    behavior: MockBehavior,
    /// Confidences handed out in order before falling back to `confidence`.
    script: Mutex<VecDeque<f64>>,
    summary: Option<PerformanceSummary>,
    active: AtomicBool,
    calls: AtomicUsize,
}

impl MockAgent {
    pub fn new(id: &str, action: TradeAction, confidence: f64) -> Self {
        Self {
            id: id.to_string(),
            action,
            confidence,
            behavior: MockBehavior::Respond,
            script: Mutex::new(VecDeque::new()),
            summary: None,
            active: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn buying(id: &str) -> Self {
        Self::new(id, TradeAction::Buy, 0.7)
    }

    pub fn failing(id: &str) -> Self {
        Self::buying(id).with_behavior(MockBehavior::Fail(format!("{id} always fails")))
    }

    pub fn slow(id: &str, delay: Duration) -> Self {
        Self::buying(id).with_behavior(MockBehavior::Delay(delay))
    }

    pub fn panicking(id: &str) -> Self {
        Self::buying(id).with_behavior(MockBehavior::Panic)
    }

    pub fn with_behavior(mut self, behavior: MockBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn with_confidences(self, confidences: &[f64]) -> Self {
        *self.script.lock().unwrap_or_else(|e| e.into_inner()) =
            confidences.iter().copied().collect();
        self
    }

    pub fn with_summary(mut self, summary: PerformanceSummary) -> Self {
        self.summary = Some(summary);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn next_confidence(&self) -> f64 {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or(self.confidence)
    }
}

#[async_trait]
impl Agent for MockAgent {
    fn agent_id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.id
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    async fn make_decision(
        &self,
        _input: &MarketInput,
        context: Option<&serde_json::Value>,
    ) -> Result<Decision, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            MockBehavior::Respond => {}
            MockBehavior::Fail(reason) => return Err(AgentError::Decision(reason.clone())),
            MockBehavior::Delay(delay) => tokio::time::sleep(*delay).await,
            MockBehavior::Panic => panic!("mock agent {} panicked", self.id),
        }
        let metadata = context.cloned().unwrap_or(serde_json::Value::Null);
        Ok(Decision::new(&self.id, self.action, self.next_confidence()).with_metadata(metadata))
    }

    fn performance_summary(&self, _window_days: u32) -> Option<PerformanceSummary> {
        self.summary.clone()
    }
}
