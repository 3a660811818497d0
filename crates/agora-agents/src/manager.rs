use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use agora_comms::{CommunicationHub, CommunicationStats};
use agora_models::config::{AdjustmentMethod, AgoraConfig, ManagerConfig, WeightConfig};
use agora_models::{
    AgentStatus, ConfigError, Decision, MarketCondition, MarketInput, Message, PerformanceRecord,
    PerformanceSummary, WeightAdjustment,
};
use agora_weights::{apply_constraints, equal_weights, WeightAdjuster, WeightError, WeightStatistics};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::agent::Agent;
use crate::error::{AgentError, RegistrationError};

/// Sender id used for manager-originated messages.
pub const MANAGER_SENDER: &str = "manager";

/// Smoothing factor of the per-agent confidence average.
const CONFIDENCE_SMOOTHING: f64 = 0.1;

/// Confidence assumed for returns reported before an agent's first decision.
const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Per-agent decision counters.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct AgentPerformance {
    pub decisions: u64,
    pub failures: u64,
    pub timeouts: u64,
    /// Exponential moving average; the first decision seeds it.
    pub avg_confidence: f64,
    pub last_decision_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl AgentPerformance {
    fn record_decision(&mut self, decision: &Decision) {
        self.avg_confidence = if self.decisions == 0 {
            decision.confidence
        } else {
            CONFIDENCE_SMOOTHING * decision.confidence
                + (1.0 - CONFIDENCE_SMOOTHING) * self.avg_confidence
        };
        self.decisions += 1;
        self.last_decision_at = Some(decision.timestamp);
    }

    fn record_failure(&mut self, error: &AgentError) {
        match error {
            AgentError::Timeout(_) => self.timeouts += 1,
            _ => self.failures += 1,
        }
        self.last_error = Some(error.to_string());
    }
}

/// Point-in-time view of the manager.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStatus {
    pub total_agents: usize,
    pub active_agents: usize,
    pub error_agents: usize,
    pub max_agents: usize,
    pub statuses: BTreeMap<String, AgentStatus>,
    pub weights: BTreeMap<String, f64>,
    pub performance: BTreeMap<String, AgentPerformance>,
    pub total_decisions: u64,
    pub failed_decisions: u64,
    pub timed_out_decisions: u64,
    pub collection_rounds: u64,
    pub last_rebalance: DateTime<Utc>,
    pub adjustment_method: AdjustmentMethod,
    pub weight_statistics: WeightStatistics,
    pub communication: CommunicationStats,
}

struct ManagerState {
    agents: HashMap<String, Arc<dyn Agent>>,
    statuses: HashMap<String, AgentStatus>,
    performance: HashMap<String, AgentPerformance>,
    adjuster: WeightAdjuster,
    decision_history: VecDeque<Decision>,
    last_rebalance: DateTime<Utc>,
    total_decisions: u64,
    failed_decisions: u64,
    timed_out_decisions: u64,
    collection_rounds: u64,
}

type Outcome = (String, Result<Decision, AgentError>, Duration);

type BusySet = Arc<Mutex<HashSet<String>>>;

/// Marks an agent as having a decision call in flight until dropped.
///
/// Dropped when the call returns, the task panics, or the call is never dispatched.
struct BusyGuard {
    busy: BusySet,
    agent_id: String,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.busy
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.agent_id);
    }
}

/// An agent picked for this round together with its weight and in-flight mark.
type Dispatch = (Arc<dyn Agent>, f64, BusyGuard);

/// Registers agents, collects their decisions under a deadline and rebalances their weights.
///
/// Registry, statuses, counters and weights share one mutex that is never held
/// across an await. Decision calls run on tracked tasks gated by a semaphore
/// sized to `max_agents`. An agent whose previous call is still running is not
/// called again, so it holds at most one permit.
pub struct AgentManager {
    config: ManagerConfig,
    weight_config: WeightConfig,
    state: Mutex<ManagerState>,
    hub: Arc<CommunicationHub>,
    pool: Arc<Semaphore>,
    busy: BusySet,
    tracker: TaskTracker,
}

impl std::fmt::Debug for AgentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentManager")
            .field("config", &self.config)
            .field("weight_config", &self.weight_config)
            .finish_non_exhaustive()
    }
}

impl AgentManager {
    pub fn new(config: &AgoraConfig) -> Result<Self, ConfigError> {
        let hub = Arc::new(CommunicationHub::new(config.communication.clone()));
        Self::with_hub(config, hub)
    }

    /// Build a manager that registers its agents with an existing hub.
    pub fn with_hub(config: &AgoraConfig, hub: Arc<CommunicationHub>) -> Result<Self, ConfigError> {
        config.validate()?;
        let adjuster = WeightAdjuster::new(config.weights.clone()).map_err(|e| match e {
            WeightError::Config(inner) => inner,
            other => ConfigError::Invalid(other.to_string()),
        })?;

        info!(
            max_agents = config.manager.max_agents,
            method = %config.weights.adjustment_method,
            concurrent = config.manager.enable_concurrent_collection,
            "Agent manager ready"
        );

        Ok(Self {
            config: config.manager.clone(),
            weight_config: config.weights.clone(),
            state: Mutex::new(ManagerState {
                agents: HashMap::new(),
                statuses: HashMap::new(),
                performance: HashMap::new(),
                adjuster,
                decision_history: VecDeque::new(),
                last_rebalance: Utc::now(),
                total_decisions: 0,
                failed_decisions: 0,
                timed_out_decisions: 0,
                collection_rounds: 0,
            }),
            hub,
            pool: Arc::new(Semaphore::new(config.manager.max_agents)),
            busy: Arc::new(Mutex::new(HashSet::new())),
            tracker: TaskTracker::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn hub(&self) -> &Arc<CommunicationHub> {
        &self.hub
    }

    fn check_weight(&self, weight: f64) -> Result<(), RegistrationError> {
        let (min, max) = (self.weight_config.min_weight, self.weight_config.max_weight);
        if weight.is_nan() || weight < min || weight > max {
            return Err(RegistrationError::InvalidWeight { weight, min, max });
        }
        Ok(())
    }

    /// Add an agent with `weight` (the configured default if `None`).
    ///
    /// Nothing is changed when registration fails.
    pub fn register_agent(
        &self,
        agent: Arc<dyn Agent>,
        weight: Option<f64>,
        auto_start: bool,
    ) -> Result<(), RegistrationError> {
        let agent_id = agent.agent_id().to_string();
        let weight = weight.unwrap_or(self.config.default_weight);
        self.check_weight(weight)?;

        let mut state = self.lock();
        if state.agents.len() >= self.config.max_agents {
            warn!(agent = %agent_id, max = self.config.max_agents, "Agent registry full");
            return Err(RegistrationError::CapacityExceeded {
                max: self.config.max_agents,
            });
        }
        if state.agents.contains_key(&agent_id) {
            warn!(agent = %agent_id, "Duplicate agent registration");
            return Err(RegistrationError::DuplicateAgent(agent_id));
        }

        agent.set_active(auto_start);
        let status = if auto_start {
            AgentStatus::Active
        } else {
            AgentStatus::Inactive
        };
        state.statuses.insert(agent_id.clone(), status);
        state
            .performance
            .insert(agent_id.clone(), AgentPerformance::default());
        state.adjuster.set_weight(&agent_id, weight);
        state.agents.insert(agent_id.clone(), agent);
        self.hub.register(&agent_id);

        info!(agent = %agent_id, weight, auto_start, "Agent registered");
        Ok(())
    }

    /// Stop and remove an agent, purging its weight, history, counters and queue.
    pub fn unregister_agent(&self, agent_id: &str) -> bool {
        let mut state = self.lock();
        let Some(agent) = state.agents.remove(agent_id) else {
            return false;
        };
        agent.set_active(false);
        state.statuses.remove(agent_id);
        state.performance.remove(agent_id);
        state.adjuster.remove_agent(agent_id);
        self.hub.unregister(agent_id);

        info!(agent = %agent_id, "Agent unregistered");
        true
    }

    pub fn start_agent(&self, agent_id: &str) -> bool {
        self.set_running(agent_id, true)
    }

    pub fn stop_agent(&self, agent_id: &str) -> bool {
        self.set_running(agent_id, false)
    }

    fn set_running(&self, agent_id: &str, running: bool) -> bool {
        let mut state = self.lock();
        let Some(agent) = state.agents.get(agent_id).cloned() else {
            warn!(agent = %agent_id, "Unknown agent");
            return false;
        };
        agent.set_active(running);
        let status = if running {
            AgentStatus::Active
        } else {
            AgentStatus::Inactive
        };
        state.statuses.insert(agent_id.to_string(), status);
        info!(agent = %agent_id, running, "Agent state changed");
        true
    }

    pub fn registered_agents(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().agents.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn agent_status(&self, agent_id: &str) -> Option<AgentStatus> {
        self.lock().statuses.get(agent_id).copied()
    }

    pub fn agent_performance(&self, agent_id: &str) -> Option<AgentPerformance> {
        self.lock().performance.get(agent_id).cloned()
    }

    /// Ask every active agent for a decision and return the ones that answered in time.
    ///
    /// Agents that fail, panic or miss the deadline are marked [`AgentStatus::Error`]
    /// and left out; their calls are abandoned, not cancelled. An agent whose
    /// abandoned call is still running fails the round with [`AgentError::Busy`]
    /// instead of being called again. `timeout` defaults to `decision_timeout_ms`.
    pub async fn collect_decisions(
        &self,
        input: &MarketInput,
        timeout: Option<Duration>,
    ) -> Vec<Decision> {
        if self.tracker.is_closed() {
            warn!("Manager shut down, skipping collection");
            return Vec::new();
        }

        let timeout = timeout.unwrap_or(Duration::from_millis(self.config.decision_timeout_ms));
        let deadline = Instant::now() + timeout;

        let (round, active) = {
            let mut state = self.lock();
            state.collection_rounds += 1;
            let mut active: Vec<(Arc<dyn Agent>, f64)> = state
                .agents
                .iter()
                .filter(|(_, agent)| agent.is_active())
                .map(|(id, agent)| {
                    (Arc::clone(agent), state.adjuster.weight(id).unwrap_or(0.0))
                })
                .collect();
            active.sort_by(|a, b| a.0.agent_id().cmp(b.0.agent_id()));
            state.total_decisions += active.len() as u64;
            (state.collection_rounds, active)
        };

        if active.is_empty() {
            debug!(round, "No active agents");
            return Vec::new();
        }

        let start = Instant::now();
        info!(
            round,
            agents = active.len(),
            timeout_ms = timeout.as_millis() as u64,
            "Collecting decisions"
        );

        let (ready, mut outcomes) = self.claim(active);
        if !outcomes.is_empty() {
            debug!(round, busy = outcomes.len(), "Skipping agents with calls in flight");
        }

        let timeout_ms = timeout.as_millis() as u64;
        outcomes.extend(if self.config.enable_concurrent_collection {
            self.collect_concurrent(input, round, ready, deadline, timeout_ms).await
        } else {
            self.collect_sequential(input, round, ready, deadline, timeout_ms).await
        });

        let decisions = self.record_outcomes(outcomes);
        info!(
            round,
            decisions = decisions.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Collection complete"
        );
        decisions
    }

    /// Mark every idle agent busy; agents with a call still in flight fail with `Busy`.
    fn claim(&self, active: Vec<(Arc<dyn Agent>, f64)>) -> (Vec<Dispatch>, Vec<Outcome>) {
        let mut in_flight = self.busy.lock().unwrap_or_else(|e| e.into_inner());
        let mut ready = Vec::with_capacity(active.len());
        let mut skipped = Vec::new();
        for (agent, weight) in active {
            let agent_id = agent.agent_id().to_string();
            if !in_flight.insert(agent_id.clone()) {
                let err = AgentError::Busy(agent_id.clone());
                skipped.push((agent_id, Err(err), Duration::ZERO));
                continue;
            }
            let guard = BusyGuard {
                busy: Arc::clone(&self.busy),
                agent_id,
            };
            ready.push((agent, weight, guard));
        }
        (ready, skipped)
    }

    /// Run one agent's decision call on a tracked task, holding a pool permit,
    /// and send the outcome on `tx`.
    ///
    /// Nothing is sent when the pool was closed before a permit was granted or
    /// when the agent panics.
    fn spawn_decision(
        &self,
        (agent, weight, busy): Dispatch,
        input: &MarketInput,
        round: u64,
        tx: mpsc::UnboundedSender<Outcome>,
    ) -> JoinHandle<()> {
        let pool = Arc::clone(&self.pool);
        let input = input.clone();
        let context = round_context(round, weight);
        self.tracker.spawn(async move {
            let Ok(_permit) = pool.acquire_owned().await else {
                return;
            };
            let start = Instant::now();
            let result = agent.make_decision(&input, Some(&context)).await;
            // Clear the busy mark before reporting.
            drop(busy);
            let _ = tx.send((agent.agent_id().to_string(), result, start.elapsed()));
        })
    }

    async fn collect_concurrent(
        &self,
        input: &MarketInput,
        round: u64,
        ready: Vec<Dispatch>,
        deadline: Instant,
        timeout_ms: u64,
    ) -> Vec<Outcome> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Outcome>();
        let mut pending: HashSet<String> = HashSet::new();

        for dispatch in ready {
            pending.insert(dispatch.0.agent_id().to_string());
            self.spawn_decision(dispatch, input, round, tx.clone());
        }
        drop(tx);

        let mut outcomes = Vec::new();
        let mut timed_out = false;
        while !pending.is_empty() {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(outcome)) => {
                    pending.remove(&outcome.0);
                    outcomes.push(outcome);
                }
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    break;
                }
            }
        }

        let mut stragglers: Vec<String> = pending.into_iter().collect();
        stragglers.sort();
        for agent_id in stragglers {
            let err = if timed_out {
                AgentError::Timeout(timeout_ms)
            } else {
                AgentError::Panicked
            };
            outcomes.push((agent_id, Err(err), Duration::ZERO));
        }
        outcomes
    }

    async fn collect_sequential(
        &self,
        input: &MarketInput,
        round: u64,
        ready: Vec<Dispatch>,
        deadline: Instant,
        timeout_ms: u64,
    ) -> Vec<Outcome> {
        let mut outcomes = Vec::with_capacity(ready.len());
        for dispatch in ready {
            let agent_id = dispatch.0.agent_id().to_string();
            if Instant::now() >= deadline {
                outcomes.push((agent_id, Err(AgentError::Timeout(timeout_ms)), Duration::ZERO));
                continue;
            }

            let (tx, mut rx) = mpsc::unbounded_channel::<Outcome>();
            let handle = self.spawn_decision(dispatch, input, round, tx);
            let outcome = match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(())) => match rx.try_recv() {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        let err = AgentError::Inactive(agent_id.clone());
                        (agent_id, Err(err), Duration::ZERO)
                    }
                },
                Ok(Err(e)) => {
                    error!(agent = %agent_id, error = %e, "Agent task panicked");
                    (agent_id, Err(AgentError::Panicked), Duration::ZERO)
                }
                Err(_) => (agent_id, Err(AgentError::Timeout(timeout_ms)), Duration::ZERO),
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    fn record_outcomes(&self, outcomes: Vec<Outcome>) -> Vec<Decision> {
        let mut state = self.lock();
        let mut decisions = Vec::new();

        for (agent_id, result, elapsed) in outcomes {
            if !state.agents.contains_key(&agent_id) {
                debug!(agent = %agent_id, "Dropping outcome for unregistered agent");
                continue;
            }
            match result {
                Ok(decision) => {
                    info!(
                        agent = %agent_id,
                        action = ?decision.action,
                        confidence = decision.confidence,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Agent decided"
                    );
                    if let Some(perf) = state.performance.get_mut(&agent_id) {
                        perf.record_decision(&decision);
                    }
                    if state.statuses.get(&agent_id) == Some(&AgentStatus::Error) {
                        state.statuses.insert(agent_id.clone(), AgentStatus::Active);
                    }
                    let capacity = self.config.decision_history_size;
                    if capacity > 0 {
                        while state.decision_history.len() >= capacity {
                            state.decision_history.pop_front();
                        }
                        state.decision_history.push_back(decision.clone());
                    }
                    decisions.push(decision);
                }
                Err(e) => {
                    warn!(
                        agent = %agent_id,
                        error = %e,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Agent failed"
                    );
                    state.failed_decisions += 1;
                    if matches!(e, AgentError::Timeout(_)) {
                        state.timed_out_decisions += 1;
                    }
                    if let Some(perf) = state.performance.get_mut(&agent_id) {
                        perf.record_failure(&e);
                    }
                    // Agents stopped mid-round stay inactive.
                    if let Some(status) = state.statuses.get_mut(&agent_id) {
                        if *status != AgentStatus::Inactive {
                            *status = AgentStatus::Error;
                        }
                    }
                }
            }
        }
        decisions
    }

    /// The most recent decisions, oldest first.
    pub fn recent_decisions(&self, limit: usize) -> Vec<Decision> {
        let state = self.lock();
        let skip = state.decision_history.len().saturating_sub(limit);
        state.decision_history.iter().skip(skip).cloned().collect()
    }

    pub fn weights(&self) -> HashMap<String, f64> {
        self.lock().adjuster.current_weights().clone()
    }

    pub fn set_weight(&self, agent_id: &str, weight: f64) -> Result<(), RegistrationError> {
        self.check_weight(weight)?;
        let mut state = self.lock();
        if !state.agents.contains_key(agent_id) {
            return Err(RegistrationError::UnknownAgent(agent_id.to_string()));
        }
        state.adjuster.set_weight(agent_id, weight);
        Ok(())
    }

    /// Report a realized return for an agent's earlier decision.
    pub fn record_return(
        &self,
        agent_id: &str,
        decision_return: f64,
        position_size: f64,
        market_condition: MarketCondition,
    ) -> Result<PerformanceRecord, RegistrationError> {
        let mut state = self.lock();
        if !state.agents.contains_key(agent_id) {
            return Err(RegistrationError::UnknownAgent(agent_id.to_string()));
        }
        let confidence = state
            .performance
            .get(agent_id)
            .filter(|p| p.decisions > 0)
            .map_or(DEFAULT_CONFIDENCE, |p| p.avg_confidence);
        Ok(state.adjuster.record_return(
            agent_id,
            decision_return,
            confidence,
            position_size,
            market_condition,
        ))
    }

    /// Append a fully built performance record.
    pub fn record_performance(&self, record: PerformanceRecord) -> Result<(), RegistrationError> {
        let mut state = self.lock();
        if !state.agents.contains_key(&record.agent_id) {
            return Err(RegistrationError::UnknownAgent(record.agent_id));
        }
        state.adjuster.update_performance(record);
        Ok(())
    }

    pub fn performance_summary(&self, agent_id: &str, window: Option<usize>) -> Option<PerformanceSummary> {
        self.lock().adjuster.performance_summary(agent_id, window)
    }

    pub fn should_rebalance(&self) -> bool {
        let last = self.lock().last_rebalance;
        (Utc::now() - last).num_days() >= self.config.rebalance_frequency_days
    }

    pub fn last_rebalance(&self) -> DateTime<Utc> {
        self.lock().last_rebalance
    }

    /// Rescore every agent with the configured strategy and apply the new weights.
    ///
    /// Inactive agents score 0. Returns the recorded adjustments keyed by agent;
    /// empty when no rebalance is due and `force` is false.
    pub fn rebalance_weights(&self, force: bool) -> HashMap<String, WeightAdjustment> {
        if !force && !self.should_rebalance() {
            debug!("Rebalance not due");
            return HashMap::new();
        }

        let mut state = self.lock();
        let mut active = Vec::new();
        let mut inactive = Vec::new();
        for (id, agent) in &state.agents {
            if agent.is_active() {
                active.push(id.clone());
            } else {
                inactive.push(id.clone());
            }
        }

        let mut scores = state.adjuster.score_agents(&active);
        scores.extend(inactive.into_iter().map(|id| (id, 0.0)));
        let adjustments = state.adjuster.apply_scores(&scores);
        state.last_rebalance = Utc::now();

        info!(
            agents = scores.len(),
            adjusted = adjustments.len(),
            forced = force,
            "Weights rebalanced"
        );
        adjustments
            .into_iter()
            .map(|a| (a.agent_id.clone(), a))
            .collect()
    }

    /// Rebalance from performance summaries: `0.5*sharpe + 0.3*win_rate - 0.2*|drawdown|`, floored at 0.
    ///
    /// Uses the agent's own summary when it has one, otherwise the summary derived
    /// from its reported returns. Zero total falls back to equal weights.
    pub fn rebalance_from_summaries(&self, window_days: u32) -> HashMap<String, f64> {
        let mut state = self.lock();

        let mut scores: HashMap<String, f64> = HashMap::new();
        for (id, agent) in &state.agents {
            let score = if agent.is_active() {
                agent
                    .performance_summary(window_days)
                    .or_else(|| state.adjuster.performance_summary(id, Some(window_days as usize)))
                    .map_or(0.0, |s| summary_score(&s))
            } else {
                0.0
            };
            scores.insert(id.clone(), score);
        }

        let total: f64 = scores.values().sum();
        let mut weights: HashMap<String, f64> = if total > 0.0 {
            scores
                .iter()
                .map(|(id, score)| (id.clone(), score / total))
                .collect()
        } else {
            debug!("No performance information, using equal weights");
            equal_weights(scores.keys())
        };
        apply_constraints(
            &mut weights,
            self.weight_config.min_weight,
            self.weight_config.max_weight,
        );

        for (id, weight) in &weights {
            state.adjuster.set_weight(id, *weight);
        }
        state.last_rebalance = Utc::now();
        info!(agents = weights.len(), window_days, "Weights rebalanced from summaries");
        weights
    }

    pub fn adjustment_history(&self) -> Vec<WeightAdjustment> {
        self.lock().adjuster.adjustment_history().to_vec()
    }

    /// Send a direct copy to every active agent except the sender.
    ///
    /// Returns how many agents were reached; individual failures are logged.
    pub fn broadcast(
        &self,
        message_type: &str,
        content: serde_json::Value,
        sender_id: Option<&str>,
        priority: i32,
    ) -> usize {
        let sender = sender_id.unwrap_or(MANAGER_SENDER);
        let mut recipients: Vec<String> = self
            .lock()
            .agents
            .iter()
            .filter(|(id, agent)| agent.is_active() && id.as_str() != sender)
            .map(|(id, _)| id.clone())
            .collect();
        recipients.sort();

        let mut reached = 0;
        for recipient in recipients {
            let message = Message::direct(sender, recipient.as_str(), message_type, content.clone())
                .with_priority(priority);
            match self.hub.deliver(message) {
                Ok(_) => reached += 1,
                Err(e) => warn!(agent = %recipient, error = %e, "Broadcast delivery failed"),
            }
        }
        debug!(message_type, sender, reached, "Manager broadcast");
        reached
    }

    pub fn get_manager_status(&self) -> ManagerStatus {
        let state = self.lock();
        let count = |wanted: AgentStatus| state.statuses.values().filter(|s| **s == wanted).count();

        ManagerStatus {
            total_agents: state.agents.len(),
            active_agents: count(AgentStatus::Active),
            error_agents: count(AgentStatus::Error),
            max_agents: self.config.max_agents,
            statuses: state.statuses.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            weights: state
                .adjuster
                .current_weights()
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            performance: state
                .performance
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            total_decisions: state.total_decisions,
            failed_decisions: state.failed_decisions,
            timed_out_decisions: state.timed_out_decisions,
            collection_rounds: state.collection_rounds,
            last_rebalance: state.last_rebalance,
            adjustment_method: state.adjuster.method(),
            weight_statistics: state.adjuster.weight_statistics(),
            communication: self.hub.get_communication_stats(),
        }
    }

    /// Stop every agent, refuse further rounds and wait for in-flight decision calls.
    pub async fn shutdown(&self) {
        let agents: Vec<Arc<dyn Agent>> = {
            let mut state = self.lock();
            for status in state.statuses.values_mut() {
                *status = AgentStatus::Inactive;
            }
            state.agents.values().cloned().collect()
        };
        for agent in &agents {
            agent.set_active(false);
        }

        self.tracker.close();
        self.pool.close();
        info!(agents = agents.len(), in_flight = self.tracker.len(), "Shutting down");
        self.tracker.wait().await;
        info!("Agent manager stopped");
    }
}

fn round_context(round: u64, weight: f64) -> serde_json::Value {
    serde_json::json!({ "round": round, "weight": weight })
}

fn summary_score(summary: &PerformanceSummary) -> f64 {
    (0.5 * summary.sharpe_ratio + 0.3 * summary.win_rate - 0.2 * summary.max_drawdown.abs()).max(0.0)
}
