//! End-to-end manager scenarios using mock agents.
//!
//! Each test builds a manager from an in-code config, registers a handful of
//! `MockAgent`s with known behavior, then drives collection, messaging and
//! rebalancing through the public API.

use std::time::{Duration, Instant};

use agora_agents::test_support::MockAgent;
use agora_agents::{Agent, AgentManager, RegistrationError};
use agora_models::config::{AdjustmentMethod, AgoraConfig};
use agora_models::{
    priority, AgentStatus, MarketCondition, MarketInput, PerformanceRecord, PerformanceSummary,
};
use approx::assert_abs_diff_eq;

const ROUND_TIMEOUT: Option<Duration> = Some(Duration::from_secs(5));

fn manager_with(configure: impl FnOnce(&mut AgoraConfig)) -> AgentManager {
    let mut config = AgoraConfig::default();
    configure(&mut config);
    AgentManager::new(&config).unwrap()
}

fn manager() -> AgentManager {
    manager_with(|_| {})
}

fn input() -> MarketInput {
    MarketInput::for_symbol("AAPL", serde_json::json!({ "close": 187.3 }))
}

fn weight_sum(manager: &AgentManager) -> f64 {
    manager.weights().values().sum()
}

#[test]
fn duplicate_registration_keeps_original_weight() {
    let manager = manager();
    manager
        .register_agent(MockAgent::buying("a").shared(), Some(0.3), true)
        .unwrap();

    let err = manager
        .register_agent(MockAgent::buying("a").shared(), Some(0.5), false)
        .unwrap_err();
    assert_eq!(err, RegistrationError::DuplicateAgent("a".to_string()));

    assert_eq!(manager.registered_agents(), vec!["a".to_string()]);
    assert_eq!(manager.weights()["a"], 0.3);
    assert_eq!(manager.agent_status("a"), Some(AgentStatus::Active));
}

#[test]
fn registry_capacity_is_enforced() {
    let manager = manager_with(|c| c.manager.max_agents = 2);
    manager.register_agent(MockAgent::buying("a").shared(), None, true).unwrap();
    manager.register_agent(MockAgent::buying("b").shared(), None, true).unwrap();

    let err = manager
        .register_agent(MockAgent::buying("c").shared(), None, true)
        .unwrap_err();
    assert_eq!(err, RegistrationError::CapacityExceeded { max: 2 });
    assert!(!manager.hub().is_registered("c"));
}

#[test]
fn out_of_range_weight_is_rejected() {
    let manager = manager();
    let err = manager
        .register_agent(MockAgent::buying("a").shared(), Some(0.95), true)
        .unwrap_err();
    assert!(matches!(err, RegistrationError::InvalidWeight { .. }));
    assert!(manager.registered_agents().is_empty());

    manager.register_agent(MockAgent::buying("a").shared(), None, true).unwrap();
    assert!(matches!(
        manager.set_weight("a", 0.0),
        Err(RegistrationError::InvalidWeight { .. })
    ));
    assert!(matches!(
        manager.set_weight("zzz", 0.2),
        Err(RegistrationError::UnknownAgent(_))
    ));
    manager.set_weight("a", 0.4).unwrap();
    assert_eq!(manager.weights()["a"], 0.4);
}

#[tokio::test]
async fn failing_agent_does_not_spoil_the_round() {
    let manager = manager();
    manager.register_agent(MockAgent::buying("a").shared(), None, true).unwrap();
    manager.register_agent(MockAgent::failing("b").shared(), None, true).unwrap();
    manager.register_agent(MockAgent::buying("c").shared(), None, true).unwrap();

    let decisions = manager.collect_decisions(&input(), ROUND_TIMEOUT).await;
    let mut ids: Vec<&str> = decisions.iter().map(|d| d.agent_id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["a", "c"]);

    assert_eq!(manager.agent_status("a"), Some(AgentStatus::Active));
    assert_eq!(manager.agent_status("b"), Some(AgentStatus::Error));
    assert_eq!(manager.agent_status("c"), Some(AgentStatus::Active));

    let status = manager.get_manager_status();
    assert_eq!(status.total_decisions, 3);
    assert_eq!(status.failed_decisions, 1);
    assert_eq!(status.error_agents, 1);
    assert_eq!(manager.agent_performance("b").unwrap().failures, 1);
}

#[tokio::test]
async fn slow_agent_is_abandoned_at_the_deadline() {
    let manager = manager();
    manager.register_agent(MockAgent::buying("fast").shared(), None, true).unwrap();
    manager
        .register_agent(MockAgent::slow("slow", Duration::from_secs(10)).shared(), None, true)
        .unwrap();

    let started = Instant::now();
    let decisions = manager
        .collect_decisions(&input(), Some(Duration::from_millis(100)))
        .await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].agent_id, "fast");
    assert_eq!(manager.agent_status("slow"), Some(AgentStatus::Error));

    let perf = manager.agent_performance("slow").unwrap();
    assert_eq!(perf.timeouts, 1);
    assert_eq!(manager.get_manager_status().timed_out_decisions, 1);
}

#[tokio::test]
async fn stuck_agent_is_not_called_again_while_its_call_runs() {
    for concurrent in [true, false] {
        let manager = manager_with(|c| {
            c.manager.max_agents = 2;
            c.manager.enable_concurrent_collection = concurrent;
        });
        let stuck = MockAgent::slow("stuck", Duration::from_secs(30)).shared();
        manager.register_agent(MockAgent::buying("fast").shared(), None, true).unwrap();
        manager.register_agent(stuck.clone(), None, true).unwrap();

        for round in 1..=4 {
            let decisions = manager
                .collect_decisions(&input(), Some(Duration::from_millis(100)))
                .await;
            assert_eq!(decisions.len(), 1, "round {round}, concurrent={concurrent}");
            assert_eq!(decisions[0].agent_id, "fast");
            assert_eq!(manager.agent_status("fast"), Some(AgentStatus::Active));
        }

        assert_eq!(stuck.calls(), 1);
        assert_eq!(manager.agent_status("stuck"), Some(AgentStatus::Error));
        let perf = manager.agent_performance("stuck").unwrap();
        assert_eq!(perf.timeouts, 1);
        assert_eq!(perf.failures, 3);
        assert_eq!(
            perf.last_error.as_deref(),
            Some("Previous decision still running: stuck")
        );
    }
}

#[tokio::test]
async fn finished_agent_is_called_again_next_round() {
    let manager = manager();
    let agent = MockAgent::slow("steady", Duration::from_millis(20)).shared();
    manager.register_agent(agent.clone(), None, true).unwrap();

    for _ in 0..3 {
        let decisions = manager.collect_decisions(&input(), ROUND_TIMEOUT).await;
        assert_eq!(decisions.len(), 1);
    }
    assert_eq!(agent.calls(), 3);
    assert_eq!(manager.agent_performance("steady").unwrap().failures, 0);
}

#[tokio::test]
async fn panicking_agent_is_isolated() {
    let manager = manager();
    manager.register_agent(MockAgent::buying("ok").shared(), None, true).unwrap();
    manager.register_agent(MockAgent::panicking("boom").shared(), None, true).unwrap();

    let decisions = manager.collect_decisions(&input(), ROUND_TIMEOUT).await;
    assert_eq!(decisions.len(), 1);
    assert_eq!(manager.agent_status("boom"), Some(AgentStatus::Error));
    assert_eq!(manager.agent_status("ok"), Some(AgentStatus::Active));
}

#[tokio::test]
async fn sequential_collection_shares_one_deadline() {
    let delay = Duration::from_millis(200);
    let timeout = Some(Duration::from_millis(300));

    let sequential = manager_with(|c| c.manager.enable_concurrent_collection = false);
    let concurrent = manager();
    for m in [&sequential, &concurrent] {
        m.register_agent(MockAgent::slow("a", delay).shared(), None, true).unwrap();
        m.register_agent(MockAgent::slow("b", delay).shared(), None, true).unwrap();
    }

    let decisions = sequential.collect_decisions(&input(), timeout).await;
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].agent_id, "a");
    assert_eq!(sequential.agent_status("b"), Some(AgentStatus::Error));

    let decisions = concurrent.collect_decisions(&input(), timeout).await;
    assert_eq!(decisions.len(), 2);
}

#[tokio::test]
async fn inactive_agents_are_not_asked() {
    let manager = manager();
    let idle = MockAgent::buying("idle").shared();
    manager.register_agent(idle.clone(), None, false).unwrap();
    assert_eq!(manager.agent_status("idle"), Some(AgentStatus::Inactive));

    assert!(manager.collect_decisions(&input(), ROUND_TIMEOUT).await.is_empty());
    assert_eq!(idle.calls(), 0);

    assert!(manager.start_agent("idle"));
    assert_eq!(manager.collect_decisions(&input(), ROUND_TIMEOUT).await.len(), 1);
    assert_eq!(idle.calls(), 1);

    assert!(manager.stop_agent("idle"));
    assert!(!manager.start_agent("missing"));
    assert!(!manager.stop_agent("missing"));
}

#[tokio::test]
async fn decisions_carry_round_context() {
    let manager = manager();
    manager
        .register_agent(MockAgent::buying("a").shared(), Some(0.25), true)
        .unwrap();

    manager.collect_decisions(&input(), ROUND_TIMEOUT).await;
    let decisions = manager.collect_decisions(&input(), ROUND_TIMEOUT).await;
    assert_eq!(decisions[0].metadata["round"], 2);
    assert_eq!(decisions[0].metadata["weight"], 0.25);
}

#[tokio::test]
async fn confidence_average_and_returns() {
    let manager = manager();
    manager
        .register_agent(
            MockAgent::buying("a").with_confidences(&[0.8, 0.4]).shared(),
            None,
            true,
        )
        .unwrap();

    manager.collect_decisions(&input(), ROUND_TIMEOUT).await;
    manager.collect_decisions(&input(), ROUND_TIMEOUT).await;
    let perf = manager.agent_performance("a").unwrap();
    assert_eq!(perf.decisions, 2);
    assert_abs_diff_eq!(perf.avg_confidence, 0.76, epsilon = 1e-12);

    let record = manager
        .record_return("a", 0.03, 1.0, MarketCondition::Bull)
        .unwrap();
    assert_abs_diff_eq!(record.confidence, 0.76, epsilon = 1e-12);
    assert!(matches!(
        manager.record_return("nobody", 0.01, 1.0, MarketCondition::Bull),
        Err(RegistrationError::UnknownAgent(_))
    ));
}

#[tokio::test]
async fn decision_history_is_bounded() {
    let manager = manager_with(|c| c.manager.decision_history_size = 3);
    manager.register_agent(MockAgent::buying("a").shared(), None, true).unwrap();
    for _ in 0..5 {
        manager.collect_decisions(&input(), ROUND_TIMEOUT).await;
    }
    assert_eq!(manager.recent_decisions(10).len(), 3);
    assert_eq!(manager.recent_decisions(2).len(), 2);
}

#[test]
fn better_performer_gains_weight_on_rebalance() {
    let manager = manager_with(|c| c.weights.adjustment_method = AdjustmentMethod::PerformanceBased);
    manager.register_agent(MockAgent::buying("a").shared(), Some(0.5), true).unwrap();
    manager.register_agent(MockAgent::buying("b").shared(), Some(0.5), true).unwrap();

    let a_returns = [0.03, 0.01, 0.02, 0.04, 0.0, 0.02, 0.03, 0.01, 0.02, 0.02];
    let b_returns = [-0.02, 0.0, -0.01, -0.03, 0.01, -0.01, 0.0, -0.02, 0.0, -0.02];
    for (a, b) in a_returns.iter().zip(b_returns.iter()) {
        manager.record_performance(PerformanceRecord::from_return("a", *a)).unwrap();
        manager.record_performance(PerformanceRecord::from_return("b", *b)).unwrap();
    }

    let adjustments = manager.rebalance_weights(true);
    let weights = manager.weights();
    assert!(weights["a"] > weights["b"]);
    assert_abs_diff_eq!(weight_sum(&manager), 1.0, epsilon = 1e-9);
    assert!(adjustments.contains_key("a"));
    assert_eq!(adjustments["a"].old_weight, 0.5);
    assert_eq!(manager.adjustment_history().len(), adjustments.len());
}

#[test]
fn rebalanced_weights_respect_bounds_for_every_method() {
    for method in [
        AdjustmentMethod::PerformanceBased,
        AdjustmentMethod::RiskAdjusted,
        AdjustmentMethod::SharpeRatio,
        AdjustmentMethod::KellyCriterion,
        AdjustmentMethod::MachineLearning,
        AdjustmentMethod::Ensemble,
    ] {
        let manager = manager_with(|c| {
            c.weights.adjustment_method = method;
            c.weights.min_weight = 0.05;
            c.weights.max_weight = 0.5;
        });
        for id in ["a", "b", "c", "d"] {
            manager.register_agent(MockAgent::buying(id).shared(), None, true).unwrap();
        }
        for i in 0..20 {
            let r = (i as f64 * 0.7).sin() * 0.02;
            manager.record_performance(PerformanceRecord::from_return("a", r + 0.01)).unwrap();
            manager.record_performance(PerformanceRecord::from_return("b", r)).unwrap();
            manager.record_performance(PerformanceRecord::from_return("c", -r.abs())).unwrap();
        }
        manager.stop_agent("d");

        manager.rebalance_weights(true);
        assert_abs_diff_eq!(weight_sum(&manager), 1.0, epsilon = 1e-9);
        for (id, w) in manager.weights() {
            assert!((0.05 - 1e-9..=0.5 + 1e-9).contains(&w), "{method} {id}: {w}");
        }
    }
}

#[test]
fn rebalance_waits_for_the_schedule() {
    let manager = manager();
    manager.register_agent(MockAgent::buying("a").shared(), None, true).unwrap();
    assert!(!manager.should_rebalance());
    assert!(manager.rebalance_weights(false).is_empty());
    assert_eq!(manager.weights()["a"], 0.1);

    let due = manager_with(|c| c.manager.rebalance_frequency_days = 0);
    assert!(due.should_rebalance());
}

#[test]
fn rebalance_from_summaries_uses_the_score_formula() {
    let manager = manager();
    let strong = PerformanceSummary {
        sharpe_ratio: 1.0,
        win_rate: 0.6,
        max_drawdown: -0.1,
        ..PerformanceSummary::default()
    };
    let weak = PerformanceSummary {
        sharpe_ratio: -1.5,
        win_rate: 0.3,
        max_drawdown: -0.4,
        ..PerformanceSummary::default()
    };
    manager
        .register_agent(MockAgent::buying("a").with_summary(strong).shared(), None, true)
        .unwrap();
    manager
        .register_agent(MockAgent::buying("b").with_summary(weak).shared(), None, true)
        .unwrap();
    manager.register_agent(MockAgent::buying("c").shared(), None, false).unwrap();

    let weights = manager.rebalance_from_summaries(30);
    // a alone scores; capped at 0.8 and the rest shared by b and c.
    assert_abs_diff_eq!(weights["a"], 0.8, epsilon = 1e-9);
    assert_abs_diff_eq!(weights["b"], 0.1, epsilon = 1e-9);
    assert_abs_diff_eq!(weights["c"], 0.1, epsilon = 1e-9);
    assert_eq!(manager.weights(), weights);
}

#[test]
fn rebalance_from_summaries_without_information_is_equal() {
    let manager = manager();
    for id in ["a", "b", "c"] {
        manager.register_agent(MockAgent::buying(id).shared(), None, true).unwrap();
    }
    let weights = manager.rebalance_from_summaries(30);
    for w in weights.values() {
        assert_abs_diff_eq!(*w, 1.0 / 3.0, epsilon = 1e-12);
    }
}

#[test]
fn manager_broadcast_skips_sender_and_inactive() {
    let manager = manager();
    for id in ["a", "b", "c"] {
        manager.register_agent(MockAgent::buying(id).shared(), None, true).unwrap();
    }
    manager.register_agent(MockAgent::buying("d").shared(), None, false).unwrap();

    let reached = manager.broadcast(
        "signal",
        serde_json::json!({ "bias": "long" }),
        Some("a"),
        priority::HIGH,
    );
    assert_eq!(reached, 2);

    let hub = manager.hub();
    assert_eq!(hub.get_queue_status("a").unwrap().size, 0);
    assert_eq!(hub.get_queue_status("d").unwrap().size, 0);
    let message = hub.try_receive("b").unwrap();
    assert_eq!(message.sender_id, "a");
    assert_eq!(message.receiver_id.as_deref(), Some("b"));
    assert_eq!(message.priority, priority::HIGH);

    assert_eq!(manager.broadcast("tick", serde_json::Value::Null, None, priority::LOW), 3);
    assert_eq!(hub.try_receive("a").unwrap().sender_id, "manager");
}

#[test]
fn unregister_purges_everything() {
    let manager = manager();
    let agent = MockAgent::buying("a").shared();
    manager.register_agent(agent.clone(), Some(0.2), true).unwrap();
    manager.record_return("a", 0.01, 1.0, MarketCondition::Sideways).unwrap();
    manager.broadcast("hello", serde_json::Value::Null, None, priority::NORMAL);
    assert_eq!(manager.hub().get_queue_status("a").unwrap().size, 1);

    assert!(manager.unregister_agent("a"));
    assert!(!manager.unregister_agent("a"));

    assert!(!agent.is_active());
    assert!(manager.agent_status("a").is_none());
    assert!(manager.agent_performance("a").is_none());
    assert!(!manager.weights().contains_key("a"));
    assert!(manager.performance_summary("a", None).is_none());
    assert!(!manager.hub().is_registered("a"));
}

#[test]
fn unregister_keeps_rebalanced_weights_normalized() {
    let manager = manager_with(|c| c.weights.adjustment_method = AdjustmentMethod::PerformanceBased);
    for (id, r) in [("a", 0.02), ("b", 0.01), ("c", -0.01)] {
        manager.register_agent(MockAgent::buying(id).shared(), None, true).unwrap();
        for _ in 0..5 {
            manager.record_performance(PerformanceRecord::from_return(id, r)).unwrap();
        }
    }

    manager.rebalance_weights(true);
    assert_abs_diff_eq!(weight_sum(&manager), 1.0, epsilon = 1e-9);

    assert!(manager.unregister_agent("a"));
    let weights = manager.weights();
    assert_eq!(weights.len(), 2);
    assert_abs_diff_eq!(weight_sum(&manager), 1.0, epsilon = 1e-9);
    assert!(weights["b"] > weights["c"]);
}

#[tokio::test]
async fn shutdown_waits_and_refuses_new_rounds() {
    let manager = manager();
    let slow = MockAgent::slow("slow", Duration::from_millis(150)).shared();
    manager.register_agent(slow.clone(), None, true).unwrap();

    // Abandon the call, then shut down while it is still running.
    let decisions = manager
        .collect_decisions(&input(), Some(Duration::from_millis(10)))
        .await;
    assert!(decisions.is_empty());

    let started = Instant::now();
    manager.shutdown().await;
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert_eq!(slow.calls(), 1);

    assert!(manager.collect_decisions(&input(), ROUND_TIMEOUT).await.is_empty());
    assert_eq!(manager.agent_status("slow"), Some(AgentStatus::Inactive));
}
