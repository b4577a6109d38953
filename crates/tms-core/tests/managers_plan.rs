//! Functional tests for the agent and workflow managers.
//!
//! Both managers are state machines over a fixed roster. Lookups of unknown
//! ids are logged and ignored rather than raised, while starting twice is a
//! no-op.

use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use tms_core::{AgentState, ExecutionOutcome, WorkflowError, WorkflowState, MAX_SUCCESS_RATE};
use tms_kernel::{LogLevel, LogManager};
use tms_test_utils::{
    agent_manager, orchestrator, quiet_log, InstantAgentRunner, ScriptedWorkflowRunner,
};

/// Tenet: once started with healthy runners, all ten agents are running.
#[tokio::test(start_paused = true)]
async fn every_agent_runs_after_start() {
    let log = quiet_log();
    let manager = agent_manager(InstantAgentRunner::new(), &log);
    manager.start().await;

    let status = manager.status();
    assert_eq!(status.total_agents, 10);
    assert_eq!(status.running_agents.len(), 10);
    assert!(status.all_agents_running);
    assert!(status.failed_agents.is_empty());
    assert!(manager
        .agents()
        .iter()
        .all(|a| a.is_running && a.status == AgentState::Running && a.last_activity.is_some()));
}

/// Tenet: a second start is a no-op for both managers.
#[tokio::test(start_paused = true)]
async fn start_is_idempotent() {
    let log = quiet_log();
    let agents = agent_manager(InstantAgentRunner::new(), &log);
    agents.start().await;
    let before = log.logs_by_level(LogLevel::Success).len();
    agents.start().await;
    assert_eq!(log.logs_by_level(LogLevel::Success).len(), before);
    assert!(log
        .logs()
        .iter()
        .any(|e| e.message == "Agent manager is already running"));

    let workflows = orchestrator(ScriptedWorkflowRunner::new(), &log);
    workflows.start().await;
    workflows.start().await;
    assert!(workflows.is_running());
    assert_eq!(workflows.status().active_workflows.len(), 8);
    assert!(log
        .logs()
        .iter()
        .any(|e| e.message == "Workflow orchestrator is already running"));
}

/// Tenet: unknown ids are logged, never raised, and change nothing.
#[tokio::test(start_paused = true)]
async fn unknown_ids_are_ignored() {
    let log = quiet_log();
    let agents = agent_manager(InstantAgentRunner::new(), &log);
    let workflows = orchestrator(ScriptedWorkflowRunner::new(), &log);
    let agents_before = agents.agents();
    let workflows_before = workflows.workflows();

    agents.start_agent("no-such-agent").await;
    agents.stop_agent("no-such-agent").await;
    workflows.activate_workflow("no-such-workflow");
    workflows.deactivate_workflow("no-such-workflow");

    assert_eq!(agents.agents(), agents_before);
    assert_eq!(workflows.workflows(), workflows_before);
    assert!(agents.remove_agent("no-such-agent").await.is_none());
    assert_eq!(
        log.logs_by_level(LogLevel::Error)
            .iter()
            .filter(|e| e.message.contains("not found"))
            .count(),
        5
    );
}

/// Tenet: executing a workflow that is not active, including one that was
/// never registered, fails without touching any counters.
#[tokio::test(start_paused = true)]
async fn inactive_workflow_rejects_execution() {
    let log = quiet_log();
    let workflows = orchestrator(ScriptedWorkflowRunner::new(), &log);

    let err = workflows
        .execute_workflow("load-booking", &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::NotActive(_)));
    assert!(err.to_string().contains("Workflow is not active"));

    let unknown = workflows
        .execute_workflow("x", &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(unknown, WorkflowError::NotActive(_)));
    assert!(unknown.to_string().contains("Workflow is not active"));
    assert!(workflows.workflow("x").is_none());

    let workflow = workflows.workflow("load-booking").unwrap();
    assert_eq!(workflow.execution_count, 0);
    assert_eq!(workflow.success_rate, MAX_SUCCESS_RATE);
}

/// Tenet: success rates move by fixed steps and stay within 0..=100.
#[tokio::test(start_paused = true)]
async fn success_rate_tracks_outcomes() {
    let log = quiet_log();
    let runner = ScriptedWorkflowRunner::new()
        .then_outcome(ExecutionOutcome::Failed {
            reason: "carrier declined".to_string(),
        })
        .then_error("timeout")
        .then_outcome(ExecutionOutcome::Succeeded);
    let workflows = orchestrator(runner, &log);
    workflows.start().await;

    let data = json!({ "load": "L-1" });
    let first = workflows.execute_workflow("rate-quote", &data).await.unwrap();
    assert!(!first.is_success());
    assert_eq!(workflows.workflow("rate-quote").unwrap().success_rate, 98);

    assert!(workflows.execute_workflow("rate-quote", &data).await.is_err());
    let errored = workflows.workflow("rate-quote").unwrap();
    assert_eq!(errored.success_rate, 93);
    assert_eq!(errored.status, WorkflowState::Error);
    assert_eq!(workflows.status().failed_workflows, vec!["rate-quote".to_string()]);

    assert_eq!(workflows.recover_failed_workflows().await, 1);
    assert!(workflows.status().all_workflows_healthy);

    workflows.execute_workflow("rate-quote", &data).await.unwrap();
    let recovered = workflows.workflow("rate-quote").unwrap();
    assert_eq!(recovered.success_rate, 94);
    assert_eq!(recovered.execution_count, 3);
    assert_eq!(recovered.status, WorkflowState::Active);
}

/// Tenet: a failed agent stays in error until a restart finds it healthy.
#[tokio::test(start_paused = true)]
async fn failed_agent_recovers_after_heal() {
    let log = quiet_log();
    let runner = Arc::new(InstantAgentRunner::failing(["route-planner"]));
    let manager = tms_core::AutonomousAgentManager::new(
        Arc::clone(&runner) as Arc<dyn tms_core::AgentRunner>,
        &log,
        tms_core::AgentManagerConfig::from_settings(&tms_test_utils::fast_config().agents),
    );
    manager.initialize();
    manager.start().await;

    assert_eq!(manager.status().failed_agents, vec!["route-planner".to_string()]);
    assert_eq!(manager.restart_failed_agents().await, 1);
    assert_eq!(
        manager.agent("route-planner").unwrap().status,
        AgentState::Error
    );

    runner.heal("route-planner");
    assert_eq!(manager.restart_failed_agents().await, 1);
    assert!(manager.status().all_agents_running);
    assert_eq!(manager.restart_failed_agents().await, 0);
}

/// Tenet: the log keeps only the newest entries up to its capacity.
#[test]
fn log_ring_is_bounded() {
    let log = LogManager::shared(1000);
    let scope = log.scope("ring");
    for i in 0..1001 {
        scope.info(format!("entry {i}"));
    }

    assert_eq!(log.len(), 1000);
    let logs = log.logs();
    assert_eq!(logs[0].message, "entry 1");
    assert_eq!(logs[999].message, "entry 1000");
    assert_eq!(log.recent(2).len(), 2);
    assert_eq!(log.logs_from("ring").len(), 1000);
}
