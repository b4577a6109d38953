//! Functional tests for the controller's supervision semantics.
//!
//! These tests drive `AutonomousTmsController` on a paused tokio clock:
//! - Initialization is ordered and fail-fast.
//! - Loop failures spend a bounded restart budget, then the system stops.
//! - Health issues are mapped to recovery actions inside the loop.

use std::time::Duration;
use tms_core::{ControllerState, HealthIssue, Priority, RecoveryAction, SystemMetrics};
use tms_kernel::{CircuitState, Environment, LogLevel};
use tms_test_utils::{
    fast_config, test_controller, test_controller_with, InstantAgentRunner, ScriptedMetricsSource,
};

/// Tenet: after exactly `max_restarts` consecutive loop failures the
/// controller stops and makes no further restart attempts.
#[tokio::test(start_paused = true)]
async fn bounded_retry_then_stop() {
    let controller = test_controller(ScriptedMetricsSource::failing());
    controller.initialize().await.unwrap();
    controller.start().await.unwrap();

    tokio::time::timeout(Duration::from_secs(30 * 60), controller.wait())
        .await
        .expect("circuit breaker should end the loop");

    assert_eq!(controller.state(), ControllerState::Stopped);
    assert_eq!(controller.restart_count(), 5);
    assert_eq!(controller.status().circuit, CircuitState::Open);
    assert!(!controller.parts().agents.is_running());
    assert!(!controller.parts().workflows.is_running());

    let alerts = controller.parts().notifications.by_type("circuit_breaker_open");
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].priority, Priority::Critical);

    tokio::time::sleep(Duration::from_secs(10 * 60)).await;
    assert_eq!(controller.restart_count(), 5, "no restarts once the circuit is open");
}

/// Tenet: a failure that clears before the budget is spent leaves the
/// controller running.
#[tokio::test(start_paused = true)]
async fn transient_failure_restarts_once() {
    let source = ScriptedMetricsSource::healthy().then_fail();
    let controller = test_controller(source);
    controller.initialize().await.unwrap();
    controller.start().await.unwrap();

    // First poll at 30 s fails, restart takes 5 s, later polls are healthy
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(controller.restart_count(), 1);
    assert_eq!(controller.state(), ControllerState::Running);
    assert_eq!(controller.status().circuit, CircuitState::Closed);
    assert!(controller.parts().agents.status().all_agents_running);

    controller.stop().await.unwrap();
    controller.wait().await;
}

/// Tenet: initialization errors escape to the caller and nothing is started.
#[tokio::test(start_paused = true)]
async fn production_without_database_url_is_fatal() {
    let mut config = fast_config();
    config.environment = Environment::Production;
    let controller =
        test_controller_with(ScriptedMetricsSource::healthy(), InstantAgentRunner::new(), &config);

    let err = controller.initialize().await.unwrap_err();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("database"));
    assert_eq!(controller.state(), ControllerState::NotInitialized);
    assert!(controller.parts().agents.agents().is_empty());
}

/// Tenet: failed agents found by a poll are restarted in that poll.
#[tokio::test(start_paused = true)]
async fn poll_restarts_failed_agents() {
    let agents = InstantAgentRunner::failing(["load-matcher"]);
    let controller =
        test_controller_with(ScriptedMetricsSource::healthy(), agents, &fast_config());
    controller.initialize().await.unwrap();
    controller.start().await.unwrap();

    let status = controller.parts().agents.status();
    assert_eq!(status.failed_agents, vec!["load-matcher".to_string()]);
    assert!(!status.all_agents_running);

    let report = controller.monitor_once().await.unwrap();
    assert_eq!(report.agents_restarted, 1);
    assert_eq!(controller.parts().agents.status().running_agents.len(), 9);

    controller.stop().await.unwrap();
}

/// Tenet: an unhealthy sample runs the handler for each reported issue.
#[tokio::test(start_paused = true)]
async fn unhealthy_sample_triggers_recovery() {
    let high_memory = SystemMetrics {
        memory_usage: 97.0,
        database_reachable: false,
        ..SystemMetrics::default()
    };
    let controller = test_controller(ScriptedMetricsSource::healthy().then(high_memory));
    controller.initialize().await.unwrap();

    let report = controller.monitor_once().await.unwrap();
    assert!(!report.health.is_healthy);
    assert!(report.health.issues.contains(&HealthIssue::MemoryHigh));
    assert!(report.health.issues.contains(&HealthIssue::DatabaseConnection));
    assert!(report.recovery.contains(&RecoveryAction::DatabaseReconnected));
    assert!(report
        .recovery
        .contains(&RecoveryAction::MemoryReclaimed { hook_ran: false }));
    assert!(controller.parts().database.is_connected());
}

/// Tenet: the log buffer tells the story of a give-up and survives export.
#[tokio::test(start_paused = true)]
async fn give_up_is_recorded_in_exported_log() {
    let controller = test_controller(ScriptedMetricsSource::failing());
    controller.initialize().await.unwrap();
    controller.start().await.unwrap();
    controller.wait().await;

    let log = &controller.parts().log;
    let from_controller = log.logs_from("controller");
    assert_eq!(
        from_controller
            .iter()
            .filter(|e| e.message.starts_with("Restart attempt"))
            .count(),
        4
    );
    assert!(from_controller
        .iter()
        .any(|e| e.level == LogLevel::Error && e.message.contains("Max restarts reached")));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("autotms.jsonl");
    let written = log.export_to_file(&path).unwrap();
    assert_eq!(written, log.len());
    let exported = std::fs::read_to_string(&path).unwrap();
    assert_eq!(exported.lines().count(), written);
    assert!(exported.contains("Max restarts reached"));
}
