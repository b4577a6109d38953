//! Testing utilities for the AutoTMS workspace
//!
//! Shared fixtures: quiet log managers, fast configurations, instant or
//! scripted runners and fault-injecting metrics sources.

#![allow(missing_docs)]

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tms_core::{
    AgentError, AgentManagerConfig, AgentRunner, AgentSpec, AutonomousAgentManager,
    AutonomousTmsController, ControllerConfig, ControllerParts, DatabaseConfig, DatabaseManager,
    ExecutionOutcome, HealthError, HealthThresholds, MetricsSource, NotificationManager,
    SystemHealthMonitor, SystemMetrics, Workflow, WorkflowError, WorkflowOrchestrator,
    WorkflowOrchestratorConfig, WorkflowRunner,
};
use tms_kernel::{Environment, LogManager, TmsConfig};

pub const TEST_SEED: u64 = 42;

pub fn quiet_log() -> Arc<LogManager> {
    LogManager::shared(tms_kernel::DEFAULT_LOG_CAPACITY)
}

/// Test environment, fixed seed, every background cycle disabled
pub fn fast_config() -> TmsConfig {
    let mut config = TmsConfig::default();
    config.environment = Environment::Test;
    config.simulation.seed = Some(TEST_SEED);
    config.agents.heartbeat_interval_ms = 0;
    config.workflows.execution_interval_ms = 0;
    config.portals.creation_interval_ms = 0;
    config.portals.website_interval_ms = 0;
    config
}

/// Starts and stops immediately; ids in `failing` fail to start
#[derive(Debug, Default)]
pub struct InstantAgentRunner {
    failing: Mutex<HashSet<String>>,
}

impl InstantAgentRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            failing: Mutex::new(ids.into_iter().map(Into::into).collect()),
        }
    }

    /// Let a previously failing agent start
    pub fn heal(&self, id: &str) {
        self.failing.lock().remove(id);
    }
}

#[async_trait::async_trait]
impl AgentRunner for InstantAgentRunner {
    async fn start(&self, spec: &AgentSpec) -> Result<(), AgentError> {
        if self.failing.lock().contains(&spec.id) {
            return Err(AgentError::StartFailed {
                id: spec.id.clone(),
                reason: "injected".to_string(),
            });
        }
        Ok(())
    }

    async fn stop(&self, _spec: &AgentSpec) -> Result<(), AgentError> {
        Ok(())
    }
}

/// Replays queued results, then succeeds
#[derive(Debug, Default)]
pub struct ScriptedWorkflowRunner {
    script: Mutex<VecDeque<Result<ExecutionOutcome, String>>>,
}

impl ScriptedWorkflowRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_outcome(self, outcome: ExecutionOutcome) -> Self {
        self.script.lock().push_back(Ok(outcome));
        self
    }

    pub fn then_error(self, reason: impl Into<String>) -> Self {
        self.script.lock().push_back(Err(reason.into()));
        self
    }
}

#[async_trait::async_trait]
impl WorkflowRunner for ScriptedWorkflowRunner {
    async fn execute(
        &self,
        workflow: &Workflow,
        _data: &Value,
    ) -> Result<ExecutionOutcome, WorkflowError> {
        let next = self.script.lock().pop_front();
        match next {
            None | Some(Ok(ExecutionOutcome::Succeeded)) => Ok(ExecutionOutcome::Succeeded),
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(reason)) => Err(WorkflowError::ExecutionFailed {
                id: workflow.id.clone(),
                reason,
            }),
        }
    }
}

/// Replays queued samples, then repeats the fallback
pub struct ScriptedMetricsSource {
    script: Mutex<VecDeque<Result<SystemMetrics, HealthError>>>,
    fallback: Option<SystemMetrics>,
}

impl ScriptedMetricsSource {
    /// Always healthy
    pub fn healthy() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(SystemMetrics::default()),
        }
    }

    /// Every probe fails
    pub fn failing() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: None,
        }
    }

    pub fn then(self, metrics: SystemMetrics) -> Self {
        self.script.lock().push_back(Ok(metrics));
        self
    }

    pub fn then_fail(self) -> Self {
        self.script
            .lock()
            .push_back(Err(HealthError::ProbeFailed("injected".to_string())));
        self
    }
}

#[async_trait::async_trait]
impl MetricsSource for ScriptedMetricsSource {
    async fn sample(&self) -> Result<SystemMetrics, HealthError> {
        if let Some(next) = self.script.lock().pop_front() {
            return next;
        }
        self.fallback
            .clone()
            .ok_or_else(|| HealthError::ProbeFailed("injected".to_string()))
    }
}

pub fn agent_manager(runner: InstantAgentRunner, log: &Arc<LogManager>) -> AutonomousAgentManager {
    let manager = AutonomousAgentManager::new(
        Arc::new(runner),
        log,
        AgentManagerConfig::from_settings(&fast_config().agents),
    );
    manager.initialize();
    manager
}

pub fn orchestrator(
    runner: ScriptedWorkflowRunner,
    log: &Arc<LogManager>,
) -> Arc<WorkflowOrchestrator> {
    let orchestrator = Arc::new(WorkflowOrchestrator::new(
        Arc::new(runner),
        log,
        WorkflowOrchestratorConfig::from_settings(&fast_config().workflows),
    ));
    orchestrator.initialize();
    orchestrator
}

/// Controller over instant runners and the given metrics source
pub fn test_controller(source: ScriptedMetricsSource) -> Arc<AutonomousTmsController> {
    test_controller_with(source, InstantAgentRunner::new(), &fast_config())
}

pub fn test_controller_with(
    source: ScriptedMetricsSource,
    agents: InstantAgentRunner,
    config: &TmsConfig,
) -> Arc<AutonomousTmsController> {
    let log = quiet_log();
    let parts = ControllerParts {
        log: Arc::clone(&log),
        database: Arc::new(DatabaseManager::new(
            DatabaseConfig::from_settings(&config.database, config.environment),
            &log,
        )),
        health: Arc::new(SystemHealthMonitor::new(
            Arc::new(source),
            HealthThresholds::from_settings(&config.health),
            &log,
        )),
        agents: Arc::new(AutonomousAgentManager::new(
            Arc::new(agents),
            &log,
            AgentManagerConfig::from_settings(&config.agents),
        )),
        workflows: Arc::new(WorkflowOrchestrator::new(
            Arc::new(ScriptedWorkflowRunner::new()),
            &log,
            WorkflowOrchestratorConfig::from_settings(&config.workflows),
        )),
        notifications: Arc::new(NotificationManager::from_settings(
            &config.notifications,
            &log,
        )),
    };
    Arc::new(AutonomousTmsController::new(
        parts,
        ControllerConfig::from_config(config),
    ))
}
