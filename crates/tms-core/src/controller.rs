//! Autonomous TMS controller
//!
//! Top-level supervisor that:
//! - Brings the managers up in dependency order (fail-fast)
//! - Polls health, agent and workflow status on a fixed period
//! - Maps health issues to recovery actions
//! - Restarts the whole stack on loop failures until the restart budget is
//!   spent, then stops for good
//!
//! # State machine
//!
//! ```text
//! NotInitialized --initialize--> Initialized --start--> Running
//! Running --loop failure--> Restarting --> Running
//! Running --budget spent | stop--> Stopped --start--> Running
//! ```

use crate::agents::{AgentManagerConfig, AgentStatus, AutonomousAgentManager, SimulatedAgentRunner};
use crate::database::{DatabaseConfig, DatabaseManager};
use crate::error::ControllerError;
use crate::health::{
    HealthIssue, HealthStatus, HealthThresholds, SimulatedMetricsSource, SystemHealthMonitor,
};
use crate::notifications::{NotificationManager, Priority};
use crate::workflows::{
    SimulatedWorkflowRunner, WorkflowOrchestrator, WorkflowOrchestratorConfig, WorkflowStatus,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tms_kernel::{
    CircuitState, LogManager, LogScope, PeriodicTask, RestartBudget, RestartDecision,
    RestartPolicy, TaskHandle, TmsConfig,
};
use tokio::sync::watch;

/// Lifecycle state of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    NotInitialized,
    Initialized,
    Running,
    Restarting,
    Stopped,
}

impl ControllerState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerState::NotInitialized => "not_initialized",
            ControllerState::Initialized => "initialized",
            ControllerState::Running => "running",
            ControllerState::Restarting => "restarting",
            ControllerState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Managers the controller drives
#[derive(Debug, Clone)]
pub struct ControllerParts {
    pub log: Arc<LogManager>,
    pub database: Arc<DatabaseManager>,
    pub health: Arc<SystemHealthMonitor>,
    pub agents: Arc<AutonomousAgentManager>,
    pub workflows: Arc<WorkflowOrchestrator>,
    pub notifications: Arc<NotificationManager>,
}

impl ControllerParts {
    /// Simulated managers built from `config`
    ///
    /// Each simulated component gets its own seed derived from
    /// `simulation.seed` so runs are reproducible.
    #[must_use]
    pub fn simulated(config: &TmsConfig, log: &Arc<LogManager>) -> Self {
        let seed = |offset: u64| config.simulation.seed.map(|s| s.wrapping_add(offset));

        let source = SimulatedMetricsSource::new(&config.health, seed(1));
        let agent_runner = SimulatedAgentRunner::new(seed(2))
            .with_failure_rate(config.agents.start_failure_rate);
        let workflow_runner =
            SimulatedWorkflowRunner::new(config.workflows.success_probability, seed(3));

        Self {
            log: Arc::clone(log),
            database: Arc::new(DatabaseManager::new(
                DatabaseConfig::from_settings(&config.database, config.environment),
                log,
            )),
            health: Arc::new(SystemHealthMonitor::new(
                Arc::new(source),
                HealthThresholds::from_settings(&config.health),
                log,
            )),
            agents: Arc::new(AutonomousAgentManager::new(
                Arc::new(agent_runner),
                log,
                AgentManagerConfig::from_settings(&config.agents),
            )),
            workflows: Arc::new(WorkflowOrchestrator::new(
                Arc::new(workflow_runner),
                log,
                WorkflowOrchestratorConfig::from_settings(&config.workflows),
            )),
            notifications: Arc::new(NotificationManager::from_settings(
                &config.notifications,
                log,
            )),
        }
    }
}

/// Poll period and restart policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerConfig {
    pub poll_interval: Duration,
    pub restart_policy: RestartPolicy,
}

impl ControllerConfig {
    #[must_use]
    pub fn from_config(config: &TmsConfig) -> Self {
        Self {
            poll_interval: config.controller.poll_interval(),
            restart_policy: RestartPolicy {
                max_restarts: config.controller.max_restarts,
                restart_delay: config.controller.restart_delay(),
            },
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::from_config(&TmsConfig::default())
    }
}

/// Action taken for one health issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RecoveryAction {
    DatabaseReconnected,
    AgentsRestarted { count: usize },
    WorkflowsRecovered { count: usize },
    MemoryReclaimed { hook_ran: bool },
    /// No handler for this issue; it was only logged
    Logged { issue: String },
}

impl RecoveryAction {
    fn metric_label(&self) -> &'static str {
        match self {
            RecoveryAction::DatabaseReconnected => "database_reconnect",
            RecoveryAction::AgentsRestarted { .. } => "agent_restart",
            RecoveryAction::WorkflowsRecovered { .. } => "workflow_recovery",
            RecoveryAction::MemoryReclaimed { .. } => "memory_cleanup",
            RecoveryAction::Logged { .. } => "logged",
        }
    }
}

/// Outcome of one monitoring iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorReport {
    pub health: HealthStatus,
    pub recovery: Vec<RecoveryAction>,
    pub agents_restarted: usize,
    pub workflows_recovered: usize,
}

/// Serializable controller snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub state: ControllerState,
    pub restart_count: u32,
    pub max_restarts: u32,
    pub circuit: CircuitState,
    pub database_connected: bool,
    pub agents: AgentStatus,
    pub workflows: WorkflowStatus,
    pub health: Option<HealthStatus>,
    pub notifications_sent: usize,
}

pub struct AutonomousTmsController {
    parts: ControllerParts,
    config: ControllerConfig,
    state: RwLock<ControllerState>,
    budget: Mutex<RestartBudget>,
    restart_count: AtomicU32,
    monitor: Mutex<Option<TaskHandle>>,
    finished: watch::Sender<bool>,
    log: LogScope,
}

impl fmt::Debug for AutonomousTmsController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutonomousTmsController")
            .field("state", &self.state())
            .field("restart_count", &self.restart_count())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AutonomousTmsController {
    #[must_use]
    pub fn new(parts: ControllerParts, config: ControllerConfig) -> Self {
        let log = parts.log.scope("controller");
        let (finished, _) = watch::channel(false);
        Self {
            budget: Mutex::new(RestartBudget::new(config.restart_policy)),
            parts,
            config,
            state: RwLock::new(ControllerState::NotInitialized),
            restart_count: AtomicU32::new(0),
            monitor: Mutex::new(None),
            finished,
            log,
        }
    }

    /// Controller over simulated managers configured by `config`
    #[must_use]
    pub fn from_config(config: &TmsConfig, log: &Arc<LogManager>) -> Self {
        Self::new(
            ControllerParts::simulated(config, log),
            ControllerConfig::from_config(config),
        )
    }

    #[must_use]
    pub fn parts(&self) -> &ControllerParts {
        &self.parts
    }

    #[must_use]
    pub fn state(&self) -> ControllerState {
        *self.state.read()
    }

    /// Loop failures recorded so far; never reset
    #[must_use]
    pub fn restart_count(&self) -> u32 {
        self.restart_count.load(Ordering::SeqCst)
    }

    /// Bring every manager up: database, health, agents, workflows,
    /// notifications
    ///
    /// # Errors
    /// `ControllerError::Initialization` naming the first component that
    /// failed. Nothing after it is initialized.
    pub async fn initialize(&self) -> Result<(), ControllerError> {
        if self.state() != ControllerState::NotInitialized {
            self.log.warning("Controller is already initialized");
            return Ok(());
        }
        self.log.info("Initializing autonomous TMS controller...");

        self.parts
            .database
            .connect()
            .await
            .map_err(|e| {
                self.log.error(format!("Database initialization failed: {e}"));
                ControllerError::initialization("database", e)
            })?;
        self.parts.health.initialize();
        self.parts.agents.initialize();
        self.parts.workflows.initialize();
        self.parts.notifications.initialize();

        *self.state.write() = ControllerState::Initialized;
        self.parts
            .notifications
            .notify(
                "system_startup",
                "Autonomous TMS system initialized",
                Priority::Medium,
            )
            .await;
        self.log.success("Autonomous TMS controller initialized");
        Ok(())
    }

    /// Start the managers and the monitoring loop
    ///
    /// # Errors
    /// - `NotInitialized` before `initialize`
    /// - `AlreadyRunning` while running or restarting
    pub async fn start(self: &Arc<Self>) -> Result<(), ControllerError> {
        match self.state() {
            ControllerState::NotInitialized => return Err(ControllerError::NotInitialized),
            ControllerState::Running | ControllerState::Restarting => {
                return Err(ControllerError::AlreadyRunning)
            }
            ControllerState::Initialized | ControllerState::Stopped => {}
        }
        self.log.info("Starting autonomous TMS controller...");

        self.start_subsystems().await;
        *self.state.write() = ControllerState::Running;
        self.finished.send_replace(false);

        let handle = self.spawn_monitor();
        if let Some(previous) = self.monitor.lock().replace(handle) {
            previous.abort();
        }
        self.log.success(format!(
            "Autonomous TMS controller running (poll every {:?})",
            self.config.poll_interval
        ));
        Ok(())
    }

    /// Stop the loop and every manager
    ///
    /// An iteration already in flight completes first. Stopping a
    /// controller that is not running is a no-op.
    ///
    /// # Errors
    /// `ControllerError::Scheduler` if the monitor task panicked.
    pub async fn stop(&self) -> Result<(), ControllerError> {
        if !matches!(
            self.state(),
            ControllerState::Running | ControllerState::Restarting
        ) {
            self.log.debug("Controller is not running");
            return Ok(());
        }
        self.log.info("Stopping autonomous TMS controller...");

        let handle = self.monitor.lock().take();
        let cancelled = match handle {
            Some(handle) => handle.cancel().await,
            None => Ok(()),
        };

        // The loop may have given up while we waited for it
        if self.state() != ControllerState::Stopped {
            self.stop_subsystems().await;
            *self.state.write() = ControllerState::Stopped;
            self.parts
                .notifications
                .notify(
                    "system_shutdown",
                    "Autonomous TMS system stopped",
                    Priority::Medium,
                )
                .await;
        }
        self.finished.send_replace(true);
        self.log.success("Autonomous TMS controller stopped");
        cancelled.map_err(ControllerError::from)
    }

    /// Full stop, `restart_delay` pause, full start of the managers
    ///
    /// The monitoring loop keeps running across the restart.
    pub async fn restart(&self) {
        self.restart_with_delay(self.config.restart_policy.restart_delay)
            .await;
    }

    async fn restart_with_delay(&self, delay: Duration) {
        self.log.warning("Restarting autonomous TMS system...");
        *self.state.write() = ControllerState::Restarting;
        self.stop_subsystems().await;
        tokio::time::sleep(delay).await;
        self.start_subsystems().await;
        *self.state.write() = ControllerState::Running;
        self.log.success("Autonomous TMS system restarted");
    }

    /// Resolves once the monitoring loop has ended, by `stop` or by the
    /// circuit breaker
    pub async fn wait(&self) {
        let mut rx = self.finished.subscribe();
        // The sender lives as long as `self`
        let _ = rx.wait_for(|done| *done).await;
    }

    /// One poll: health, recovery, agents, workflows
    ///
    /// # Errors
    /// - `NotInitialized` before `initialize`
    /// - `Monitoring` if the health probe or a recovery action fails
    pub async fn monitor_once(&self) -> Result<MonitorReport, ControllerError> {
        if self.state() == ControllerState::NotInitialized {
            return Err(ControllerError::NotInitialized);
        }

        let health = self
            .parts
            .health
            .check_health()
            .await
            .map_err(ControllerError::monitoring)?;
        let recovery = if health.is_healthy {
            Vec::new()
        } else {
            self.log.warning(format!(
                "System health issues detected: {}",
                health
                    .issues
                    .iter()
                    .map(HealthIssue::code)
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
            self.attempt_auto_recovery(&health.issues).await?
        };

        let agents = self.parts.agents.status();
        let agents_restarted = if agents.is_running && !agents.all_agents_running {
            self.log.warning("Some agents are not running, restarting...");
            self.parts.agents.restart_failed_agents().await
        } else {
            0
        };

        let workflows = self.parts.workflows.status();
        let workflows_recovered = if workflows.all_workflows_healthy {
            0
        } else {
            self.log.warning("Some workflows are unhealthy, recovering...");
            self.parts.workflows.recover_failed_workflows().await
        };

        Ok(MonitorReport {
            health,
            recovery,
            agents_restarted,
            workflows_recovered,
        })
    }

    /// Run the recovery action mapped to each issue, in order
    ///
    /// # Errors
    /// `ControllerError::Monitoring` if the database cannot be reconnected.
    pub async fn attempt_auto_recovery(
        &self,
        issues: &[HealthIssue],
    ) -> Result<Vec<RecoveryAction>, ControllerError> {
        self.log.info("Attempting auto-recovery...");
        let mut actions = Vec::with_capacity(issues.len());
        for issue in issues {
            let action = match issue {
                HealthIssue::DatabaseConnection => {
                    self.parts
                        .database
                        .reconnect()
                        .await
                        .map_err(ControllerError::monitoring)?;
                    RecoveryAction::DatabaseReconnected
                }
                HealthIssue::AgentFailure => RecoveryAction::AgentsRestarted {
                    count: self.parts.agents.restart_failed_agents().await,
                },
                HealthIssue::WorkflowFailure => RecoveryAction::WorkflowsRecovered {
                    count: self.parts.workflows.recover_failed_workflows().await,
                },
                HealthIssue::MemoryHigh => RecoveryAction::MemoryReclaimed {
                    hook_ran: self.parts.health.cleanup_memory(),
                },
                other => {
                    self.log
                        .warning(format!("Unknown issue type: {}", other.code()));
                    RecoveryAction::Logged {
                        issue: other.code().to_string(),
                    }
                }
            };
            metrics::counter!("tms_recovery_actions_total", "action" => action.metric_label())
                .increment(1);
            actions.push(action);
        }
        Ok(actions)
    }

    #[must_use]
    pub fn status(&self) -> ControllerStatus {
        let budget = self.budget.lock();
        ControllerStatus {
            state: self.state(),
            restart_count: self.restart_count(),
            max_restarts: budget.policy().max_restarts,
            circuit: budget.state(),
            database_connected: self.parts.database.is_connected(),
            agents: self.parts.agents.status(),
            workflows: self.parts.workflows.status(),
            health: self.parts.health.last_status(),
            notifications_sent: self.parts.notifications.notifications().len(),
        }
    }

    async fn start_subsystems(&self) {
        self.parts.agents.start().await;
        self.parts.workflows.start().await;
    }

    async fn stop_subsystems(&self) {
        self.parts.workflows.stop().await;
        self.parts.agents.stop().await;
    }

    /// Loop body: one poll, failures go to the restart budget
    async fn monitor_tick(&self) -> ControlFlow<()> {
        match self.monitor_once().await {
            Ok(_) => ControlFlow::Continue(()),
            Err(e) => {
                self.log.error(format!("Monitoring loop error: {e}"));
                self.on_loop_failure().await
            }
        }
    }

    async fn on_loop_failure(&self) -> ControlFlow<()> {
        let decision = self.budget.lock().record_failure();
        self.restart_count.fetch_add(1, Ordering::SeqCst);

        match decision {
            RestartDecision::Restart { attempt, delay } => {
                metrics::counter!("tms_controller_restarts_total").increment(1);
                self.log.warning(format!(
                    "Restart attempt {attempt}/{}",
                    self.config.restart_policy.max_restarts
                ));
                self.restart_with_delay(delay).await;
                ControlFlow::Continue(())
            }
            RestartDecision::GiveUp { failures } => {
                self.log.error(format!(
                    "Max restarts reached after {failures} failures, stopping system"
                ));
                self.stop_subsystems().await;
                *self.state.write() = ControllerState::Stopped;
                self.parts
                    .notifications
                    .notify(
                        "circuit_breaker_open",
                        format!(
                            "Autonomous TMS stopped after {failures} consecutive loop failures"
                        ),
                        Priority::Critical,
                    )
                    .await;
                self.finished.send_replace(true);
                ControlFlow::Break(())
            }
        }
    }

    fn spawn_monitor(self: &Arc<Self>) -> TaskHandle {
        let weak: Weak<Self> = Arc::downgrade(self);
        PeriodicTask::new("controller-monitor", self.config.poll_interval).spawn(move || {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(controller) => controller.monitor_tick().await,
                    None => ControlFlow::Break(()),
                }
            }
        })
    }
}
