//! Agent manager
//!
//! Owns the named agents and drives their lifecycle:
//! - Seeding the fixed agent roster
//! - Starting/stopping every agent, sequentially, through an `AgentRunner`
//! - Restarting agents that errored or are not running
//! - Heartbeat cycle refreshing `last_activity` while the manager runs
//!
//! Operations never raise to the caller: failures end up in the agent's
//! state and the log. Unknown ids are logged and ignored.

use crate::error::AgentError;
use crate::types::{Agent, AgentConfig, AgentKind, AgentSpec, AgentState};
use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tms_kernel::{AgentSettings, LogManager, LogScope, PeriodicTask, TaskHandle};

/// Capability interface implemented by whatever actually runs an agent
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AgentRunner: Send + Sync {
    /// Bring the agent up
    async fn start(&self, spec: &AgentSpec) -> Result<(), AgentError>;

    /// Bring the agent down
    async fn stop(&self, spec: &AgentSpec) -> Result<(), AgentError>;

    /// Liveness probe for a running agent
    async fn heartbeat(&self, _spec: &AgentSpec) -> Result<(), AgentError> {
        Ok(())
    }
}

/// Runner that only sleeps for a random start/stop time
#[derive(Debug)]
pub struct SimulatedAgentRunner {
    rng: Mutex<StdRng>,
    start_delay_ms: (u64, u64),
    stop_delay_ms: (u64, u64),
    failure_rate: f64,
}

impl SimulatedAgentRunner {
    /// Start takes 1-3 s, stop 0.5-1.5 s, never fails
    #[must_use]
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            rng: Mutex::new(rng),
            start_delay_ms: (1_000, 3_000),
            stop_delay_ms: (500, 1_500),
            failure_rate: 0.0,
        }
    }

    /// Probability in `0.0..=1.0` that a start fails
    #[inline]
    #[must_use]
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    fn delay(&self, (lo, hi): (u64, u64)) -> Duration {
        Duration::from_millis(self.rng.lock().random_range(lo..=hi))
    }
}

#[async_trait::async_trait]
impl AgentRunner for SimulatedAgentRunner {
    async fn start(&self, spec: &AgentSpec) -> Result<(), AgentError> {
        tokio::time::sleep(self.delay(self.start_delay_ms)).await;
        let failed = self.rng.lock().random_bool(self.failure_rate);
        if failed {
            return Err(AgentError::StartFailed {
                id: spec.id.clone(),
                reason: "simulated startup failure".to_string(),
            });
        }
        Ok(())
    }

    async fn stop(&self, _spec: &AgentSpec) -> Result<(), AgentError> {
        tokio::time::sleep(self.delay(self.stop_delay_ms)).await;
        Ok(())
    }
}

/// The fixed agent roster
#[must_use]
pub fn default_agents() -> Vec<AgentSpec> {
    vec![
        AgentSpec::new("load-matcher", "Load Matcher", AgentKind::LoadMatching),
        AgentSpec::new("rate-optimizer", "Rate Optimizer", AgentKind::RateOptimization),
        AgentSpec::new("route-planner", "Route Planner", AgentKind::RoutePlanning),
        AgentSpec::new("carrier-vetting", "Carrier Vetting", AgentKind::CarrierVetting),
        AgentSpec::new("compliance-monitor", "Compliance Monitor", AgentKind::Compliance),
        AgentSpec::new("invoice-processor", "Invoice Processor", AgentKind::Billing),
        AgentSpec::new("shipment-tracker", "Shipment Tracker", AgentKind::Tracking),
        AgentSpec::new(
            "document-processor",
            "Document Processor",
            AgentKind::DocumentProcessing,
        ),
        AgentSpec::new("customer-support", "Customer Support", AgentKind::CustomerSupport),
        AgentSpec::new("analytics-reporter", "Analytics Reporter", AgentKind::Analytics),
    ]
}

/// Agent manager configuration
#[derive(Debug, Clone)]
pub struct AgentManagerConfig {
    /// Pause between stop and start when restarting a failed agent
    pub restart_pause: Duration,
    /// Heartbeat cycle; `None` disables it
    pub heartbeat_interval: Option<Duration>,
}

impl AgentManagerConfig {
    #[must_use]
    pub fn from_settings(settings: &AgentSettings) -> Self {
        Self {
            restart_pause: Duration::from_millis(settings.restart_pause_ms),
            heartbeat_interval: (settings.heartbeat_interval_ms > 0)
                .then(|| Duration::from_millis(settings.heartbeat_interval_ms)),
        }
    }
}

impl Default for AgentManagerConfig {
    fn default() -> Self {
        Self::from_settings(&AgentSettings::default())
    }
}

/// Aggregate view of the agent roster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub is_running: bool,
    pub total_agents: usize,
    /// Ids of agents in `running` state
    pub running_agents: Vec<String>,
    /// Ids of agents in `error` state
    pub failed_agents: Vec<String>,
    pub all_agents_running: bool,
}

/// Owner of the agent map
pub struct AutonomousAgentManager {
    config: AgentManagerConfig,
    runner: Arc<dyn AgentRunner>,
    agents: Arc<RwLock<IndexMap<String, Agent>>>,
    running: AtomicBool,
    heartbeat: Mutex<Option<TaskHandle>>,
    log: LogScope,
}

impl std::fmt::Debug for AutonomousAgentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutonomousAgentManager")
            .field("config", &self.config)
            .field("agents", &self.agents.read().len())
            .field("running", &self.running.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl AutonomousAgentManager {
    #[must_use]
    pub fn new(
        runner: Arc<dyn AgentRunner>,
        log: &Arc<LogManager>,
        config: AgentManagerConfig,
    ) -> Self {
        Self {
            config,
            runner,
            agents: Arc::new(RwLock::new(IndexMap::new())),
            running: AtomicBool::new(false),
            heartbeat: Mutex::new(None),
            log: log.scope("agent-manager"),
        }
    }

    /// Seed the fixed roster; agents already present are left untouched
    pub fn initialize(&self) {
        let mut agents = self.agents.write();
        let mut seeded = 0;
        for spec in default_agents() {
            if !agents.contains_key(&spec.id) {
                agents.insert(spec.id.clone(), Agent::from_spec(spec));
                seeded += 1;
            }
        }
        drop(agents);
        self.log.success(format!("Initialized {seeded} agents"));
    }

    /// Start every agent, one after another
    ///
    /// A second call while running is a no-op.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            self.log.warning("Agent manager is already running");
            return;
        }
        self.log.info("Starting all agents...");

        for id in self.ids() {
            self.start_agent(&id).await;
        }

        if let Some(period) = self.config.heartbeat_interval {
            let handle = self.spawn_heartbeat(period);
            if let Some(previous) = self.heartbeat.lock().replace(handle) {
                previous.abort();
            }
        }

        let status = self.status();
        self.log.success(format!(
            "Agent manager started: {}/{} agents running",
            status.running_agents.len(),
            status.total_agents
        ));
    }

    /// Stop every running agent
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            self.log.debug("Agent manager is not running");
            return;
        }
        self.log.info("Stopping all agents...");

        let heartbeat = self.heartbeat.lock().take();
        if let Some(handle) = heartbeat {
            if let Err(e) = handle.cancel().await {
                self.log.warning(format!("Heartbeat task ended abnormally: {e}"));
            }
        }

        let running: Vec<String> = self
            .agents
            .read()
            .values()
            .filter(|a| a.is_running)
            .map(|a| a.id.clone())
            .collect();
        for id in running {
            self.stop_agent(&id).await;
        }

        self.log.success("All agents stopped");
    }

    /// Transition one agent `starting -> running`, or `-> error` on failure
    pub async fn start_agent(&self, id: &str) {
        let spec = {
            let mut agents = self.agents.write();
            let Some(agent) = agents.get_mut(id) else {
                drop(agents);
                self.log.error(format!("Agent not found: {id}"));
                return;
            };
            if agent.is_running {
                return;
            }
            agent.status = AgentState::Starting;
            agent.spec()
        };

        self.log.info(format!("Starting agent: {}", spec.name));
        let result = self.runner.start(&spec).await;

        let mut agents = self.agents.write();
        let Some(agent) = agents.get_mut(id) else {
            return;
        };
        match result {
            Ok(()) => {
                agent.status = AgentState::Running;
                agent.is_running = true;
                agent.last_activity = Some(Utc::now());
                drop(agents);
                metrics::counter!("tms_agent_starts_total", "outcome" => "success").increment(1);
                self.log.success(format!("Agent started: {}", spec.name));
            }
            Err(e) => {
                agent.status = AgentState::Error;
                agent.is_running = false;
                drop(agents);
                metrics::counter!("tms_agent_starts_total", "outcome" => "failure").increment(1);
                self.log.error(format!("Failed to start agent {}: {e}", spec.name));
            }
        }
    }

    /// Transition one agent to `stopped`, or `error` on failure
    pub async fn stop_agent(&self, id: &str) {
        let Some(spec) = self.agents.read().get(id).map(Agent::spec) else {
            self.log.error(format!("Agent not found: {id}"));
            return;
        };

        self.log.info(format!("Stopping agent: {}", spec.name));
        let result = self.runner.stop(&spec).await;

        let mut agents = self.agents.write();
        let Some(agent) = agents.get_mut(id) else {
            return;
        };
        agent.is_running = false;
        match result {
            Ok(()) => {
                agent.status = AgentState::Stopped;
                drop(agents);
                self.log.success(format!("Agent stopped: {}", spec.name));
            }
            Err(e) => {
                agent.status = AgentState::Error;
                drop(agents);
                self.log.error(format!("Failed to stop agent {}: {e}", spec.name));
            }
        }
    }

    /// Restart every agent that errored or is not running
    ///
    /// Agents are handled one at a time: stop, fixed pause, start.
    /// Returns how many agents were cycled.
    pub async fn restart_failed_agents(&self) -> usize {
        let failed: Vec<String> = self
            .agents
            .read()
            .values()
            .filter(|a| a.needs_restart())
            .map(|a| a.id.clone())
            .collect();

        if failed.is_empty() {
            return 0;
        }
        self.log
            .info(format!("Restarting {} failed agents...", failed.len()));

        for id in &failed {
            self.stop_agent(id).await;
            tokio::time::sleep(self.config.restart_pause).await;
            self.start_agent(id).await;
        }
        metrics::counter!("tms_agent_restarts_total").increment(failed.len() as u64);
        failed.len()
    }

    /// Aggregate counts over the roster
    #[must_use]
    pub fn status(&self) -> AgentStatus {
        let agents = self.agents.read();
        let running_agents: Vec<String> = agents
            .values()
            .filter(|a| a.status == AgentState::Running)
            .map(|a| a.id.clone())
            .collect();
        let failed_agents: Vec<String> = agents
            .values()
            .filter(|a| a.status == AgentState::Error)
            .map(|a| a.id.clone())
            .collect();
        let total_agents = agents.len();

        AgentStatus {
            is_running: self.is_running(),
            all_agents_running: running_agents.len() == total_agents,
            total_agents,
            running_agents,
            failed_agents,
        }
    }

    /// Register a new agent, starting it if the manager is running
    ///
    /// # Errors
    /// Returns `AgentError::AlreadyExists` if the id is taken.
    pub async fn add_agent(&self, spec: AgentSpec) -> Result<(), AgentError> {
        let id = spec.id.clone();
        {
            let mut agents = self.agents.write();
            if agents.contains_key(&id) {
                drop(agents);
                self.log.warning(format!("Agent already exists: {id}"));
                return Err(AgentError::AlreadyExists(id));
            }
            agents.insert(id.clone(), Agent::from_spec(spec));
        }
        self.log.success(format!("Added agent: {id}"));

        if self.is_running() {
            self.start_agent(&id).await;
        }
        Ok(())
    }

    /// Remove an agent, stopping it first if it runs
    pub async fn remove_agent(&self, id: &str) -> Option<Agent> {
        let was_running = match self.agents.read().get(id) {
            Some(agent) => agent.is_running,
            None => {
                self.log.error(format!("Agent not found: {id}"));
                return None;
            }
        };

        if was_running {
            self.stop_agent(id).await;
        }
        let removed = self.agents.write().shift_remove(id);
        if removed.is_some() {
            self.log.success(format!("Removed agent: {id}"));
        }
        removed
    }

    /// Replace an agent's configuration, restarting it if the manager runs
    ///
    /// Returns `false` if the agent is unknown.
    pub async fn update_agent_config(&self, id: &str, config: AgentConfig) -> bool {
        {
            let mut agents = self.agents.write();
            let Some(agent) = agents.get_mut(id) else {
                drop(agents);
                self.log.error(format!("Agent not found: {id}"));
                return false;
            };
            agent.kind = config.kind();
            agent.config = config;
        }
        self.log.info(format!("Updated config for agent: {id}"));

        if self.is_running() {
            self.stop_agent(id).await;
            self.start_agent(id).await;
        }
        true
    }

    #[must_use]
    pub fn agent(&self, id: &str) -> Option<Agent> {
        self.agents.read().get(id).cloned()
    }

    /// Snapshot of all agents in registration order
    #[must_use]
    pub fn agents(&self) -> Vec<Agent> {
        self.agents.read().values().cloned().collect()
    }

    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn ids(&self) -> Vec<String> {
        self.agents.read().keys().cloned().collect()
    }

    fn spawn_heartbeat(&self, period: Duration) -> TaskHandle {
        let agents = Arc::clone(&self.agents);
        let runner = Arc::clone(&self.runner);
        let log = self.log.clone();
        PeriodicTask::new("agent-heartbeat", period).spawn(move || {
            let agents = Arc::clone(&agents);
            let runner = Arc::clone(&runner);
            let log = log.clone();
            async move {
                let running: Vec<AgentSpec> = agents
                    .read()
                    .values()
                    .filter(|a| a.is_running)
                    .map(Agent::spec)
                    .collect();

                let mut touched = 0usize;
                for spec in &running {
                    let result = runner.heartbeat(spec).await;
                    let mut guard = agents.write();
                    let Some(agent) = guard.get_mut(&spec.id) else {
                        continue;
                    };
                    match result {
                        Ok(()) => {
                            agent.last_activity = Some(Utc::now());
                            touched += 1;
                        }
                        Err(e) => {
                            agent.status = AgentState::Error;
                            agent.is_running = false;
                            drop(guard);
                            log.warning(format!("Agent {} missed heartbeat: {e}", spec.name));
                        }
                    }
                }
                log.debug(format!("Heartbeat refreshed {touched} agents"));
                ControlFlow::Continue(())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with(runner: Arc<dyn AgentRunner>) -> AutonomousAgentManager {
        let log = LogManager::shared(1000);
        AutonomousAgentManager::new(
            runner,
            &log,
            AgentManagerConfig {
                restart_pause: Duration::from_secs(2),
                heartbeat_interval: None,
            },
        )
    }

    fn simulated() -> AutonomousAgentManager {
        manager_with(Arc::new(SimulatedAgentRunner::new(Some(7))))
    }

    #[tokio::test(start_paused = true)]
    async fn start_brings_all_ten_agents_up() {
        let manager = simulated();
        manager.initialize();
        manager.start().await;

        let status = manager.status();
        assert_eq!(status.total_agents, 10);
        assert_eq!(status.running_agents.len(), 10);
        assert!(status.failed_agents.is_empty());
        assert!(status.all_agents_running);
    }

    #[tokio::test(start_paused = true)]
    async fn start_twice_is_idempotent() {
        let manager = simulated();
        manager.initialize();
        manager.start().await;
        let first = manager.agents();

        manager.start().await;
        assert_eq!(manager.agents(), first);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_agent_is_ignored() {
        let manager = simulated();
        manager.initialize();
        let before = manager.agents();

        manager.start_agent("nonexistent").await;
        manager.stop_agent("nonexistent").await;
        assert!(
            !manager
                .update_agent_config("nonexistent", AgentKind::Billing.default_config())
                .await
        );
        assert!(manager.remove_agent("nonexistent").await.is_none());

        assert_eq!(manager.agents(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_start_marks_error() {
        let mut runner = MockAgentRunner::new();
        runner.expect_start().returning(|spec| {
            Err(AgentError::StartFailed {
                id: spec.id.clone(),
                reason: "boom".to_string(),
            })
        });
        let manager = manager_with(Arc::new(runner));
        manager.initialize();
        manager.start().await;

        let agent = manager.agent("load-matcher").unwrap();
        assert_eq!(agent.status, AgentState::Error);
        assert!(!agent.is_running);

        let status = manager.status();
        assert_eq!(status.failed_agents.len(), 10);
        assert!(!status.all_agents_running);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_cycles_only_failed_agents() {
        let mut runner = MockAgentRunner::new();
        let mut seq = mockall::Sequence::new();
        // The first start of rate-optimizer fails, every later start succeeds
        runner
            .expect_start()
            .withf(|spec| spec.id == "rate-optimizer")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|spec| {
                Err(AgentError::StartFailed {
                    id: spec.id.clone(),
                    reason: "flaky".to_string(),
                })
            });
        runner.expect_start().returning(|_| Ok(()));
        runner.expect_stop().times(1).returning(|_| Ok(()));

        let manager = manager_with(Arc::new(runner));
        manager.initialize();
        manager.start().await;
        assert_eq!(manager.status().failed_agents, vec!["rate-optimizer".to_string()]);

        let begun = tokio::time::Instant::now();
        let restarted = manager.restart_failed_agents().await;
        assert_eq!(restarted, 1);
        assert!(begun.elapsed() >= Duration::from_secs(2));
        assert!(manager.status().all_agents_running);
    }

    #[tokio::test(start_paused = true)]
    async fn add_agent_starts_when_running() {
        let manager = simulated();
        manager.initialize();
        manager.start().await;

        manager
            .add_agent(AgentSpec::new("edi-bridge", "EDI Bridge", AgentKind::DocumentProcessing))
            .await
            .unwrap();
        assert!(manager.agent("edi-bridge").unwrap().is_running);

        let dup = manager
            .add_agent(AgentSpec::new("edi-bridge", "EDI Bridge", AgentKind::DocumentProcessing))
            .await;
        assert!(matches!(dup, Err(AgentError::AlreadyExists(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn remove_agent_stops_it_first() {
        let manager = simulated();
        manager.initialize();
        manager.start().await;

        let removed = manager.remove_agent("route-planner").await.unwrap();
        assert!(!removed.is_running);
        assert_eq!(removed.status, AgentState::Stopped);
        assert_eq!(manager.status().total_agents, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn update_config_changes_kind_and_restarts() {
        let manager = simulated();
        manager.initialize();
        manager.start().await;

        let config = AgentConfig::Tracking {
            update_interval_secs: 60,
            geofence_radius_miles: 1.0,
        };
        assert!(manager.update_agent_config("analytics-reporter", config.clone()).await);

        let agent = manager.agent("analytics-reporter").unwrap();
        assert_eq!(agent.kind, AgentKind::Tracking);
        assert_eq!(agent.config, config);
        assert!(agent.is_running);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_leaves_everything_stopped() {
        let manager = simulated();
        manager.initialize();
        manager.start().await;
        manager.stop().await;

        assert!(!manager.is_running());
        assert!(manager
            .agents()
            .iter()
            .all(|a| !a.is_running && a.status == AgentState::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_refreshes_last_activity() {
        let log = LogManager::shared(1000);
        let manager = AutonomousAgentManager::new(
            Arc::new(SimulatedAgentRunner::new(Some(1))),
            &log,
            AgentManagerConfig {
                restart_pause: Duration::from_secs(2),
                heartbeat_interval: Some(Duration::from_secs(60)),
            },
        );
        manager.initialize();
        manager.start().await;

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(log
            .logs_from("agent-manager")
            .iter()
            .any(|e| e.message.starts_with("Heartbeat refreshed 10")));
        manager.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn missed_heartbeat_marks_agent_failed() {
        let mut runner = MockAgentRunner::new();
        runner.expect_start().returning(|_| Ok(()));
        runner.expect_heartbeat().returning(|spec| {
            if spec.id == "shipment-tracker" {
                Err(AgentError::Unresponsive {
                    id: spec.id.clone(),
                    reason: "no reply".to_string(),
                })
            } else {
                Ok(())
            }
        });
        let log = LogManager::shared(1000);
        let manager = AutonomousAgentManager::new(
            Arc::new(runner),
            &log,
            AgentManagerConfig {
                restart_pause: Duration::from_secs(2),
                heartbeat_interval: Some(Duration::from_secs(60)),
            },
        );
        manager.initialize();
        manager.start().await;
        assert!(manager.status().all_agents_running);

        tokio::time::sleep(Duration::from_secs(61)).await;
        let status = manager.status();
        assert_eq!(status.failed_agents, vec!["shipment-tracker".to_string()]);
        assert!(log
            .logs_from("agent-manager")
            .iter()
            .any(|e| e.message.starts_with("Heartbeat refreshed 9")));
    }
}
