//! Workflow orchestrator
//!
//! Tracks the named business workflows, their activation state and a running
//! success-rate score. Executions go through a `WorkflowRunner`:
//! - Success: score +1 (capped at 100), status back to active
//! - Failed outcome: score -2 (floored at 0), status back to active
//! - Runner error: score -5, status `error` until recovered
//!
//! Executing an inactive workflow is the one operation that returns an error
//! to its caller.

use crate::error::WorkflowError;
use crate::types::{
    ExecutionOutcome, Workflow, WorkflowConfig, WorkflowKind, WorkflowSpec, WorkflowState,
};
use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tms_kernel::{LogManager, LogScope, PeriodicTask, TaskHandle, WorkflowSettings};

const SUCCESS_DELTA: i16 = 1;
const FAILURE_DELTA: i16 = -2;
const ERROR_DELTA: i16 = -5;

/// Executes one workflow run
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait WorkflowRunner: Send + Sync {
    async fn execute(
        &self,
        workflow: &Workflow,
        data: &Value,
    ) -> Result<ExecutionOutcome, WorkflowError>;
}

/// Sleeps 2-5 s, then succeeds with a fixed probability
#[derive(Debug)]
pub struct SimulatedWorkflowRunner {
    rng: Mutex<StdRng>,
    success_probability: f64,
}

impl SimulatedWorkflowRunner {
    #[must_use]
    pub fn new(success_probability: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            rng: Mutex::new(rng),
            success_probability: success_probability.clamp(0.0, 1.0),
        }
    }
}

#[async_trait::async_trait]
impl WorkflowRunner for SimulatedWorkflowRunner {
    async fn execute(
        &self,
        _workflow: &Workflow,
        _data: &Value,
    ) -> Result<ExecutionOutcome, WorkflowError> {
        let (delay, succeeded) = {
            let mut rng = self.rng.lock();
            (
                Duration::from_millis(rng.random_range(2_000..=5_000)),
                rng.random_bool(self.success_probability),
            )
        };
        tokio::time::sleep(delay).await;
        Ok(if succeeded {
            ExecutionOutcome::Succeeded
        } else {
            ExecutionOutcome::Failed {
                reason: "simulated execution failure".to_string(),
            }
        })
    }
}

/// The fixed workflow roster
#[must_use]
pub fn default_workflows() -> Vec<WorkflowSpec> {
    vec![
        WorkflowSpec::new("load-booking", "Load Booking", WorkflowKind::LoadBooking),
        WorkflowSpec::new(
            "carrier-onboarding",
            "Carrier Onboarding",
            WorkflowKind::CarrierOnboarding,
        ),
        WorkflowSpec::new(
            "invoice-generation",
            "Invoice Generation",
            WorkflowKind::InvoiceGeneration,
        ),
        WorkflowSpec::new("shipment-tracking", "Shipment Tracking", WorkflowKind::ShipmentTracking),
        WorkflowSpec::new("compliance-audit", "Compliance Audit", WorkflowKind::ComplianceAudit),
        WorkflowSpec::new("rate-quote", "Rate Quote", WorkflowKind::RateQuote),
        WorkflowSpec::new(
            "document-verification",
            "Document Verification",
            WorkflowKind::DocumentVerification,
        ),
        WorkflowSpec::new(
            "payment-processing",
            "Payment Processing",
            WorkflowKind::PaymentProcessing,
        ),
    ]
}

#[derive(Debug, Clone)]
pub struct WorkflowOrchestratorConfig {
    /// Pause between deactivate and reactivate during recovery
    pub recovery_pause: Duration,
    /// Background execution cycle; `None` disables it
    pub execution_interval: Option<Duration>,
}

impl WorkflowOrchestratorConfig {
    #[must_use]
    pub fn from_settings(settings: &WorkflowSettings) -> Self {
        Self {
            recovery_pause: Duration::from_millis(settings.recovery_pause_ms),
            execution_interval: (settings.execution_interval_ms > 0)
                .then(|| Duration::from_millis(settings.execution_interval_ms)),
        }
    }
}

impl Default for WorkflowOrchestratorConfig {
    fn default() -> Self {
        Self::from_settings(&WorkflowSettings::default())
    }
}

/// Aggregate view of the workflow roster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub is_running: bool,
    pub total_workflows: usize,
    pub active_workflows: Vec<String>,
    /// Ids of workflows in `error` state
    pub failed_workflows: Vec<String>,
    pub all_workflows_healthy: bool,
}

pub struct WorkflowOrchestrator {
    config: WorkflowOrchestratorConfig,
    runner: Arc<dyn WorkflowRunner>,
    workflows: RwLock<IndexMap<String, Workflow>>,
    running: AtomicBool,
    cycle: Mutex<Option<TaskHandle>>,
    log: LogScope,
}

impl std::fmt::Debug for WorkflowOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowOrchestrator")
            .field("config", &self.config)
            .field("workflows", &self.workflows.read().len())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl WorkflowOrchestrator {
    #[must_use]
    pub fn new(
        runner: Arc<dyn WorkflowRunner>,
        log: &Arc<LogManager>,
        config: WorkflowOrchestratorConfig,
    ) -> Self {
        Self {
            config,
            runner,
            workflows: RwLock::new(IndexMap::new()),
            running: AtomicBool::new(false),
            cycle: Mutex::new(None),
            log: log.scope("workflow-orchestrator"),
        }
    }

    /// Seed the fixed roster; existing workflows are kept
    pub fn initialize(&self) {
        let mut workflows = self.workflows.write();
        let mut seeded = 0;
        for spec in default_workflows() {
            if !workflows.contains_key(&spec.id) {
                workflows.insert(spec.id.clone(), Workflow::from_spec(spec));
                seeded += 1;
            }
        }
        drop(workflows);
        self.log.success(format!("Initialized {seeded} workflows"));
    }

    /// Activate every workflow and start the execution cycle
    ///
    /// A second call while running is a no-op.
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            self.log.warning("Workflow orchestrator is already running");
            return;
        }
        self.log.info("Starting workflow orchestrator...");

        for id in self.ids() {
            self.activate_workflow(&id);
        }

        if let Some(period) = self.config.execution_interval {
            let handle = self.spawn_execution_cycle(period);
            if let Some(previous) = self.cycle.lock().replace(handle) {
                previous.abort();
            }
        }
        self.log.success("Workflow orchestrator started");
    }

    /// Stop the execution cycle and deactivate every workflow
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            self.log.debug("Workflow orchestrator is not running");
            return;
        }
        self.log.info("Stopping workflow orchestrator...");

        let cycle = self.cycle.lock().take();
        if let Some(handle) = cycle {
            if let Err(e) = handle.cancel().await {
                self.log.warning(format!("Execution cycle ended abnormally: {e}"));
            }
        }
        for id in self.ids() {
            self.deactivate_workflow(&id);
        }
        self.log.success("Workflow orchestrator stopped");
    }

    /// Mark a workflow active; unknown ids are logged and ignored
    pub fn activate_workflow(&self, id: &str) {
        let mut workflows = self.workflows.write();
        let Some(workflow) = workflows.get_mut(id) else {
            drop(workflows);
            self.log.error(format!("Workflow not found: {id}"));
            return;
        };
        workflow.is_active = true;
        workflow.status = WorkflowState::Active;
        let name = workflow.name.clone();
        drop(workflows);
        self.log.success(format!("Workflow activated: {name}"));
    }

    /// Mark a workflow inactive; unknown ids are logged and ignored
    pub fn deactivate_workflow(&self, id: &str) {
        let mut workflows = self.workflows.write();
        let Some(workflow) = workflows.get_mut(id) else {
            drop(workflows);
            self.log.error(format!("Workflow not found: {id}"));
            return;
        };
        workflow.is_active = false;
        workflow.status = WorkflowState::Inactive;
        let name = workflow.name.clone();
        drop(workflows);
        self.log.info(format!("Workflow deactivated: {name}"));
    }

    /// Run one execution of an active workflow
    ///
    /// # Errors
    /// - `WorkflowError::NotActive` if the workflow is unknown or inactive
    /// - Whatever the runner returned, after the workflow was put in `error`
    pub async fn execute_workflow(
        &self,
        id: &str,
        data: &Value,
    ) -> Result<ExecutionOutcome, WorkflowError> {
        let snapshot = {
            let mut workflows = self.workflows.write();
            let workflow = workflows
                .get_mut(id)
                .filter(|w| w.is_active)
                .ok_or_else(|| WorkflowError::NotActive(id.to_string()))?;
            workflow.status = WorkflowState::Running;
            workflow.clone()
        };

        self.log.info(format!("Executing workflow: {}", snapshot.name));
        let result = self.runner.execute(&snapshot, data).await;

        let mut workflows = self.workflows.write();
        let Some(workflow) = workflows.get_mut(id) else {
            return result;
        };
        workflow.execution_count += 1;
        workflow.last_run = Some(Utc::now());

        match &result {
            Ok(outcome) => {
                let delta = if outcome.is_success() {
                    SUCCESS_DELTA
                } else {
                    FAILURE_DELTA
                };
                workflow.adjust_success_rate(delta);
                workflow.status = if workflow.is_active {
                    WorkflowState::Active
                } else {
                    WorkflowState::Inactive
                };
                let rate = workflow.success_rate;
                drop(workflows);

                match outcome {
                    ExecutionOutcome::Succeeded => {
                        metrics::counter!("tms_workflow_executions_total", "outcome" => "success")
                            .increment(1);
                        self.log.success(format!(
                            "Workflow completed: {} (success rate {rate}%)",
                            snapshot.name
                        ));
                    }
                    ExecutionOutcome::Failed { reason } => {
                        metrics::counter!("tms_workflow_executions_total", "outcome" => "failure")
                            .increment(1);
                        self.log.warning(format!(
                            "Workflow failed: {} ({reason}, success rate {rate}%)",
                            snapshot.name
                        ));
                    }
                }
            }
            Err(e) => {
                workflow.adjust_success_rate(ERROR_DELTA);
                workflow.status = WorkflowState::Error;
                drop(workflows);
                metrics::counter!("tms_workflow_executions_total", "outcome" => "error")
                    .increment(1);
                self.log
                    .error(format!("Workflow execution error: {}: {e}", snapshot.name));
            }
        }
        result
    }

    /// Deactivate, pause, reactivate every workflow in `error`
    ///
    /// Returns how many workflows were recovered.
    pub async fn recover_failed_workflows(&self) -> usize {
        let failed: Vec<String> = self
            .workflows
            .read()
            .values()
            .filter(|w| w.status == WorkflowState::Error)
            .map(|w| w.id.clone())
            .collect();

        if failed.is_empty() {
            return 0;
        }
        self.log
            .info(format!("Recovering {} failed workflows...", failed.len()));

        for id in &failed {
            self.deactivate_workflow(id);
            tokio::time::sleep(self.config.recovery_pause).await;
            self.activate_workflow(id);
        }
        metrics::counter!("tms_workflow_recoveries_total").increment(failed.len() as u64);
        failed.len()
    }

    #[must_use]
    pub fn status(&self) -> WorkflowStatus {
        let workflows = self.workflows.read();
        let active_workflows: Vec<String> = workflows
            .values()
            .filter(|w| w.is_active)
            .map(|w| w.id.clone())
            .collect();
        let failed_workflows: Vec<String> = workflows
            .values()
            .filter(|w| w.status == WorkflowState::Error)
            .map(|w| w.id.clone())
            .collect();

        WorkflowStatus {
            is_running: self.is_running(),
            total_workflows: workflows.len(),
            all_workflows_healthy: failed_workflows.is_empty(),
            active_workflows,
            failed_workflows,
        }
    }

    /// Register a workflow, activating it if the orchestrator runs
    ///
    /// # Errors
    /// Returns `WorkflowError::AlreadyExists` if the id is taken.
    pub fn add_workflow(&self, spec: WorkflowSpec) -> Result<(), WorkflowError> {
        let id = spec.id.clone();
        {
            let mut workflows = self.workflows.write();
            if workflows.contains_key(&id) {
                return Err(WorkflowError::AlreadyExists(id));
            }
            workflows.insert(id.clone(), Workflow::from_spec(spec));
        }
        self.log.success(format!("Added workflow: {id}"));
        if self.is_running() {
            self.activate_workflow(&id);
        }
        Ok(())
    }

    pub fn remove_workflow(&self, id: &str) -> Option<Workflow> {
        let removed = self.workflows.write().shift_remove(id);
        match &removed {
            Some(_) => self.log.success(format!("Removed workflow: {id}")),
            None => self.log.error(format!("Workflow not found: {id}")),
        }
        removed
    }

    /// Replace a workflow's configuration, cycling it if the orchestrator runs
    ///
    /// Returns `false` if the workflow is unknown.
    pub fn update_workflow_config(&self, id: &str, config: WorkflowConfig) -> bool {
        {
            let mut workflows = self.workflows.write();
            let Some(workflow) = workflows.get_mut(id) else {
                drop(workflows);
                self.log.error(format!("Workflow not found: {id}"));
                return false;
            };
            workflow.kind = config.kind();
            workflow.config = config;
        }
        self.log.info(format!("Updated config for workflow: {id}"));
        if self.is_running() {
            self.deactivate_workflow(id);
            self.activate_workflow(id);
        }
        true
    }

    #[must_use]
    pub fn workflow(&self, id: &str) -> Option<Workflow> {
        self.workflows.read().get(id).cloned()
    }

    #[must_use]
    pub fn workflows(&self) -> Vec<Workflow> {
        self.workflows.read().values().cloned().collect()
    }

    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn ids(&self) -> Vec<String> {
        self.workflows.read().keys().cloned().collect()
    }

    fn spawn_execution_cycle(self: &Arc<Self>, period: Duration) -> TaskHandle {
        let weak: Weak<Self> = Arc::downgrade(self);
        PeriodicTask::new("workflow-execution", period).spawn(move || {
            let weak = weak.clone();
            async move {
                let Some(orchestrator) = weak.upgrade() else {
                    return ControlFlow::Break(());
                };
                let active: Vec<String> = orchestrator
                    .workflows
                    .read()
                    .values()
                    .filter(|w| w.is_active)
                    .map(|w| w.id.clone())
                    .collect();
                let payload = Value::Object(serde_json::Map::new());
                for id in active {
                    if let Err(e) = orchestrator.execute_workflow(&id, &payload).await {
                        tracing::debug!(workflow = %id, "Scheduled execution ended in error: {e}");
                    }
                }
                ControlFlow::Continue(())
            }
        })
    }
}
