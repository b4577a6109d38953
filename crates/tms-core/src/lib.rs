//! AutoTMS Core - autonomous orchestration layer
//!
//! Cooperating in-process managers for a transportation management system:
//! - Tracks simulated agents and workflows as state machines
//! - Samples system health and maps issues to recovery actions
//! - Records notifications and escalates the urgent ones
//! - Generates portals and site pages from static templates
//! - Supervises everything from a polling controller with a bounded
//!   restart budget
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tms_core::prelude::*;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TmsConfig::load(None)?;
//! let log = LogManager::shared(config.log.capacity);
//! let controller = Arc::new(AutonomousTmsController::from_config(&config, &log));
//!
//! controller.initialize().await?;
//! controller.start().await?;
//! controller.wait().await;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod agents;
pub mod controller;
pub mod database;
pub mod error;
pub mod health;
pub mod notifications;
pub mod portal;
pub mod types;
pub mod website;
pub mod workflows;

pub use agents::{
    default_agents, AgentManagerConfig, AgentRunner, AgentStatus, AutonomousAgentManager,
    SimulatedAgentRunner,
};
pub use controller::{
    AutonomousTmsController, ControllerConfig, ControllerParts, ControllerState,
    ControllerStatus, MonitorReport, RecoveryAction,
};
pub use database::{DatabaseConfig, DatabaseManager, ExecutedQuery, QueryResult};
pub use error::{
    AgentError, ControllerError, DatabaseError, HealthError, NotificationError, PortalError,
    TmsError, WorkflowError,
};
pub use health::{
    CheckStatus, HealthCheckResult, HealthCheckRunner, HealthIssue, HealthStatus, HealthStore,
    HealthThresholds, InMemoryHealthStore, MetricsSource, SimulatedMetricsSource,
    SystemHealthMonitor, SystemMetrics, DEFAULT_HEALTH_HISTORY,
};
pub use notifications::{
    EmailChannel, Notification, NotificationChannel, NotificationManager, Priority, SlackChannel,
    SlackPayload, WebhookChannel,
};
pub use portal::{
    PortalAgentConfig, PortalDevelopmentAgent, PortalInstance, PortalManager, PortalTemplate,
    PortalType, PublishStatus, UserRole,
};
pub use types::{
    Agent, AgentConfig, AgentKind, AgentSpec, AgentState, ExecutionOutcome, Workflow,
    WorkflowConfig, WorkflowKind, WorkflowSpec, WorkflowState, MAX_SUCCESS_RATE,
};
pub use website::{
    WebsiteAgentConfig, WebsiteArchitecture, WebsiteBuilder, WebsiteDevelopmentAgent, WebsitePage,
};
pub use workflows::{
    default_workflows, SimulatedWorkflowRunner, WorkflowOrchestrator, WorkflowOrchestratorConfig,
    WorkflowRunner, WorkflowStatus,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for hosting the orchestration layer
    pub use crate::{
        AutonomousAgentManager, AutonomousTmsController, ControllerParts, ControllerState,
        HealthIssue, NotificationManager, Priority, SystemHealthMonitor, TmsError,
        WorkflowOrchestrator,
    };
    pub use tms_kernel::prelude::*;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
