//! Error types for AutoTMS Core
//!
//! Taxonomy:
//! - Not-found: manager operations on unknown ids (logged, never raised to
//!   the controller)
//! - Precondition: executing an inactive workflow, querying a disconnected
//!   database
//! - Transient: failures reported by injected runners and probes
//! - Fatal: controller initialization failures

use tms_kernel::{ConfigError, SchedulerError};

/// Umbrella error type
#[derive(Debug, thiserror::Error)]
pub enum TmsError {
    #[error("agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("health error: {0}")]
    Health(#[from] HealthError),

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("notification error: {0}")]
    Notification(#[from] NotificationError),

    #[error("portal error: {0}")]
    Portal(#[from] PortalError),

    #[error("controller error: {0}")]
    Controller(#[from] ControllerError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl TmsError {
    /// Check if error is worth retrying
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Agent(
                AgentError::StartFailed { .. }
                | AgentError::StopFailed { .. }
                | AgentError::Unresponsive { .. },
            ) => true,
            Self::Workflow(WorkflowError::ExecutionFailed { .. }) => true,
            Self::Health(HealthError::ProbeFailed(_)) => true,
            Self::Database(DatabaseError::NotConnected | DatabaseError::ConnectionFailed(_)) => {
                true
            }
            Self::Notification(NotificationError::DeliveryFailed { .. }) => true,
            _ => false,
        }
    }
}

/// Agent manager errors
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("agent not found: {0}")]
    NotFound(String),

    #[error("agent already exists: {0}")]
    AlreadyExists(String),

    #[error("agent {id} failed to start: {reason}")]
    StartFailed { id: String, reason: String },

    #[error("agent {id} failed to stop: {reason}")]
    StopFailed { id: String, reason: String },

    #[error("agent {id} missed its heartbeat: {reason}")]
    Unresponsive { id: String, reason: String },
}

/// Workflow orchestrator errors
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("workflow already exists: {0}")]
    AlreadyExists(String),

    /// Execution requested on an inactive workflow
    #[error("Workflow is not active: {0}")]
    NotActive(String),

    #[error("workflow {id} execution failed: {reason}")]
    ExecutionFailed { id: String, reason: String },
}

/// Health monitoring errors
#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    /// A metrics source could not produce a sample
    #[error("health probe failed: {0}")]
    ProbeFailed(String),

    #[error("health store error: {0}")]
    Store(String),
}

/// Database manager errors
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("database is not connected")]
    NotConnected,

    #[error("database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("missing database configuration: {0}")]
    MissingConfig(&'static str),
}

/// Notification errors
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("delivery via {channel} failed: {reason}")]
    DeliveryFailed { channel: String, reason: String },

    #[error("notification payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Portal and website errors
#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error("Portal not found: {0}")]
    NotFound(String),

    #[error("portal template not found: {0}")]
    TemplateNotFound(String),

    #[error("portal path already in use: {0}")]
    PathInUse(String),

    #[error("website architecture has not been generated")]
    ArchitectureMissing,

    #[error("portal storage failed: {0}")]
    Storage(#[from] DatabaseError),
}

/// Top-level controller errors
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("controller is not initialized")]
    NotInitialized,

    #[error("controller is already running")]
    AlreadyRunning,

    /// A subsystem failed while the controller was initializing
    #[error("initialization of {component} failed: {source}")]
    Initialization {
        component: &'static str,
        #[source]
        source: Box<TmsError>,
    },

    /// A monitoring iteration failed
    #[error("monitoring iteration failed: {0}")]
    Monitoring(Box<TmsError>),

    #[error("monitor task error: {0}")]
    Scheduler(#[from] SchedulerError),
}

impl ControllerError {
    /// Initialization failures terminate the host
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Initialization { .. })
    }

    #[must_use]
    pub fn initialization(component: &'static str, source: impl Into<TmsError>) -> Self {
        Self::Initialization {
            component,
            source: Box::new(source.into()),
        }
    }

    #[must_use]
    pub fn monitoring(source: impl Into<TmsError>) -> Self {
        Self::Monitoring(Box::new(source.into()))
    }
}
