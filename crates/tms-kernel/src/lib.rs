//! AutoTMS Kernel (tms-kernel)
//!
//! Foundation shared by every orchestration component:
//! - **Logging**: bounded ring-buffer log that mirrors into `tracing`
//! - **Scheduling**: cancellable periodic tasks on the tokio clock
//! - **Supervision**: bounded restart budget (process-level circuit breaker)
//! - **Configuration**: defaults, TOML file and environment layering
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use tms_kernel::prelude::*;
//!
//! let log = LogManager::shared(DEFAULT_LOG_CAPACITY);
//! log.scope("controller").info("starting");
//!
//! let handle = PeriodicTask::new("poll", Duration::from_secs(30))
//!     .spawn(|| async { ControlFlow::Continue(()) });
//! handle.cancel().await?;
//! ```

#![allow(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod scheduler;
pub mod supervisor;

pub use config::{
    AgentSettings, ControllerSettings, DatabaseSettings, Environment, HealthSettings,
    LogSettings, NotificationSettings, PortalSettings, SimulationSettings, TmsConfig,
    WorkflowSettings,
};
pub use error::{ConfigError, LogError, SchedulerError};
pub use logging::{LogEntry, LogLevel, LogManager, LogScope, DEFAULT_LOG_CAPACITY};
pub use scheduler::{PeriodicTask, TaskHandle};
pub use supervisor::{CircuitState, RestartBudget, RestartDecision, RestartPolicy};

/// Common imports for kernel users
pub mod prelude {
    pub use crate::config::TmsConfig;
    pub use crate::logging::{LogLevel, LogManager, LogScope, DEFAULT_LOG_CAPACITY};
    pub use crate::scheduler::{PeriodicTask, TaskHandle};
    pub use crate::supervisor::{RestartBudget, RestartDecision, RestartPolicy};
    pub use std::ops::ControlFlow;
    pub use std::time::Duration;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
