//! Health monitoring
//!
//! - `monitor`: `SystemHealthMonitor`, threshold checks over a `MetricsSource`
//! - `runner`: `HealthCheckRunner`, per-agent checks persisted to a store
//! - `store`: the `agent_health_checks` table contract

pub mod monitor;
pub mod runner;
pub mod store;

pub use monitor::{MetricsSource, SimulatedMetricsSource, SystemHealthMonitor};
pub use runner::{CheckStatus, HealthCheckResult, HealthCheckRunner};
pub use store::{HealthStore, InMemoryHealthStore, DEFAULT_HEALTH_HISTORY};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tms_kernel::HealthSettings;

/// One sample of the system's vital signs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    /// Percent, `0..=100`
    pub cpu_usage: f64,
    /// Percent, `0..=100`
    pub memory_usage: f64,
    /// Percent, `0..=100`
    pub disk_usage: f64,
    pub network_latency_ms: u64,
    pub database_reachable: bool,
    pub api_reachable: bool,
    pub uptime_secs: u64,
}

impl Default for SystemMetrics {
    fn default() -> Self {
        Self {
            cpu_usage: 0.0,
            memory_usage: 0.0,
            disk_usage: 0.0,
            network_latency_ms: 0,
            database_reachable: true,
            api_reachable: true,
            uptime_secs: 0,
        }
    }
}

/// A detected anomaly, identified by a stable code
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HealthIssue {
    CpuHigh,
    MemoryHigh,
    DiskHigh,
    NetworkSlow,
    DatabaseConnection,
    ApiFailure,
    AgentFailure,
    WorkflowFailure,
    /// Any code without a dedicated variant
    Other(String),
}

impl HealthIssue {
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            HealthIssue::CpuHigh => "cpu_high",
            HealthIssue::MemoryHigh => "memory_high",
            HealthIssue::DiskHigh => "disk_high",
            HealthIssue::NetworkSlow => "network_slow",
            HealthIssue::DatabaseConnection => "database_connection",
            HealthIssue::ApiFailure => "api_failure",
            HealthIssue::AgentFailure => "agent_failure",
            HealthIssue::WorkflowFailure => "workflow_failure",
            HealthIssue::Other(code) => code,
        }
    }
}

impl From<&str> for HealthIssue {
    fn from(code: &str) -> Self {
        match code {
            "cpu_high" => HealthIssue::CpuHigh,
            "memory_high" => HealthIssue::MemoryHigh,
            "disk_high" => HealthIssue::DiskHigh,
            "network_slow" => HealthIssue::NetworkSlow,
            "database_connection" => HealthIssue::DatabaseConnection,
            "api_failure" => HealthIssue::ApiFailure,
            "agent_failure" => HealthIssue::AgentFailure,
            "workflow_failure" => HealthIssue::WorkflowFailure,
            other => HealthIssue::Other(other.to_string()),
        }
    }
}

impl From<String> for HealthIssue {
    fn from(code: String) -> Self {
        HealthIssue::from(code.as_str())
    }
}

impl From<HealthIssue> for String {
    fn from(issue: HealthIssue) -> Self {
        issue.code().to_string()
    }
}

impl fmt::Display for HealthIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Outcome of one `check_health` call; not retained between calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub is_healthy: bool,
    pub issues: Vec<HealthIssue>,
    pub metrics: SystemMetrics,
    pub last_check: DateTime<Utc>,
}

impl HealthStatus {
    #[must_use]
    pub fn new(metrics: SystemMetrics, issues: Vec<HealthIssue>) -> Self {
        Self {
            is_healthy: issues.is_empty(),
            issues,
            metrics,
            last_check: Utc::now(),
        }
    }
}

/// Static limits a sample is compared against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthThresholds {
    pub cpu: f64,
    pub memory: f64,
    pub disk: f64,
    pub network_ms: u64,
}

impl HealthThresholds {
    #[must_use]
    pub fn from_settings(settings: &HealthSettings) -> Self {
        Self {
            cpu: settings.cpu_threshold,
            memory: settings.memory_threshold,
            disk: settings.disk_threshold,
            network_ms: settings.network_threshold_ms,
        }
    }

    /// Issues raised by `metrics`, in a fixed order
    #[must_use]
    pub fn evaluate(&self, metrics: &SystemMetrics) -> Vec<HealthIssue> {
        let mut issues = Vec::new();
        if metrics.cpu_usage > self.cpu {
            issues.push(HealthIssue::CpuHigh);
        }
        if metrics.memory_usage > self.memory {
            issues.push(HealthIssue::MemoryHigh);
        }
        if metrics.disk_usage > self.disk {
            issues.push(HealthIssue::DiskHigh);
        }
        if metrics.network_latency_ms > self.network_ms {
            issues.push(HealthIssue::NetworkSlow);
        }
        if !metrics.database_reachable {
            issues.push(HealthIssue::DatabaseConnection);
        }
        if !metrics.api_reachable {
            issues.push(HealthIssue::ApiFailure);
        }
        issues
    }
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self::from_settings(&HealthSettings::default())
    }
}
