//! Per-agent health checks persisted to a `HealthStore`

use super::{MetricsSource, SystemMetrics};
use super::store::HealthStore;
use crate::error::HealthError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::ControlFlow;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tms_kernel::{LogManager, LogScope, PeriodicTask, TaskHandle};

/// Coarse status derived from a metrics sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl CheckStatus {
    /// cpu or memory above 90 is unhealthy; cpu above 70, memory above 80
    /// or disk above 85 is degraded
    #[must_use]
    pub fn from_metrics(metrics: &SystemMetrics) -> Self {
        if metrics.cpu_usage > 90.0 || metrics.memory_usage > 90.0 {
            CheckStatus::Unhealthy
        } else if metrics.cpu_usage > 70.0
            || metrics.memory_usage > 80.0
            || metrics.disk_usage > 85.0
        {
            CheckStatus::Degraded
        } else {
            CheckStatus::Healthy
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Healthy => "healthy",
            CheckStatus::Degraded => "degraded",
            CheckStatus::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `agent_health_checks` row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub agent_type: String,
    pub status: CheckStatus,
    #[serde(rename = "response_time")]
    pub response_time_ms: u64,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub metrics: SystemMetrics,
}

pub struct HealthCheckRunner {
    source: Arc<dyn MetricsSource>,
    store: Arc<dyn HealthStore>,
    log: LogScope,
}

impl fmt::Debug for HealthCheckRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthCheckRunner").finish_non_exhaustive()
    }
}

impl HealthCheckRunner {
    #[must_use]
    pub fn new(
        source: Arc<dyn MetricsSource>,
        store: Arc<dyn HealthStore>,
        log: &Arc<LogManager>,
    ) -> Self {
        Self {
            source,
            store,
            log: log.scope("health-check"),
        }
    }

    /// Sample, classify and persist one check for `agent_type`
    ///
    /// # Errors
    /// Returns `HealthError` if sampling or the insert fails.
    pub async fn run_check(&self, agent_type: &str) -> Result<HealthCheckResult, HealthError> {
        let started = tokio::time::Instant::now();
        let metrics = self.source.sample().await?;
        let status = CheckStatus::from_metrics(&metrics);
        let message = format!(
            "cpu {:.1}%, memory {:.1}%, disk {:.1}%",
            metrics.cpu_usage, metrics.memory_usage, metrics.disk_usage
        );
        let response_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let row = HealthCheckResult {
            agent_type: agent_type.to_string(),
            status,
            response_time_ms,
            message,
            timestamp: Utc::now(),
            metrics,
        };
        self.store.insert(row.clone()).await?;

        match status {
            CheckStatus::Healthy => self.log.debug(format!("{agent_type}: {status}")),
            CheckStatus::Degraded => self
                .log
                .warning(format!("{agent_type}: {status} ({})", row.message)),
            CheckStatus::Unhealthy => self
                .log
                .error(format!("{agent_type}: {status} ({})", row.message)),
        }
        Ok(row)
    }

    /// One check per agent type; failures are logged and skipped
    ///
    /// Returns how many checks were persisted.
    pub async fn run_checks(&self, agent_types: &[String]) -> usize {
        let mut persisted = 0;
        for agent_type in agent_types {
            match self.run_check(agent_type).await {
                Ok(_) => {
                    metrics::counter!("tms_agent_health_checks_total").increment(1);
                    persisted += 1;
                }
                Err(e) => self
                    .log
                    .warning(format!("Health check failed for {agent_type}: {e}")),
            }
        }
        persisted
    }

    /// Run `run_checks` over `agent_types` every `period`
    ///
    /// The cycle ends when the runner is dropped or the handle is cancelled.
    pub fn spawn_cycle(self: &Arc<Self>, agent_types: Vec<String>, period: Duration) -> TaskHandle {
        let weak: Weak<Self> = Arc::downgrade(self);
        let agent_types = Arc::new(agent_types);
        PeriodicTask::new("agent-health-checks", period).spawn(move || {
            let weak = weak.clone();
            let agent_types = Arc::clone(&agent_types);
            async move {
                let Some(runner) = weak.upgrade() else {
                    return ControlFlow::Break(());
                };
                runner.run_checks(&agent_types).await;
                ControlFlow::Continue(())
            }
        })
    }

    /// Number of persisted rows
    ///
    /// # Errors
    /// Propagates store failures.
    pub async fn total_checks(&self) -> Result<usize, HealthError> {
        self.store.count().await
    }

    /// Most recent row, optionally for one agent type
    ///
    /// # Errors
    /// Propagates store failures.
    pub async fn latest(
        &self,
        agent_type: Option<&str>,
    ) -> Result<Option<HealthCheckResult>, HealthError> {
        self.store.latest(agent_type).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::InMemoryHealthStore;
    use parking_lot::Mutex;

    struct Scripted(Mutex<Vec<SystemMetrics>>);

    #[async_trait::async_trait]
    impl MetricsSource for Scripted {
        async fn sample(&self) -> Result<SystemMetrics, HealthError> {
            self.0
                .lock()
                .pop()
                .ok_or_else(|| HealthError::ProbeFailed("script exhausted".into()))
        }
    }

    fn metrics(cpu: f64, memory: f64, disk: f64) -> SystemMetrics {
        SystemMetrics {
            cpu_usage: cpu,
            memory_usage: memory,
            disk_usage: disk,
            ..SystemMetrics::default()
        }
    }

    #[test]
    fn status_classification() {
        assert_eq!(CheckStatus::from_metrics(&metrics(10.0, 10.0, 10.0)), CheckStatus::Healthy);
        assert_eq!(CheckStatus::from_metrics(&metrics(75.0, 10.0, 10.0)), CheckStatus::Degraded);
        assert_eq!(CheckStatus::from_metrics(&metrics(10.0, 10.0, 86.0)), CheckStatus::Degraded);
        assert_eq!(CheckStatus::from_metrics(&metrics(10.0, 91.0, 10.0)), CheckStatus::Unhealthy);
        assert_eq!(CheckStatus::from_metrics(&metrics(95.0, 85.0, 99.0)), CheckStatus::Unhealthy);
    }

    #[tokio::test]
    async fn checks_are_persisted() {
        let store = Arc::new(InMemoryHealthStore::new());
        let source = Scripted(Mutex::new(vec![
            metrics(95.0, 10.0, 10.0),
            metrics(10.0, 10.0, 10.0),
        ]));
        let runner =
            HealthCheckRunner::new(Arc::new(source), store.clone(), &LogManager::shared(100));

        let first = runner.run_check("load_matching").await.unwrap();
        assert_eq!(first.status, CheckStatus::Healthy);
        let second = runner.run_check("billing").await.unwrap();
        assert_eq!(second.status, CheckStatus::Unhealthy);

        assert_eq!(runner.total_checks().await.unwrap(), 2);
        let latest = runner.latest(Some("load_matching")).await.unwrap().unwrap();
        assert_eq!(latest.agent_type, "load_matching");
        assert_eq!(runner.latest(None).await.unwrap().unwrap().agent_type, "billing");
    }

    #[tokio::test]
    async fn failed_sample_persists_nothing() {
        let store = Arc::new(InMemoryHealthStore::new());
        let runner = HealthCheckRunner::new(
            Arc::new(Scripted(Mutex::new(Vec::new()))),
            store.clone(),
            &LogManager::shared(100),
        );
        assert!(runner.run_check("tracking").await.is_err());
        assert!(store.rows().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cycle_checks_every_agent_and_skips_failures() {
        let store = Arc::new(InMemoryHealthStore::with_capacity(4));
        // Popped from the back: one good sample, then the script runs dry
        let source = Scripted(Mutex::new(vec![metrics(10.0, 10.0, 10.0)]));
        let log = LogManager::shared(100);
        let runner = Arc::new(HealthCheckRunner::new(Arc::new(source), store.clone(), &log));

        let agent_types = vec!["tracking".to_string(), "billing".to_string()];
        let handle = runner.spawn_cycle(agent_types, Duration::from_secs(60));
        assert_eq!(store.rows().len(), 0);

        tokio::time::sleep(Duration::from_secs(61)).await;
        let rows = store.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].agent_type, "tracking");
        assert!(log
            .logs_from("health-check")
            .iter()
            .any(|e| e.message.starts_with("Health check failed for billing")));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(store.rows().len(), 1);
        handle.cancel().await.unwrap();
    }

    #[test]
    fn row_uses_column_names() {
        let row = HealthCheckResult {
            agent_type: "a".into(),
            status: CheckStatus::Degraded,
            response_time_ms: 12,
            message: "m".into(),
            timestamp: Utc::now(),
            metrics: SystemMetrics::default(),
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["response_time"], 12);
        assert_eq!(json["status"], "degraded");
    }
}
