//! System health monitor

use super::{HealthIssue, HealthStatus, HealthThresholds, SystemMetrics};
use crate::error::HealthError;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use sysinfo::System;
use tms_kernel::{HealthSettings, LogManager, LogScope};

/// Produces one metrics sample per call
#[async_trait::async_trait]
pub trait MetricsSource: Send + Sync {
    async fn sample(&self) -> Result<SystemMetrics, HealthError>;
}

/// CPU and memory from the host; disk, network, database and API are fabricated
pub struct SimulatedMetricsSource {
    system: Mutex<System>,
    rng: Mutex<StdRng>,
    database_success_probability: f64,
    api_success_probability: f64,
    started: std::time::Instant,
}

impl std::fmt::Debug for SimulatedMetricsSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedMetricsSource")
            .field("database_success_probability", &self.database_success_probability)
            .field("api_success_probability", &self.api_success_probability)
            .finish_non_exhaustive()
    }
}

impl SimulatedMetricsSource {
    #[must_use]
    pub fn new(settings: &HealthSettings, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            system: Mutex::new(System::new()),
            rng: Mutex::new(rng),
            database_success_probability: settings.database_success_probability.clamp(0.0, 1.0),
            api_success_probability: settings.api_success_probability.clamp(0.0, 1.0),
            started: std::time::Instant::now(),
        }
    }

    fn host_usage(&self) -> (f64, f64) {
        let mut sys = self.system.lock();
        sys.refresh_cpu();
        sys.refresh_memory();

        let cpus = sys.cpus();
        let cpu = if cpus.is_empty() {
            0.0
        } else {
            cpus.iter().map(|c| f64::from(c.cpu_usage())).sum::<f64>() / cpus.len() as f64
        };
        let memory = match sys.total_memory() {
            0 => 0.0,
            total => sys.used_memory() as f64 / total as f64 * 100.0,
        };
        (cpu, memory)
    }
}

#[async_trait::async_trait]
impl MetricsSource for SimulatedMetricsSource {
    async fn sample(&self) -> Result<SystemMetrics, HealthError> {
        let (cpu_usage, memory_usage) = self.host_usage();
        let mut rng = self.rng.lock();
        Ok(SystemMetrics {
            cpu_usage,
            memory_usage,
            disk_usage: rng.random_range(0.0..100.0),
            network_latency_ms: rng.random_range(0..1_500),
            database_reachable: rng.random_bool(self.database_success_probability),
            api_reachable: rng.random_bool(self.api_success_probability),
            uptime_secs: self.started.elapsed().as_secs(),
        })
    }
}

type ReclaimHook = Arc<dyn Fn() + Send + Sync>;

/// Threshold-based health checks over a metrics source
pub struct SystemHealthMonitor {
    source: Arc<dyn MetricsSource>,
    thresholds: HealthThresholds,
    reclaim: Mutex<Option<ReclaimHook>>,
    last: Mutex<Option<HealthStatus>>,
    log: LogScope,
}

impl std::fmt::Debug for SystemHealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemHealthMonitor")
            .field("thresholds", &self.thresholds)
            .finish_non_exhaustive()
    }
}

impl SystemHealthMonitor {
    #[must_use]
    pub fn new(
        source: Arc<dyn MetricsSource>,
        thresholds: HealthThresholds,
        log: &Arc<LogManager>,
    ) -> Self {
        Self {
            source,
            thresholds,
            reclaim: Mutex::new(None),
            last: Mutex::new(None),
            log: log.scope("health-monitor"),
        }
    }

    pub fn initialize(&self) {
        let t = &self.thresholds;
        self.log.success(format!(
            "Health monitor initialized (cpu>{}%, memory>{}%, disk>{}%, network>{}ms)",
            t.cpu, t.memory, t.disk, t.network_ms
        ));
    }

    #[inline]
    #[must_use]
    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    /// Sample the source and compare against the thresholds
    ///
    /// # Errors
    /// Propagates `HealthError::ProbeFailed` from the source.
    pub async fn check_health(&self) -> Result<HealthStatus, HealthError> {
        let metrics = self.source.sample().await?;
        let issues = self.thresholds.evaluate(&metrics);
        let status = HealthStatus::new(metrics, issues);

        if status.is_healthy {
            self.log.debug("System health check passed");
        } else {
            let codes: Vec<&str> = status.issues.iter().map(HealthIssue::code).collect();
            self.log
                .warning(format!("Health issues detected: {}", codes.join(", ")));
        }
        *self.last.lock() = Some(status.clone());
        Ok(status)
    }

    /// Result of the most recent successful check
    ///
    /// Only this one snapshot is kept, for the controller's status report.
    /// Each successful check overwrites it and a failed check leaves it as is.
    #[must_use]
    pub fn last_status(&self) -> Option<HealthStatus> {
        self.last.lock().clone()
    }

    /// Install the callback run by `cleanup_memory`
    pub fn set_reclaim_hook<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.reclaim.lock() = Some(Arc::new(hook));
    }

    /// Run the reclaim hook if one is installed
    ///
    /// Returns whether a hook ran.
    pub fn cleanup_memory(&self) -> bool {
        let hook = self.reclaim.lock().clone();
        match hook {
            Some(hook) => {
                hook();
                self.log.success("Memory cleanup completed");
                true
            }
            None => {
                self.log.debug("No memory reclaim hook installed");
                false
            }
        }
    }
}
