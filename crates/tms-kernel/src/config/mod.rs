//! Layered configuration
//!
//! Sources, lowest precedence first:
//! - Default values
//! - TOML configuration file
//! - Environment variables
//!
//! Durations are stored in milliseconds so the file format stays flat.

use crate::error::ConfigError;
use crate::logging::DEFAULT_LOG_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Deployment environment (`NODE_ENV`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            "test" => Some(Self::Test),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub capacity: usize,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

/// Hosted data store connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub anon_key: Option<String>,
    pub project_id: Option<String>,
    pub region: Option<String>,
    /// Simulated connect/query latency
    pub latency_ms: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            project_id: None,
            region: None,
            latency_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    /// Master switch for external fan-out
    pub enabled: bool,
    pub slack_webhook_url: Option<String>,
    pub email_enabled: bool,
    pub webhook_url: Option<String>,
}

/// Top-level controller loop settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    pub poll_interval_ms: u64,
    pub max_restarts: u32,
    pub restart_delay_ms: u64,
}

impl ControllerSettings {
    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[inline]
    #[must_use]
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 30_000,
            max_restarts: 5,
            restart_delay_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Pause between stopping and starting a failed agent
    pub restart_pause_ms: u64,
    /// Heartbeat cycle refreshing `last_activity`; 0 disables it
    pub heartbeat_interval_ms: u64,
    /// Probability that a simulated start fails
    pub start_failure_rate: f64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            restart_pause_ms: 2_000,
            heartbeat_interval_ms: 60_000,
            start_failure_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    /// Pause between deactivating and reactivating a failed workflow
    pub recovery_pause_ms: u64,
    /// Background execution cycle; 0 disables it
    pub execution_interval_ms: u64,
    /// Probability that a simulated execution succeeds
    pub success_probability: f64,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            recovery_pause_ms: 2_000,
            execution_interval_ms: 300_000,
            success_probability: 0.9,
        }
    }
}

/// Health thresholds and fabricated-signal probabilities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    pub cpu_threshold: f64,
    pub memory_threshold: f64,
    pub disk_threshold: f64,
    pub network_threshold_ms: u64,
    pub database_success_probability: f64,
    pub api_success_probability: f64,
    /// Per-agent check cycle; 0 disables it
    pub check_interval_ms: u64,
    /// Check rows kept by the in-memory store
    pub history_capacity: usize,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            cpu_threshold: 80.0,
            memory_threshold: 85.0,
            disk_threshold: 90.0,
            network_threshold_ms: 1_000,
            database_success_probability: 0.9,
            api_success_probability: 0.95,
            check_interval_ms: 300_000,
            history_capacity: 1_000,
        }
    }
}

impl HealthSettings {
    /// `None` when the check cycle is disabled
    #[must_use]
    pub fn check_interval(&self) -> Option<Duration> {
        (self.check_interval_ms > 0).then(|| Duration::from_millis(self.check_interval_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalSettings {
    /// Portal creation cycle; 0 disables it
    pub creation_interval_ms: u64,
    /// Website page cycle; 0 disables it
    pub website_interval_ms: u64,
    /// Simulated deploy time
    pub deploy_delay_ms: u64,
    /// Whether new portals are deployed (draft -> published)
    pub production_access: bool,
}

impl Default for PortalSettings {
    fn default() -> Self {
        Self {
            creation_interval_ms: 60_000,
            website_interval_ms: 120_000,
            deploy_delay_ms: 3_000,
            production_access: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Fixed RNG seed; `None` seeds from the OS
    pub seed: Option<u64>,
}

/// Complete AutoTMS configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TmsConfig {
    pub environment: Environment,
    pub log: LogSettings,
    pub database: DatabaseSettings,
    pub notifications: NotificationSettings,
    pub controller: ControllerSettings,
    pub agents: AgentSettings,
    pub workflows: WorkflowSettings,
    pub health: HealthSettings,
    pub portals: PortalSettings,
    pub simulation: SimulationSettings,
}

impl TmsConfig {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document
    ///
    /// # Errors
    /// Returns `ConfigError::Parse` on malformed input.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    /// Returns `ConfigError` if the file is unreadable or malformed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Defaults, then `path` if given, then the process environment
    ///
    /// # Errors
    /// Returns `ConfigError` if the file or an environment value is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        base.with_env_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` for unparseable values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::default().with_env_lookup(lookup)
    }

    /// Overlay environment-style variables onto this config
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` for unparseable values.
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| lookup(k).filter(|v| !v.trim().is_empty()))
        };

        if let Some(url) = get(&["SUPABASE_URL", "VITE_SUPABASE_URL"]) {
            self.database.url = Some(url);
        }
        if let Some(key) = get(&["SUPABASE_ANON_KEY", "VITE_SUPABASE_ANON_KEY"]) {
            self.database.anon_key = Some(key);
        }
        if let Some(id) = get(&["SUPABASE_PROJECT_ID"]) {
            self.database.project_id = Some(id);
        }
        if let Some(region) = get(&["SUPABASE_REGION"]) {
            self.database.region = Some(region);
        }

        if let Some(raw) = get(&["NOTIFICATIONS_ENABLED"]) {
            self.notifications.enabled = parse_flag("NOTIFICATIONS_ENABLED", &raw)?;
        }
        if let Some(url) = get(&["SLACK_WEBHOOK_URL"]) {
            self.notifications.slack_webhook_url = Some(url);
        }
        if let Some(raw) = get(&["EMAIL_SERVICE_ENABLED"]) {
            self.notifications.email_enabled = parse_flag("EMAIL_SERVICE_ENABLED", &raw)?;
        }
        if let Some(url) = get(&["WEBHOOK_URL"]) {
            self.notifications.webhook_url = Some(url);
        }

        if let Some(raw) = get(&["NODE_ENV"]) {
            self.environment =
                Environment::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
                    key: "NODE_ENV".to_string(),
                    value: raw,
                })?;
        }

        Ok(self)
    }

    #[inline]
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}
