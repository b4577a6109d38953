//! Core types for the orchestration layer
//!
//! Defines the records owned by the managers:
//! - Agents: lifecycle state, kind and strongly typed configuration
//! - Workflows: lifecycle state, kind, configuration and running health score
//!
//! Configuration is a tagged union per kind; `AgentKind::default_config`
//! and `WorkflowKind::default_config` are the lookup tables keyed by kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a single agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Starting,
    Running,
    Stopped,
    Error,
}

impl AgentState {
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Starting => "starting",
            AgentState::Running => "running",
            AgentState::Stopped => "stopped",
            AgentState::Error => "error",
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Agent kinds known to the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    LoadMatching,
    RateOptimization,
    RoutePlanning,
    CarrierVetting,
    Compliance,
    Billing,
    Tracking,
    DocumentProcessing,
    CustomerSupport,
    Analytics,
}

impl AgentKind {
    pub const ALL: [AgentKind; 10] = [
        AgentKind::LoadMatching,
        AgentKind::RateOptimization,
        AgentKind::RoutePlanning,
        AgentKind::CarrierVetting,
        AgentKind::Compliance,
        AgentKind::Billing,
        AgentKind::Tracking,
        AgentKind::DocumentProcessing,
        AgentKind::CustomerSupport,
        AgentKind::Analytics,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::LoadMatching => "load_matching",
            AgentKind::RateOptimization => "rate_optimization",
            AgentKind::RoutePlanning => "route_planning",
            AgentKind::CarrierVetting => "carrier_vetting",
            AgentKind::Compliance => "compliance",
            AgentKind::Billing => "billing",
            AgentKind::Tracking => "tracking",
            AgentKind::DocumentProcessing => "document_processing",
            AgentKind::CustomerSupport => "customer_support",
            AgentKind::Analytics => "analytics",
        }
    }

    /// Default configuration for this kind
    #[must_use]
    pub fn default_config(&self) -> AgentConfig {
        match self {
            AgentKind::LoadMatching => AgentConfig::LoadMatching {
                search_radius_miles: 250,
                min_match_score: 0.75,
            },
            AgentKind::RateOptimization => AgentConfig::RateOptimization {
                target_margin_pct: 15.0,
                market_refresh_secs: 900,
            },
            AgentKind::RoutePlanning => AgentConfig::RoutePlanning {
                max_stops: 12,
                avoid_tolls: false,
            },
            AgentKind::CarrierVetting => AgentConfig::CarrierVetting {
                min_safety_score: 0.8,
                require_insurance: true,
            },
            AgentKind::Compliance => AgentConfig::Compliance {
                check_interval_secs: 3_600,
                regulations: vec!["hos".to_string(), "eld".to_string(), "ifta".to_string()],
            },
            AgentKind::Billing => AgentConfig::Billing {
                auto_invoice: true,
                payment_terms_days: 30,
            },
            AgentKind::Tracking => AgentConfig::Tracking {
                update_interval_secs: 300,
                geofence_radius_miles: 0.5,
            },
            AgentKind::DocumentProcessing => AgentConfig::DocumentProcessing {
                ocr_enabled: true,
                formats: vec!["pdf".to_string(), "png".to_string(), "jpg".to_string()],
            },
            AgentKind::CustomerSupport => AgentConfig::CustomerSupport {
                escalation_after_mins: 30,
                auto_reply: true,
            },
            AgentKind::Analytics => AgentConfig::Analytics {
                report_interval_secs: 86_400,
                retention_days: 90,
            },
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-kind agent configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentConfig {
    LoadMatching {
        search_radius_miles: u32,
        min_match_score: f64,
    },
    RateOptimization {
        target_margin_pct: f64,
        market_refresh_secs: u64,
    },
    RoutePlanning {
        max_stops: u32,
        avoid_tolls: bool,
    },
    CarrierVetting {
        min_safety_score: f64,
        require_insurance: bool,
    },
    Compliance {
        check_interval_secs: u64,
        regulations: Vec<String>,
    },
    Billing {
        auto_invoice: bool,
        payment_terms_days: u32,
    },
    Tracking {
        update_interval_secs: u64,
        geofence_radius_miles: f64,
    },
    DocumentProcessing {
        ocr_enabled: bool,
        formats: Vec<String>,
    },
    CustomerSupport {
        escalation_after_mins: u32,
        auto_reply: bool,
    },
    Analytics {
        report_interval_secs: u64,
        retention_days: u32,
    },
}

impl AgentConfig {
    /// Kind this configuration belongs to
    #[must_use]
    pub fn kind(&self) -> AgentKind {
        match self {
            AgentConfig::LoadMatching { .. } => AgentKind::LoadMatching,
            AgentConfig::RateOptimization { .. } => AgentKind::RateOptimization,
            AgentConfig::RoutePlanning { .. } => AgentKind::RoutePlanning,
            AgentConfig::CarrierVetting { .. } => AgentKind::CarrierVetting,
            AgentConfig::Compliance { .. } => AgentKind::Compliance,
            AgentConfig::Billing { .. } => AgentKind::Billing,
            AgentConfig::Tracking { .. } => AgentKind::Tracking,
            AgentConfig::DocumentProcessing { .. } => AgentKind::DocumentProcessing,
            AgentConfig::CustomerSupport { .. } => AgentKind::CustomerSupport,
            AgentConfig::Analytics { .. } => AgentKind::Analytics,
        }
    }
}

/// Static definition of an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub id: String,
    pub name: String,
    pub config: AgentConfig,
}

impl AgentSpec {
    /// Spec with the default configuration for `kind`
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: AgentKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            config: kind.default_config(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> AgentKind {
        self.config.kind()
    }
}

/// Tracked agent record
///
/// Invariant: `is_running` implies `status == Running`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub kind: AgentKind,
    pub is_running: bool,
    pub last_activity: Option<DateTime<Utc>>,
    pub status: AgentState,
    pub config: AgentConfig,
}

impl Agent {
    #[must_use]
    pub fn from_spec(spec: AgentSpec) -> Self {
        Self {
            kind: spec.config.kind(),
            id: spec.id,
            name: spec.name,
            is_running: false,
            last_activity: None,
            status: AgentState::Stopped,
            config: spec.config,
        }
    }

    #[must_use]
    pub fn spec(&self) -> AgentSpec {
        AgentSpec {
            id: self.id.clone(),
            name: self.name.clone(),
            config: self.config.clone(),
        }
    }

    /// Whether the restart sweep should pick this agent up
    #[inline]
    #[must_use]
    pub fn needs_restart(&self) -> bool {
        self.status == AgentState::Error || !self.is_running
    }
}

/// Lifecycle state of a single workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Active,
    Inactive,
    Running,
    Error,
}

impl WorkflowState {
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::Active => "active",
            WorkflowState::Inactive => "inactive",
            WorkflowState::Running => "running",
            WorkflowState::Error => "error",
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workflow kinds known to the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    LoadBooking,
    CarrierOnboarding,
    InvoiceGeneration,
    ShipmentTracking,
    ComplianceAudit,
    RateQuote,
    DocumentVerification,
    PaymentProcessing,
}

impl WorkflowKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowKind::LoadBooking => "load_booking",
            WorkflowKind::CarrierOnboarding => "carrier_onboarding",
            WorkflowKind::InvoiceGeneration => "invoice_generation",
            WorkflowKind::ShipmentTracking => "shipment_tracking",
            WorkflowKind::ComplianceAudit => "compliance_audit",
            WorkflowKind::RateQuote => "rate_quote",
            WorkflowKind::DocumentVerification => "document_verification",
            WorkflowKind::PaymentProcessing => "payment_processing",
        }
    }

    #[must_use]
    pub fn default_config(&self) -> WorkflowConfig {
        match self {
            WorkflowKind::LoadBooking => WorkflowConfig::LoadBooking {
                auto_assign: true,
                max_candidates: 5,
            },
            WorkflowKind::CarrierOnboarding => WorkflowConfig::CarrierOnboarding {
                required_documents: vec![
                    "w9".to_string(),
                    "insurance_certificate".to_string(),
                    "operating_authority".to_string(),
                ],
                verify_authority: true,
            },
            WorkflowKind::InvoiceGeneration => WorkflowConfig::InvoiceGeneration {
                batch_size: 50,
                net_days: 30,
            },
            WorkflowKind::ShipmentTracking => WorkflowConfig::ShipmentTracking {
                poll_interval_secs: 600,
                notify_on_delay: true,
            },
            WorkflowKind::ComplianceAudit => WorkflowConfig::ComplianceAudit {
                audit_scope: vec!["drivers".to_string(), "vehicles".to_string()],
                fail_on_warning: false,
            },
            WorkflowKind::RateQuote => WorkflowConfig::RateQuote {
                quote_ttl_mins: 60,
                margin_pct: 12.5,
            },
            WorkflowKind::DocumentVerification => WorkflowConfig::DocumentVerification {
                require_signature: true,
                max_pages: 40,
            },
            WorkflowKind::PaymentProcessing => WorkflowConfig::PaymentProcessing {
                retry_attempts: 3,
                settlement_window_hours: 48,
            },
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-kind workflow configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowConfig {
    LoadBooking {
        auto_assign: bool,
        max_candidates: u32,
    },
    CarrierOnboarding {
        required_documents: Vec<String>,
        verify_authority: bool,
    },
    InvoiceGeneration {
        batch_size: u32,
        net_days: u32,
    },
    ShipmentTracking {
        poll_interval_secs: u64,
        notify_on_delay: bool,
    },
    ComplianceAudit {
        audit_scope: Vec<String>,
        fail_on_warning: bool,
    },
    RateQuote {
        quote_ttl_mins: u32,
        margin_pct: f64,
    },
    DocumentVerification {
        require_signature: bool,
        max_pages: u32,
    },
    PaymentProcessing {
        retry_attempts: u32,
        settlement_window_hours: u32,
    },
}

impl WorkflowConfig {
    #[must_use]
    pub fn kind(&self) -> WorkflowKind {
        match self {
            WorkflowConfig::LoadBooking { .. } => WorkflowKind::LoadBooking,
            WorkflowConfig::CarrierOnboarding { .. } => WorkflowKind::CarrierOnboarding,
            WorkflowConfig::InvoiceGeneration { .. } => WorkflowKind::InvoiceGeneration,
            WorkflowConfig::ShipmentTracking { .. } => WorkflowKind::ShipmentTracking,
            WorkflowConfig::ComplianceAudit { .. } => WorkflowKind::ComplianceAudit,
            WorkflowConfig::RateQuote { .. } => WorkflowKind::RateQuote,
            WorkflowConfig::DocumentVerification { .. } => WorkflowKind::DocumentVerification,
            WorkflowConfig::PaymentProcessing { .. } => WorkflowKind::PaymentProcessing,
        }
    }
}

/// Static definition of a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSpec {
    pub id: String,
    pub name: String,
    pub config: WorkflowConfig,
}

impl WorkflowSpec {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: WorkflowKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            config: kind.default_config(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }
}

/// Upper bound of the running health score
pub const MAX_SUCCESS_RATE: u8 = 100;

/// Tracked workflow record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    pub kind: WorkflowKind,
    pub is_active: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub status: WorkflowState,
    pub config: WorkflowConfig,
    pub execution_count: u64,
    /// Running health score in `0..=100`; not a true moving average
    pub success_rate: u8,
}

impl Workflow {
    #[must_use]
    pub fn from_spec(spec: WorkflowSpec) -> Self {
        Self {
            kind: spec.config.kind(),
            id: spec.id,
            name: spec.name,
            is_active: false,
            last_run: None,
            status: WorkflowState::Inactive,
            config: spec.config,
            execution_count: 0,
            success_rate: MAX_SUCCESS_RATE,
        }
    }

    /// Apply a signed delta to the health score, clamped to `0..=100`
    pub fn adjust_success_rate(&mut self, delta: i16) {
        let next = i16::from(self.success_rate).saturating_add(delta);
        self.success_rate = next.clamp(0, i16::from(MAX_SUCCESS_RATE)) as u8;
    }
}

/// Result of one workflow execution that did not error out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Succeeded,
    Failed { reason: String },
}

impl ExecutionOutcome {
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Succeeded)
    }
}
