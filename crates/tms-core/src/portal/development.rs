//! Template-driven portal creation
//!
//! Each creation cycle compares the portals that exist against two kinds
//! of demand and fills the gaps from the template table:
//! - essential portal types (carrier, broker, shipper, admin, marketplace)
//! - user roles that no portal serves yet
//!
//! New portals start as `draft` and are deployed to `published` after a
//! simulated deploy delay when production access is on.

use super::catalog::{default_templates, permissions_for_role};
use super::{
    PortalFeature, PortalInstance, PortalMetadata, PortalSettings, PortalTemplate, PortalType,
    PublishStatus, UserRole,
};
use crate::error::PortalError;
use chrono::Utc;
use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tms_kernel::{LogManager, LogScope, PeriodicTask, TaskHandle};
use ulid::Ulid;

/// Roles with active users that should each reach some portal
const DEMAND_ROLES: [UserRole; 9] = [
    UserRole::Carrier,
    UserRole::Broker,
    UserRole::Shipper,
    UserRole::Driver,
    UserRole::OwnerOperator,
    UserRole::Admin,
    UserRole::Analyst,
    UserRole::Billing,
    UserRole::Support,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortalAgentConfig {
    /// `None` disables the background creation cycle
    pub creation_interval: Option<Duration>,
    pub deploy_delay: Duration,
    pub production_access: bool,
}

impl PortalAgentConfig {
    #[must_use]
    pub fn from_settings(settings: &tms_kernel::PortalSettings) -> Self {
        Self {
            creation_interval: (settings.creation_interval_ms > 0)
                .then(|| Duration::from_millis(settings.creation_interval_ms)),
            deploy_delay: Duration::from_millis(settings.deploy_delay_ms),
            production_access: settings.production_access,
        }
    }
}

impl Default for PortalAgentConfig {
    fn default() -> Self {
        Self::from_settings(&tms_kernel::PortalSettings::default())
    }
}

/// A missing portal found by gap analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PortalGap {
    MissingEssential { portal_type: PortalType, template: String },
    MissingRoleAccess { role: UserRole, template: String },
}

impl PortalGap {
    #[must_use]
    pub fn template(&self) -> &str {
        match self {
            PortalGap::MissingEssential { template, .. }
            | PortalGap::MissingRoleAccess { template, .. } => template,
        }
    }
}

/// Fields for `create_custom_portal`; unset fields take defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalDraft {
    pub name: Option<String>,
    pub portal_type: Option<PortalType>,
    pub roles: Option<Vec<UserRole>>,
    pub path: Option<String>,
    pub component: Option<String>,
    pub features: Option<Vec<PortalFeature>>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub keywords: Option<Vec<String>>,
}

/// Partial update for `update_portal`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalUpdate {
    pub name: Option<String>,
    pub path: Option<String>,
    pub component: Option<String>,
    pub roles: Option<Vec<UserRole>>,
    pub features: Option<Vec<PortalFeature>>,
    pub status: Option<PublishStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalAgentStatus {
    pub is_running: bool,
    pub total_portals: usize,
    pub published_portals: usize,
    pub draft_portals: usize,
    pub production_access: bool,
    pub portal_types: Vec<PortalType>,
    pub supported_roles: Vec<UserRole>,
}

pub struct PortalDevelopmentAgent {
    config: PortalAgentConfig,
    templates: IndexMap<String, PortalTemplate>,
    portals: DashMap<String, PortalInstance>,
    production_access: AtomicBool,
    running: AtomicBool,
    cycle: Mutex<Option<TaskHandle>>,
    log: LogScope,
}

impl std::fmt::Debug for PortalDevelopmentAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalDevelopmentAgent")
            .field("config", &self.config)
            .field("portals", &self.portals.len())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

fn role_permissions(roles: &[UserRole]) -> BTreeMap<String, bool> {
    roles
        .iter()
        .flat_map(|r| permissions_for_role(*r).iter())
        .map(|p| ((*p).to_string(), true))
        .collect()
}

fn new_portal_id() -> String {
    format!("portal-{}", Ulid::new())
}

impl PortalDevelopmentAgent {
    #[must_use]
    pub fn new(log: &Arc<LogManager>, config: PortalAgentConfig) -> Self {
        let templates = default_templates()
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();
        Self {
            production_access: AtomicBool::new(config.production_access),
            config,
            templates,
            portals: DashMap::new(),
            running: AtomicBool::new(false),
            cycle: Mutex::new(None),
            log: log.scope("portal-agent"),
        }
    }

    /// Start the creation cycle; a second call is a no-op
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            self.log.warning("Portal development agent is already running");
            return;
        }
        self.log.info("Starting portal development agent...");
        if let Some(period) = self.config.creation_interval {
            let handle = self.spawn_creation_cycle(period);
            if let Some(previous) = self.cycle.lock().replace(handle) {
                previous.abort();
            }
        }
        self.log.success("Portal development agent started");
    }

    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.log.info("Stopping portal development agent...");
        let cycle = self.cycle.lock().take();
        if let Some(handle) = cycle {
            if let Err(e) = handle.cancel().await {
                self.log.warning(format!("Creation cycle ended abnormally: {e}"));
            }
        }
        self.log.success("Portal development agent stopped");
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn templates(&self) -> Vec<PortalTemplate> {
        self.templates.values().cloned().collect()
    }

    #[must_use]
    pub fn template(&self, id: &str) -> Option<PortalTemplate> {
        self.templates.get(id).cloned()
    }

    /// Essential types first, then roles left without any portal
    ///
    /// Roles that a missing essential portal will already serve are not
    /// reported a second time.
    #[must_use]
    pub fn analyze_gaps(&self) -> Vec<PortalGap> {
        let existing_types: BTreeSet<PortalType> =
            self.portals.iter().map(|p| p.portal_type).collect();
        let mut covered: BTreeSet<UserRole> = self
            .portals
            .iter()
            .flat_map(|p| p.roles.clone())
            .collect();

        let mut gaps = Vec::new();
        for portal_type in PortalType::ESSENTIAL {
            if existing_types.contains(&portal_type) {
                continue;
            }
            let template = portal_type.template_id();
            if let Some(t) = self.templates.get(&template) {
                covered.extend(t.roles.iter().copied());
            }
            gaps.push(PortalGap::MissingEssential { portal_type, template });
        }

        for role in DEMAND_ROLES {
            if !covered.contains(&role) {
                gaps.push(PortalGap::MissingRoleAccess {
                    role,
                    template: role.portal_type().template_id(),
                });
            }
        }
        gaps
    }

    /// Build a draft portal for `gap` and deploy it when allowed
    ///
    /// # Errors
    /// `PortalError::TemplateNotFound` if the gap names an unknown template.
    pub async fn create_portal_from_gap(
        &self,
        gap: &PortalGap,
    ) -> Result<PortalInstance, PortalError> {
        let template = self
            .templates
            .get(gap.template())
            .ok_or_else(|| PortalError::TemplateNotFound(gap.template().to_string()))?;

        let (name, portal_type, roles, path, subject) = match gap {
            PortalGap::MissingEssential { portal_type, .. } => (
                portal_type.display_name().to_string(),
                *portal_type,
                template.roles.clone(),
                template.path.clone(),
                portal_type.slug(),
            ),
            PortalGap::MissingRoleAccess { role, .. } => (
                role.portal_name(),
                role.portal_type(),
                vec![*role],
                format!("/{}", role.slug()),
                role.slug(),
            ),
        };

        let now = Utc::now();
        let portal = PortalInstance {
            id: new_portal_id(),
            name: name.clone(),
            portal_type,
            settings: PortalSettings {
                theme: "default".to_string(),
                layout: "standard".to_string(),
                permissions: role_permissions(&roles),
            },
            roles,
            path,
            component: template.component.clone(),
            features: template.features.clone(),
            status: PublishStatus::Draft,
            created_at: now,
            updated_at: now,
            metadata: PortalMetadata {
                title: name,
                description: format!("Auto-generated portal for {subject}"),
                last_modified: now,
                ..template.metadata.clone()
            },
        };

        self.insert_and_deploy(portal).await
    }

    /// One pass: analyse gaps, create a portal per gap, refresh the rest
    ///
    /// Returns the number of portals created.
    pub async fn run_creation_cycle(&self) -> usize {
        self.log.info("Starting portal creation cycle...");
        let gaps = self.analyze_gaps();
        let mut created = 0;
        for gap in &gaps {
            match self.create_portal_from_gap(gap).await {
                Ok(portal) => {
                    created += 1;
                    self.log
                        .success(format!("Created portal: {} ({})", portal.name, portal.path));
                }
                Err(e) => self.log.error(format!("Failed to create portal from gap: {e}")),
            }
        }

        let mut refreshed = 0;
        for mut portal in self.portals.iter_mut() {
            portal.touch();
            refreshed += 1;
        }
        self.log.success(format!(
            "Portal creation cycle completed: {created} created, {refreshed} refreshed"
        ));
        created
    }

    /// Create a portal from caller-supplied fields
    ///
    /// # Errors
    /// `PortalError::PathInUse` if another portal already serves the path.
    pub async fn create_custom_portal(
        &self,
        draft: PortalDraft,
    ) -> Result<PortalInstance, PortalError> {
        let path = draft.path.unwrap_or_else(|| "/custom".to_string());
        if self.portal_by_path(&path).is_some() {
            return Err(PortalError::PathInUse(path));
        }
        let roles = draft.roles.unwrap_or_else(|| vec![UserRole::Admin]);
        let now = Utc::now();
        let portal = PortalInstance {
            id: new_portal_id(),
            name: draft.name.unwrap_or_else(|| "Custom Portal".to_string()),
            portal_type: draft.portal_type.unwrap_or(PortalType::Admin),
            settings: PortalSettings {
                theme: "default".to_string(),
                layout: "standard".to_string(),
                permissions: role_permissions(&roles),
            },
            roles,
            path,
            component: draft.component.unwrap_or_else(|| "CustomPortal".to_string()),
            features: draft.features.unwrap_or_default(),
            status: PublishStatus::Draft,
            created_at: now,
            updated_at: now,
            metadata: PortalMetadata {
                title: draft.title.unwrap_or_else(|| "Custom Portal".to_string()),
                description: draft
                    .description
                    .unwrap_or_else(|| "Auto-generated custom portal".to_string()),
                keywords: draft.keywords.unwrap_or_else(|| vec!["custom".to_string()]),
                author: "Autonomous Agent".to_string(),
                last_modified: now,
            },
        };

        let portal = self.insert_and_deploy(portal).await?;
        self.log.success(format!("Created custom portal: {}", portal.name));
        Ok(portal)
    }

    /// Apply `update` and redeploy when production access is on
    ///
    /// # Errors
    /// - `PortalError::NotFound` for an unknown id
    /// - `PortalError::PathInUse` if another portal already serves the new path
    pub async fn update_portal(
        &self,
        id: &str,
        update: PortalUpdate,
    ) -> Result<PortalInstance, PortalError> {
        if !self.portals.contains_key(id) {
            return Err(PortalError::NotFound(id.to_string()));
        }
        if let Some(path) = update.path.as_deref() {
            // Scan before taking the entry guard; DashMap shards are not reentrant
            if self.portals.iter().any(|p| p.key() != id && p.path == path) {
                return Err(PortalError::PathInUse(path.to_string()));
            }
        }

        {
            let mut portal = self
                .portals
                .get_mut(id)
                .ok_or_else(|| PortalError::NotFound(id.to_string()))?;
            if let Some(name) = update.name {
                portal.name = name;
            }
            if let Some(path) = update.path {
                portal.path = path;
            }
            if let Some(component) = update.component {
                portal.component = component;
            }
            if let Some(roles) = update.roles {
                portal.settings.permissions = role_permissions(&roles);
                portal.roles = roles;
            }
            if let Some(features) = update.features {
                portal.features = features;
            }
            if let Some(status) = update.status {
                portal.status = status;
            }
            portal.touch();
        }

        if self.has_production_access() {
            self.deploy_portal(id).await?;
        }
        let portal = self.require(id)?;
        self.log.success(format!("Updated portal: {}", portal.name));
        Ok(portal)
    }

    /// # Errors
    /// `PortalError::NotFound` for an unknown id.
    pub fn delete_portal(&self, id: &str) -> Result<PortalInstance, PortalError> {
        let (_, portal) = self
            .portals
            .remove(id)
            .ok_or_else(|| PortalError::NotFound(id.to_string()))?;
        self.log.success(format!("Deleted portal: {}", portal.name));
        Ok(portal)
    }

    /// Simulated deploy: wait, then mark the portal published
    ///
    /// # Errors
    /// `PortalError::NotFound` if the portal is gone when the deploy lands.
    pub async fn deploy_portal(&self, id: &str) -> Result<(), PortalError> {
        let name = self.require(id)?.name;
        self.log.info(format!("Deploying portal to production: {name}"));
        tokio::time::sleep(self.config.deploy_delay).await;

        let mut portal = self
            .portals
            .get_mut(id)
            .ok_or_else(|| PortalError::NotFound(id.to_string()))?;
        portal.status = PublishStatus::Published;
        portal.touch();
        drop(portal);

        metrics::counter!("tms_portals_deployed_total").increment(1);
        self.log.success(format!("Portal deployed successfully: {name}"));
        Ok(())
    }

    pub fn set_production_access(&self, enabled: bool) {
        self.production_access.store(enabled, Ordering::SeqCst);
        self.log.info(format!(
            "Production access {}",
            if enabled { "enabled" } else { "disabled" }
        ));
    }

    #[must_use]
    pub fn has_production_access(&self) -> bool {
        self.production_access.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn portal(&self, id: &str) -> Option<PortalInstance> {
        self.portals.get(id).map(|p| p.clone())
    }

    #[must_use]
    pub fn portal_by_path(&self, path: &str) -> Option<PortalInstance> {
        self.portals
            .iter()
            .find(|p| p.path == path)
            .map(|p| p.clone())
    }

    #[must_use]
    pub fn portals_by_type(&self, portal_type: PortalType) -> Vec<PortalInstance> {
        self.collect(|p| p.portal_type == portal_type)
    }

    #[must_use]
    pub fn portals_by_role(&self, role: UserRole) -> Vec<PortalInstance> {
        self.collect(|p| p.roles.contains(&role))
    }

    /// Every portal in creation order
    #[must_use]
    pub fn portals(&self) -> Vec<PortalInstance> {
        self.collect(|_| true)
    }

    #[must_use]
    pub fn status(&self) -> PortalAgentStatus {
        let portals = self.portals();
        let portal_types: BTreeSet<PortalType> = portals.iter().map(|p| p.portal_type).collect();
        PortalAgentStatus {
            is_running: self.is_running(),
            total_portals: portals.len(),
            published_portals: portals
                .iter()
                .filter(|p| p.status == PublishStatus::Published)
                .count(),
            draft_portals: portals
                .iter()
                .filter(|p| p.status == PublishStatus::Draft)
                .count(),
            production_access: self.has_production_access(),
            portal_types: portal_types.into_iter().collect(),
            supported_roles: UserRole::ALL.to_vec(),
        }
    }

    async fn insert_and_deploy(
        &self,
        portal: PortalInstance,
    ) -> Result<PortalInstance, PortalError> {
        let id = portal.id.clone();
        self.portals.insert(id.clone(), portal);
        if self.has_production_access() {
            self.deploy_portal(&id).await?;
        }
        self.require(&id)
    }

    fn require(&self, id: &str) -> Result<PortalInstance, PortalError> {
        self.portal(id)
            .ok_or_else(|| PortalError::NotFound(id.to_string()))
    }

    fn collect(&self, keep: impl Fn(&PortalInstance) -> bool) -> Vec<PortalInstance> {
        let mut found: Vec<PortalInstance> = self
            .portals
            .iter()
            .filter(|p| keep(p.value()))
            .map(|p| p.clone())
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        found
    }

    fn spawn_creation_cycle(self: &Arc<Self>, period: Duration) -> TaskHandle {
        let weak: Weak<Self> = Arc::downgrade(self);
        PeriodicTask::new("portal-creation", period).spawn(move || {
            let weak = weak.clone();
            async move {
                let Some(agent) = weak.upgrade() else {
                    return ControlFlow::Break(());
                };
                agent.run_creation_cycle().await;
                ControlFlow::Continue(())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn agent(production_access: bool) -> PortalDevelopmentAgent {
        PortalDevelopmentAgent::new(
            &LogManager::shared(1000),
            PortalAgentConfig {
                creation_interval: None,
                deploy_delay: Duration::from_secs(3),
                production_access,
            },
        )
    }

    #[test]
    fn empty_registry_gaps() {
        let gaps = agent(true).analyze_gaps();
        let essential = gaps
            .iter()
            .filter(|g| matches!(g, PortalGap::MissingEssential { .. }))
            .count();
        assert_eq!(essential, 5);

        let roles: Vec<UserRole> = gaps
            .iter()
            .filter_map(|g| match g {
                PortalGap::MissingRoleAccess { role, .. } => Some(*role),
                PortalGap::MissingEssential { .. } => None,
            })
            .collect();
        assert_eq!(
            roles,
            vec![UserRole::OwnerOperator, UserRole::Analyst, UserRole::Billing, UserRole::Support]
        );
        assert!(gaps.iter().any(|g| g.template() == "analytics-portal"));
    }

    #[tokio::test(start_paused = true)]
    async fn creation_cycle_fills_gaps_once() {
        let agent = agent(true);
        assert_eq!(agent.run_creation_cycle().await, 9);

        let status = agent.status();
        assert_eq!(status.total_portals, 9);
        assert_eq!(status.published_portals, 9);
        assert_eq!(status.draft_portals, 0);
        assert!(agent.analyze_gaps().is_empty());
        assert_eq!(agent.run_creation_cycle().await, 0);

        let analyst = agent.portal_by_path("/analyst").unwrap();
        assert_eq!(analyst.name, "Analyst Portal");
        assert_eq!(analyst.portal_type, PortalType::Analytics);
        assert_eq!(analyst.component, "AnalyticsPortal");
        assert_eq!(analyst.settings.permissions.get("generate_reports"), Some(&true));
        assert_eq!(agent.portals_by_role(UserRole::Driver).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn without_production_access_portals_stay_draft() {
        let agent = agent(false);
        let started = tokio::time::Instant::now();
        agent.run_creation_cycle().await;
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(agent.status().draft_portals, 9);

        agent.set_production_access(true);
        let carrier = agent.portals_by_type(PortalType::Carrier).remove(0);
        let updated = agent
            .update_portal(
                &carrier.id,
                PortalUpdate {
                    name: Some("Fleet Hub".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Fleet Hub");
        assert_eq!(updated.status, PublishStatus::Published);
    }

    #[tokio::test(start_paused = true)]
    async fn custom_portal_defaults() {
        let agent = agent(true);
        let portal = agent.create_custom_portal(PortalDraft::default()).await.unwrap();
        assert_eq!(portal.name, "Custom Portal");
        assert_eq!(portal.portal_type, PortalType::Admin);
        assert_eq!(portal.roles, vec![UserRole::Admin]);
        assert_eq!(portal.path, "/custom");
        assert_eq!(portal.component, "CustomPortal");
        assert_eq!(portal.status, PublishStatus::Published);
        assert!(portal.id.starts_with("portal-"));

        assert!(matches!(
            agent.create_custom_portal(PortalDraft::default()).await,
            Err(PortalError::PathInUse(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn update_rejects_a_taken_path() {
        let agent = agent(false);
        agent.run_creation_cycle().await;
        let carrier = agent.portal_by_path("/carrier").unwrap();

        let err = agent
            .update_portal(
                &carrier.id,
                PortalUpdate {
                    path: Some("/broker".into()),
                    name: Some("Renamed".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::PathInUse(ref p) if p == "/broker"));
        let unchanged = agent.portal(&carrier.id).unwrap();
        assert_eq!(unchanged.path, "/carrier");
        assert_eq!(unchanged.name, carrier.name);

        // Keeping its own path is not a clash
        let kept = agent
            .update_portal(
                &carrier.id,
                PortalUpdate {
                    path: Some("/carrier".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(kept.path, "/carrier");
        assert_eq!(agent.portal_by_path("/broker").unwrap().portal_type, PortalType::Broker);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_ids_are_not_found() {
        let agent = agent(false);
        let err = agent.update_portal("portal-x", PortalUpdate::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "Portal not found: portal-x");
        assert!(matches!(agent.delete_portal("portal-x"), Err(PortalError::NotFound(_))));

        let portal = agent.create_custom_portal(PortalDraft::default()).await.unwrap();
        agent.delete_portal(&portal.id).unwrap();
        assert!(agent.portal(&portal.id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn start_is_idempotent_and_cycle_runs() {
        let agent = Arc::new(PortalDevelopmentAgent::new(
            &LogManager::shared(1000),
            PortalAgentConfig {
                creation_interval: Some(Duration::from_secs(60)),
                deploy_delay: Duration::from_secs(3),
                production_access: true,
            },
        ));
        agent.start();
        agent.start();
        assert!(agent.is_running());

        tokio::time::sleep(Duration::from_secs(60 + 9 * 3 + 1)).await;
        assert_eq!(agent.status().published_portals, 9);

        agent.stop().await;
        assert!(!agent.is_running());
    }
}
