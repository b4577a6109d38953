//! Portal registry backed by `portal_management` and `feature_flags_v2`
//!
//! Every mutation issues its SQL through the `DatabaseManager`; the
//! in-process maps are the source of truth for reads.

use super::catalog::canonical_portals;
use crate::database::DatabaseManager;
use crate::error::PortalError;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tms_kernel::{LogManager, LogScope};
use ulid::Ulid;

const FLAG_SCOPE: &str = "global";

/// `portal_management.status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryStatus {
    Active,
    Degraded,
    Maintenance,
}

/// One `portal_management` row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalRecord {
    pub id: String,
    pub portal_key: String,
    pub portal_name: String,
    pub route: String,
    pub status: RegistryStatus,
    pub last_health_check: Option<DateTime<Utc>>,
    pub features: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalManagerStatus {
    pub total_portals: usize,
    pub enabled_portals: usize,
    pub degraded_portals: usize,
}

pub struct PortalManager {
    db: Arc<DatabaseManager>,
    portals: DashMap<String, PortalRecord>,
    /// route -> owning portal key
    routes: DashMap<String, String>,
    flags: DashMap<String, bool>,
    log: LogScope,
}

impl std::fmt::Debug for PortalManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalManager")
            .field("portals", &self.portals.len())
            .finish_non_exhaustive()
    }
}

/// `portal.<key>.enabled`
#[must_use]
pub fn flag_key(portal_key: &str) -> String {
    format!("portal.{portal_key}.enabled")
}

impl PortalManager {
    #[must_use]
    pub fn new(db: Arc<DatabaseManager>, log: &Arc<LogManager>) -> Self {
        Self {
            db,
            portals: DashMap::new(),
            routes: DashMap::new(),
            flags: DashMap::new(),
            log: log.scope("portal-manager"),
        }
    }

    /// Register the canonical portals
    ///
    /// # Errors
    /// Fails on the first registration the database rejects.
    pub async fn initialize(&self) -> Result<(), PortalError> {
        for portal in canonical_portals() {
            self.register_portal(portal.key, portal.name, portal.route, Vec::new())
                .await?;
        }
        self.log.success(format!(
            "Portal manager initialized with {} portals",
            self.portals.len()
        ));
        Ok(())
    }

    /// Insert or refresh a portal row and default its flag to enabled
    ///
    /// # Errors
    /// - `PortalError::PathInUse` if another portal owns `route`
    /// - `PortalError::Storage` if a statement fails
    pub async fn register_portal(
        &self,
        key: &str,
        name: &str,
        route: &str,
        features: Vec<String>,
    ) -> Result<PortalRecord, PortalError> {
        let claimed = match self.routes.entry(route.to_string()) {
            Entry::Occupied(owner) if owner.get() != key => {
                return Err(PortalError::PathInUse(route.to_string()));
            }
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(key.to_string());
                true
            }
        };

        match self.persist_registration(key, name, route, features).await {
            Ok(record) => Ok(record),
            Err(e) => {
                if claimed {
                    self.routes.remove_if(route, |_, owner| owner == key);
                }
                Err(e)
            }
        }
    }

    async fn persist_registration(
        &self,
        key: &str,
        name: &str,
        route: &str,
        features: Vec<String>,
    ) -> Result<PortalRecord, PortalError> {
        let now = Utc::now();
        let record = match self.portals.get(key).map(|p| p.clone()) {
            Some(existing) => PortalRecord {
                portal_name: name.to_string(),
                route: route.to_string(),
                features,
                updated_at: now,
                ..existing
            },
            None => PortalRecord {
                id: Ulid::new().to_string(),
                portal_key: key.to_string(),
                portal_name: name.to_string(),
                route: route.to_string(),
                status: RegistryStatus::Active,
                last_health_check: None,
                features,
                created_at: now,
                updated_at: now,
            },
        };

        self.db
            .execute_query(
                "INSERT INTO portal_management \
                 (id, portal_key, portal_name, status, last_health_check, features, \
                 created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                 ON CONFLICT (portal_key) DO UPDATE SET portal_name = EXCLUDED.portal_name, \
                 features = EXCLUDED.features, updated_at = EXCLUDED.updated_at",
                &[
                    json!(record.id),
                    json!(record.portal_key),
                    json!(record.portal_name),
                    json!(record.status),
                    json!(record.last_health_check),
                    json!(record.features),
                    json!(record.created_at),
                    json!(record.updated_at),
                ],
            )
            .await?;
        self.db
            .execute_query(
                "INSERT INTO feature_flags_v2 (key, scope, value) VALUES ($1, $2, $3) \
                 ON CONFLICT (key, scope) DO NOTHING",
                &[json!(flag_key(key)), json!(FLAG_SCOPE), json!(true)],
            )
            .await?;

        self.flags.entry(key.to_string()).or_insert(true);
        let previous = self.portals.insert(key.to_string(), record.clone());
        if let Some(old_route) = previous.map(|p| p.route).filter(|r| r != route) {
            self.routes.remove_if(&old_route, |_, owner| owner == key);
        }
        self.log.debug(format!("Registered portal {key} at {route}"));
        Ok(record)
    }

    /// Flip the `portal.<key>.enabled` flag
    ///
    /// # Errors
    /// `PortalError::NotFound` for an unregistered key, `Storage` on failure.
    pub async fn set_portal_enabled(&self, key: &str, enabled: bool) -> Result<(), PortalError> {
        if !self.portals.contains_key(key) {
            return Err(PortalError::NotFound(key.to_string()));
        }
        self.db
            .execute_query(
                "INSERT INTO feature_flags_v2 (key, scope, value) VALUES ($1, $2, $3) \
                 ON CONFLICT (key, scope) DO UPDATE SET value = EXCLUDED.value",
                &[json!(flag_key(key)), json!(FLAG_SCOPE), json!(enabled)],
            )
            .await?;
        self.flags.insert(key.to_string(), enabled);
        self.log.info(format!(
            "Portal {key} {}",
            if enabled { "enabled" } else { "disabled" }
        ));
        Ok(())
    }

    /// Unknown portals are reported as disabled
    #[must_use]
    pub fn is_portal_enabled(&self, key: &str) -> bool {
        self.flags.get(key).is_some_and(|v| *v)
    }

    /// Ping the backing store and record the result on the portal row
    ///
    /// # Errors
    /// `PortalError::NotFound` for an unregistered key, `Storage` if the
    /// row update fails.
    pub async fn check_portal_health(&self, key: &str) -> Result<PortalRecord, PortalError> {
        if !self.portals.contains_key(key) {
            return Err(PortalError::NotFound(key.to_string()));
        }
        let reachable = self.db.health_check().await;
        let status = if reachable {
            RegistryStatus::Active
        } else {
            RegistryStatus::Degraded
        };
        let now = Utc::now();

        if reachable {
            self.db
                .execute_query(
                    "UPDATE portal_management \
                     SET status = $1, last_health_check = $2, updated_at = $2 \
                     WHERE portal_key = $3",
                    &[json!(status), json!(now), json!(key)],
                )
                .await?;
        }

        let mut entry = self
            .portals
            .get_mut(key)
            .ok_or_else(|| PortalError::NotFound(key.to_string()))?;
        entry.status = status;
        entry.last_health_check = Some(now);
        entry.updated_at = now;
        let record = entry.clone();
        drop(entry);

        if status == RegistryStatus::Degraded {
            self.log.warning(format!("Portal {key} is degraded"));
        }
        Ok(record)
    }

    /// Run `check_portal_health` over every registered portal
    ///
    /// Returns the number of portals found degraded.
    pub async fn check_all_portals(&self) -> usize {
        let mut degraded = 0;
        for key in self.keys() {
            match self.check_portal_health(&key).await {
                Ok(record) if record.status == RegistryStatus::Degraded => degraded += 1,
                Ok(_) => {}
                Err(e) => {
                    degraded += 1;
                    self.log.error(format!("Health check for portal {key} failed: {e}"));
                }
            }
        }
        degraded
    }

    #[must_use]
    pub fn portal(&self, key: &str) -> Option<PortalRecord> {
        self.portals.get(key).map(|p| p.clone())
    }

    /// All rows sorted by key
    #[must_use]
    pub fn portals(&self) -> Vec<PortalRecord> {
        let mut all: Vec<PortalRecord> = self.portals.iter().map(|p| p.clone()).collect();
        all.sort_by(|a, b| a.portal_key.cmp(&b.portal_key));
        all
    }

    #[must_use]
    pub fn status(&self) -> PortalManagerStatus {
        PortalManagerStatus {
            total_portals: self.portals.len(),
            enabled_portals: self.flags.iter().filter(|f| *f.value()).count(),
            degraded_portals: self
                .portals
                .iter()
                .filter(|p| p.status == RegistryStatus::Degraded)
                .count(),
        }
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.portals.iter().map(|p| p.key().clone()).collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseConfig;

    async fn connected() -> (Arc<DatabaseManager>, PortalManager) {
        let log = LogManager::shared(1000);
        let db = Arc::new(DatabaseManager::new(DatabaseConfig::default(), &log));
        db.connect().await.unwrap();
        let manager = PortalManager::new(Arc::clone(&db), &log);
        (db, manager)
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_registers_canonical_portals() {
        let (db, manager) = connected().await;
        manager.initialize().await.unwrap();

        let status = manager.status();
        assert_eq!(status.total_portals, 20);
        assert_eq!(status.enabled_portals, 20);
        assert!(manager.is_portal_enabled("edi"));
        assert!(db
            .executed_queries()
            .iter()
            .any(|q| q.sql.starts_with("INSERT INTO feature_flags_v2")
                && q.params[0] == json!("portal.edi.enabled")
                && q.params[1] == json!("global")));
    }

    #[tokio::test(start_paused = true)]
    async fn flags_toggle_and_unknown_is_not_found() {
        let (_db, manager) = connected().await;
        manager.initialize().await.unwrap();

        manager.set_portal_enabled("crm", false).await.unwrap();
        assert!(!manager.is_portal_enabled("crm"));
        assert_eq!(manager.status().enabled_portals, 19);

        assert!(matches!(
            manager.set_portal_enabled("nope", true).await,
            Err(PortalError::NotFound(_))
        ));
        assert!(!manager.is_portal_enabled("nope"));
    }

    #[tokio::test(start_paused = true)]
    async fn route_clash_is_rejected() {
        let (_db, manager) = connected().await;
        manager
            .register_portal("carrier", "Carrier Portal", "/carrier", Vec::new())
            .await
            .unwrap();
        assert!(matches!(
            manager.register_portal("carrier_v2", "Carrier", "/carrier", Vec::new()).await,
            Err(PortalError::PathInUse(_))
        ));
        // Re-registering the same key keeps its id
        let first = manager.portal("carrier").unwrap();
        let again = manager
            .register_portal("carrier", "Carrier Hub", "/carrier", vec!["load-board".into()])
            .await
            .unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.portal_name, "Carrier Hub");
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_registrations_claim_a_route_once() {
        let (_db, manager) = connected().await;
        let (a, b) = tokio::join!(
            manager.register_portal("fleet", "Fleet", "/fleet", Vec::new()),
            manager.register_portal("fleet_ops", "Fleet Ops", "/fleet", Vec::new()),
        );

        assert!(a.is_ok());
        assert!(matches!(b, Err(PortalError::PathInUse(ref r)) if r == "/fleet"));
        assert_eq!(manager.status().total_portals, 1);
        assert!(manager.portal("fleet_ops").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn moved_route_is_released() {
        let (_db, manager) = connected().await;
        manager
            .register_portal("quotes", "Quotes", "/quotes", Vec::new())
            .await
            .unwrap();
        manager
            .register_portal("quotes", "Quotes", "/rfq", Vec::new())
            .await
            .unwrap();

        let reused = manager
            .register_portal("spot", "Spot Quotes", "/quotes", Vec::new())
            .await
            .unwrap();
        assert_eq!(reused.route, "/quotes");
        assert!(matches!(
            manager.register_portal("rfq", "RFQ", "/rfq", Vec::new()).await,
            Err(PortalError::PathInUse(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_registration_frees_its_route() {
        let (db, manager) = connected().await;
        db.disconnect();
        assert!(matches!(
            manager.register_portal("claims", "Claims", "/claims", Vec::new()).await,
            Err(PortalError::Storage(_))
        ));

        db.connect().await.unwrap();
        manager
            .register_portal("claims_v2", "Claims", "/claims", Vec::new())
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn health_check_degrades_without_database() {
        let (db, manager) = connected().await;
        manager
            .register_portal("rates", "Rates Portal", "/rates", Vec::new())
            .await
            .unwrap();

        let healthy = manager.check_portal_health("rates").await.unwrap();
        assert_eq!(healthy.status, RegistryStatus::Active);
        assert!(healthy.last_health_check.is_some());

        db.disconnect();
        assert_eq!(manager.check_all_portals().await, 1);
        assert_eq!(manager.portal("rates").unwrap().status, RegistryStatus::Degraded);
        assert_eq!(manager.status().degraded_portals, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn storage_errors_surface() {
        let log = LogManager::shared(100);
        let db = Arc::new(DatabaseManager::new(DatabaseConfig::default(), &log));
        let manager = PortalManager::new(db, &log);
        assert!(matches!(
            manager.initialize().await,
            Err(PortalError::Storage(_))
        ));
        assert!(manager.portals().is_empty());
    }
}
