//! Functional tests for portal generation and the marketing site.
//!
//! Portals come from static templates. The registry persists one row per
//! canonical portal, and the site is built from a fixed page list.

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tms_core::portal::{PortalDraft, PortalGap, PortalManager, PortalUpdate, RegistryStatus};
use tms_core::website::{BuildTimings, WebsiteAgentConfig};
use tms_core::{
    DatabaseConfig, DatabaseManager, PortalAgentConfig, PortalDevelopmentAgent, PortalError,
    PortalType, PublishStatus, UserRole, WebsiteBuilder, WebsiteDevelopmentAgent,
};
use tms_test_utils::{fast_config, quiet_log};

fn connected_database(log: &Arc<tms_kernel::LogManager>) -> Arc<DatabaseManager> {
    let config = fast_config();
    Arc::new(DatabaseManager::new(
        DatabaseConfig::from_settings(&config.database, config.environment),
        log,
    ))
}

fn manual_agent_config() -> PortalAgentConfig {
    PortalAgentConfig {
        creation_interval: None,
        deploy_delay: Duration::from_secs(2),
        production_access: true,
    }
}

/// Tenet: the registry persists every canonical portal with its flag on.
#[tokio::test(start_paused = true)]
async fn registry_seeds_canonical_portals() {
    let log = quiet_log();
    let db = connected_database(&log);
    db.connect().await.unwrap();
    let registry = PortalManager::new(Arc::clone(&db), &log);
    registry.initialize().await.unwrap();

    let status = registry.status();
    assert_eq!(status.total_portals, 20);
    assert_eq!(status.enabled_portals, 20);
    assert_eq!(status.degraded_portals, 0);
    assert!(registry.is_portal_enabled("broker"));
    assert!(db
        .executed_queries()
        .iter()
        .any(|q| q.sql.contains("portal_management")));

    // Re-registering keeps the row id
    let id = registry.portal("broker").unwrap().id;
    let again = registry
        .register_portal("broker", "Broker Portal", "/broker", vec!["loads".to_string()])
        .await
        .unwrap();
    assert_eq!(again.id, id);
    assert_eq!(registry.status().total_portals, 20);

    let clash = registry
        .register_portal("brokers", "Brokers", "/broker", Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(clash, PortalError::PathInUse(_)));

    registry.set_portal_enabled("broker", false).await.unwrap();
    assert!(!registry.is_portal_enabled("broker"));
    assert_eq!(registry.status().enabled_portals, 19);
    assert!(matches!(
        registry.set_portal_enabled("nope", true).await,
        Err(PortalError::NotFound(_))
    ));
}

/// Tenet: an unreachable store degrades portals instead of failing the sweep.
#[tokio::test(start_paused = true)]
async fn health_sweep_marks_degraded_portals() {
    let log = quiet_log();
    let db = connected_database(&log);
    db.connect().await.unwrap();
    let registry = PortalManager::new(Arc::clone(&db), &log);
    registry.initialize().await.unwrap();

    assert_eq!(registry.check_all_portals().await, 0);
    assert!(registry
        .portals()
        .iter()
        .all(|p| p.status == RegistryStatus::Active && p.last_health_check.is_some()));

    db.disconnect();
    assert_eq!(registry.check_all_portals().await, 20);
    assert_eq!(registry.status().degraded_portals, 20);

    db.connect().await.unwrap();
    let record = registry.check_portal_health("shipper").await.unwrap();
    assert_eq!(record.status, RegistryStatus::Active);
    assert_eq!(registry.status().degraded_portals, 19);
}

/// Tenet: gap analysis fills every missing portal once, then finds nothing.
#[tokio::test(start_paused = true)]
async fn creation_cycle_converges() {
    let log = quiet_log();
    let agent = PortalDevelopmentAgent::new(&log, manual_agent_config());

    let gaps = agent.analyze_gaps();
    assert!(gaps
        .iter()
        .any(|g| matches!(g, PortalGap::MissingEssential { portal_type: PortalType::Admin, .. })));

    let created = agent.run_creation_cycle().await;
    assert_eq!(created, 9);
    assert!(agent.analyze_gaps().is_empty());
    assert_eq!(agent.run_creation_cycle().await, 0);

    let status = agent.status();
    assert_eq!(status.total_portals, 9);
    assert_eq!(status.published_portals, 9);
    assert_eq!(status.draft_portals, 0);
    for role in [
        UserRole::Carrier,
        UserRole::Broker,
        UserRole::Shipper,
        UserRole::Driver,
        UserRole::OwnerOperator,
        UserRole::Admin,
        UserRole::Analyst,
        UserRole::Billing,
        UserRole::Support,
    ] {
        assert!(
            !agent.portals_by_role(role).is_empty(),
            "no portal serves {role:?}"
        );
    }
}

/// Tenet: custom portals get defaults, reject taken paths on create and on
/// update, and redeploy on update when production access is on.
#[tokio::test(start_paused = true)]
async fn custom_portal_lifecycle() {
    let log = quiet_log();
    let agent = PortalDevelopmentAgent::new(&log, manual_agent_config());

    let portal = agent
        .create_custom_portal(PortalDraft::default())
        .await
        .unwrap();
    assert_eq!(portal.name, "Custom Portal");
    assert_eq!(portal.path, "/custom");
    assert_eq!(portal.portal_type, PortalType::Admin);
    assert!(portal.id.starts_with("portal-"));
    assert_eq!(agent.portal(&portal.id).unwrap().status, PublishStatus::Published);

    let taken = agent
        .create_custom_portal(PortalDraft {
            path: Some("/custom".to_string()),
            ..PortalDraft::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(taken, PortalError::PathInUse(_)));

    let updated = agent
        .update_portal(
            &portal.id,
            PortalUpdate {
                name: Some("Ops Console".to_string()),
                ..PortalUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "Ops Console");
    assert_eq!(agent.portal_by_path("/custom").unwrap().name, "Ops Console");

    let billing = agent
        .create_custom_portal(PortalDraft {
            path: Some("/billing-desk".to_string()),
            ..PortalDraft::default()
        })
        .await
        .unwrap();
    let moved = agent
        .update_portal(
            &billing.id,
            PortalUpdate {
                path: Some("/custom".to_string()),
                ..PortalUpdate::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(moved, PortalError::PathInUse(_)));
    assert_eq!(agent.portal(&billing.id).unwrap().path, "/billing-desk");

    assert!(matches!(
        agent.update_portal("portal-missing", PortalUpdate::default()).await,
        Err(PortalError::NotFound(_))
    ));
    agent.delete_portal(&portal.id).unwrap();
    assert!(agent.portal(&portal.id).is_none());
    assert!(matches!(
        agent.delete_portal(&portal.id),
        Err(PortalError::NotFound(_))
    ));
}

/// Tenet: the background cycle creates portals on its own schedule.
#[tokio::test(start_paused = true)]
async fn portal_agent_runs_in_background() {
    let log = quiet_log();
    let agent = Arc::new(PortalDevelopmentAgent::new(
        &log,
        PortalAgentConfig {
            creation_interval: Some(Duration::from_secs(60)),
            ..manual_agent_config()
        },
    ));
    agent.start();
    assert!(agent.is_running());
    assert_eq!(agent.status().total_portals, 0);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(agent.status().total_portals, 9);

    agent.stop().await;
    assert!(!agent.is_running());
}

/// Tenet: the builder needs an architecture and reports monotonic progress.
#[tokio::test(start_paused = true)]
async fn website_build_reaches_completion() {
    let log = quiet_log();
    let builder = WebsiteBuilder::new(&log, BuildTimings::default());
    assert!(matches!(
        builder.start().await,
        Err(PortalError::ArchitectureMissing)
    ));

    builder.initialize();
    assert_eq!(builder.architecture().unwrap().pages.len(), 54);
    assert_eq!(builder.progress(), 0);
    builder.start().await.unwrap();
    assert_eq!(builder.progress(), 100);
    assert!(builder.is_ready());
}

/// Tenet: the website agent publishes one backlog page per cycle.
#[tokio::test(start_paused = true)]
async fn website_agent_drains_backlog() {
    let log = quiet_log();
    let agent = WebsiteDevelopmentAgent::new(
        &log,
        WebsiteAgentConfig {
            interval: None,
            deploy_delay: Duration::from_secs(1),
        },
    );
    assert_eq!(agent.status().backlog, 54);

    let first = agent.run_cycle().await.unwrap();
    assert_eq!(first.status, PublishStatus::Published);
    let status = agent.status();
    assert_eq!(status.backlog, 53);
    assert_eq!(status.published_pages, 1);

    while agent.run_cycle().await.is_some() {}
    let status = agent.status();
    assert_eq!(status.backlog, 0);
    assert_eq!(status.total_pages, 54);
    assert_eq!(status.published_pages, 54);
}
