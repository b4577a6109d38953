//! Portals
//!
//! - `catalog`: portal templates, role permissions and the canonical registry
//! - `manager`: `PortalManager`, the `portal_management` registry and flags
//! - `development`: `PortalDevelopmentAgent`, template-driven portal creation

pub mod catalog;
pub mod development;
pub mod manager;

pub use catalog::{canonical_portals, default_templates, permissions_for_role, CanonicalPortal};
pub use development::{
    PortalAgentConfig, PortalAgentStatus, PortalDevelopmentAgent, PortalDraft, PortalGap,
    PortalUpdate,
};
pub use manager::{PortalManager, PortalManagerStatus, PortalRecord, RegistryStatus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kinds of portal surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PortalType {
    Carrier,
    Broker,
    Shipper,
    Driver,
    OwnerOperator,
    Admin,
    SuperAdmin,
    Enterprise,
    Marketplace,
    Analytics,
    Billing,
    Support,
}

impl PortalType {
    pub const ALL: [PortalType; 12] = [
        PortalType::Carrier,
        PortalType::Broker,
        PortalType::Shipper,
        PortalType::Driver,
        PortalType::OwnerOperator,
        PortalType::Admin,
        PortalType::SuperAdmin,
        PortalType::Enterprise,
        PortalType::Marketplace,
        PortalType::Analytics,
        PortalType::Billing,
        PortalType::Support,
    ];

    /// Types the creation cycle always wants present
    pub const ESSENTIAL: [PortalType; 5] = [
        PortalType::Carrier,
        PortalType::Broker,
        PortalType::Shipper,
        PortalType::Admin,
        PortalType::Marketplace,
    ];

    #[must_use]
    pub fn slug(&self) -> &'static str {
        match self {
            PortalType::Carrier => "carrier",
            PortalType::Broker => "broker",
            PortalType::Shipper => "shipper",
            PortalType::Driver => "driver",
            PortalType::OwnerOperator => "owner-operator",
            PortalType::Admin => "admin",
            PortalType::SuperAdmin => "super-admin",
            PortalType::Enterprise => "enterprise",
            PortalType::Marketplace => "marketplace",
            PortalType::Analytics => "analytics",
            PortalType::Billing => "billing",
            PortalType::Support => "support",
        }
    }

    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self {
            PortalType::Carrier => "Carrier Portal",
            PortalType::Broker => "Broker Portal",
            PortalType::Shipper => "Shipper Portal",
            PortalType::Driver => "Driver Portal",
            PortalType::OwnerOperator => "Owner-Operator Portal",
            PortalType::Admin => "Admin Portal",
            PortalType::SuperAdmin => "Super Admin Portal",
            PortalType::Enterprise => "Enterprise Portal",
            PortalType::Marketplace => "Marketplace Portal",
            PortalType::Analytics => "Analytics Portal",
            PortalType::Billing => "Billing Portal",
            PortalType::Support => "Support Portal",
        }
    }

    /// Template used to build this type; super-admin shares the admin one
    #[must_use]
    pub fn template_id(&self) -> String {
        match self {
            PortalType::SuperAdmin => "admin-portal".to_string(),
            other => format!("{}-portal", other.slug()),
        }
    }
}

impl fmt::Display for PortalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Roles a user can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UserRole {
    Carrier,
    Broker,
    Shipper,
    Driver,
    OwnerOperator,
    Admin,
    SuperAdmin,
    Enterprise,
    Analyst,
    Billing,
    Support,
}

impl UserRole {
    pub const ALL: [UserRole; 11] = [
        UserRole::Carrier,
        UserRole::Broker,
        UserRole::Shipper,
        UserRole::Driver,
        UserRole::OwnerOperator,
        UserRole::Admin,
        UserRole::SuperAdmin,
        UserRole::Enterprise,
        UserRole::Analyst,
        UserRole::Billing,
        UserRole::Support,
    ];

    #[must_use]
    pub fn slug(&self) -> &'static str {
        match self {
            UserRole::Carrier => "carrier",
            UserRole::Broker => "broker",
            UserRole::Shipper => "shipper",
            UserRole::Driver => "driver",
            UserRole::OwnerOperator => "owner-operator",
            UserRole::Admin => "admin",
            UserRole::SuperAdmin => "super-admin",
            UserRole::Enterprise => "enterprise",
            UserRole::Analyst => "analyst",
            UserRole::Billing => "billing",
            UserRole::Support => "support",
        }
    }

    /// Portal type a dedicated portal for this role gets
    #[must_use]
    pub fn portal_type(&self) -> PortalType {
        match self {
            UserRole::Carrier => PortalType::Carrier,
            UserRole::Broker => PortalType::Broker,
            UserRole::Shipper => PortalType::Shipper,
            UserRole::Driver => PortalType::Driver,
            UserRole::OwnerOperator => PortalType::OwnerOperator,
            UserRole::Admin => PortalType::Admin,
            UserRole::SuperAdmin => PortalType::SuperAdmin,
            UserRole::Enterprise => PortalType::Enterprise,
            UserRole::Analyst => PortalType::Analytics,
            UserRole::Billing => PortalType::Billing,
            UserRole::Support => PortalType::Support,
        }
    }

    /// `"Owner-operator Portal"` style name for a role-specific portal
    #[must_use]
    pub fn portal_name(&self) -> String {
        let slug = self.slug();
        let mut chars = slug.chars();
        match chars.next() {
            Some(first) => format!("{}{} Portal", first.to_ascii_uppercase(), chars.as_str()),
            None => "Custom Portal".to_string(),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Publication state of a generated portal or page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    Draft,
    Published,
    Archived,
    Maintenance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalFeature {
    pub id: String,
    pub name: String,
    pub component: String,
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalMetadata {
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub author: String,
    pub last_modified: DateTime<Utc>,
}

/// Blueprint a portal is instantiated from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalTemplate {
    pub id: String,
    pub name: String,
    pub portal_type: PortalType,
    pub roles: Vec<UserRole>,
    pub path: String,
    pub component: String,
    pub features: Vec<PortalFeature>,
    pub permissions: Vec<String>,
    pub metadata: PortalMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalSettings {
    pub theme: String,
    pub layout: String,
    pub permissions: BTreeMap<String, bool>,
}

/// A generated portal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalInstance {
    pub id: String,
    pub name: String,
    pub portal_type: PortalType,
    pub roles: Vec<UserRole>,
    pub path: String,
    pub component: String,
    pub features: Vec<PortalFeature>,
    pub status: PublishStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: PortalMetadata,
    pub settings: PortalSettings,
}

impl PortalInstance {
    /// Refresh both modification timestamps
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.updated_at = now;
        self.metadata.last_modified = now;
    }
}
