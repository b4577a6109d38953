//! Static portal tables

use super::{PortalFeature, PortalMetadata, PortalTemplate, PortalType, UserRole};
use chrono::Utc;

type FeatureRow = (&'static str, &'static str, &'static str, &'static [&'static str]);

struct TemplateRow {
    portal_type: PortalType,
    roles: &'static [UserRole],
    component: &'static str,
    description: &'static str,
    keywords: &'static [&'static str],
    features: &'static [FeatureRow],
}

const TEMPLATE_ROWS: &[TemplateRow] = &[
    TemplateRow {
        portal_type: PortalType::Carrier,
        roles: &[UserRole::Carrier, UserRole::Driver],
        component: "CarrierPortal",
        description: "Complete carrier management portal",
        keywords: &["carrier", "fleet", "dispatch", "loads"],
        features: &[
            ("load-board", "Load Board", "LoadBoard", &["view_loads", "bid_loads"]),
            ("fleet-management", "Fleet Management", "FleetManagement", &["manage_fleet"]),
            ("dispatch", "Dispatch", "Dispatch", &["manage_dispatch"]),
            ("analytics", "Analytics", "Analytics", &["view_analytics"]),
        ],
    },
    TemplateRow {
        portal_type: PortalType::Broker,
        roles: &[UserRole::Broker, UserRole::Admin],
        component: "BrokerPortal",
        description: "Complete broker management portal",
        keywords: &["broker", "loads", "carriers", "rates"],
        features: &[
            ("load-management", "Load Management", "LoadManagement", &["manage_loads"]),
            ("carrier-directory", "Carrier Directory", "CarrierDirectory", &["view_carriers"]),
            ("rate-negotiation", "Rate Negotiation", "RateNegotiation", &["negotiate_rates"]),
            ("analytics", "Analytics", "Analytics", &["view_analytics"]),
        ],
    },
    TemplateRow {
        portal_type: PortalType::Shipper,
        roles: &[UserRole::Shipper, UserRole::Admin],
        component: "ShipperPortal",
        description: "Complete shipper management portal",
        keywords: &["shipper", "shipments", "quotes", "tracking"],
        features: &[
            (
                "shipment-management",
                "Shipment Management",
                "ShipmentManagement",
                &["manage_shipments"],
            ),
            ("rate-quotes", "Rate Quotes", "RateQuotes", &["request_quotes"]),
            ("tracking", "Tracking", "Tracking", &["track_shipments"]),
            ("analytics", "Analytics", "Analytics", &["view_analytics"]),
        ],
    },
    TemplateRow {
        portal_type: PortalType::Driver,
        roles: &[UserRole::Driver],
        component: "DriverPortal",
        description: "Complete driver management portal",
        keywords: &["driver", "assignments", "routes", "tracking"],
        features: &[
            ("load-assignments", "Load Assignments", "LoadAssignments", &["view_assignments"]),
            ("route-planning", "Route Planning", "RoutePlanning", &["plan_routes"]),
            ("time-tracking", "Time Tracking", "TimeTracking", &["track_time"]),
            ("documents", "Documents", "Documents", &["view_documents"]),
        ],
    },
    TemplateRow {
        portal_type: PortalType::OwnerOperator,
        roles: &[UserRole::OwnerOperator],
        component: "OwnerOperatorPortal",
        description: "Complete owner-operator management portal",
        keywords: &["owner-operator", "business", "finances", "compliance"],
        features: &[
            (
                "business-management",
                "Business Management",
                "BusinessManagement",
                &["manage_business"],
            ),
            ("financial-tracking", "Financial Tracking", "FinancialTracking", &["track_finances"]),
            (
                "load-opportunities",
                "Load Opportunities",
                "LoadOpportunities",
                &["view_opportunities"],
            ),
            ("compliance", "Compliance", "Compliance", &["manage_compliance"]),
        ],
    },
    TemplateRow {
        portal_type: PortalType::Admin,
        roles: &[UserRole::Admin, UserRole::SuperAdmin],
        component: "AdminPortal",
        description: "Complete admin management portal",
        keywords: &["admin", "users", "system", "monitoring"],
        features: &[
            ("user-management", "User Management", "UserManagement", &["manage_users"]),
            (
                "system-configuration",
                "System Configuration",
                "SystemConfiguration",
                &["configure_system"],
            ),
            ("monitoring", "System Monitoring", "Monitoring", &["monitor_system"]),
            ("reports", "Reports", "Reports", &["view_reports"]),
        ],
    },
    TemplateRow {
        portal_type: PortalType::Enterprise,
        roles: &[UserRole::Enterprise, UserRole::Admin],
        component: "EnterprisePortal",
        description: "Complete enterprise management portal",
        keywords: &["enterprise", "multi-tenant", "analytics", "integrations"],
        features: &[
            (
                "multi-tenant-management",
                "Multi-Tenant Management",
                "MultiTenantManagement",
                &["manage_tenants"],
            ),
            (
                "advanced-analytics",
                "Advanced Analytics",
                "AdvancedAnalytics",
                &["view_advanced_analytics"],
            ),
            (
                "custom-integrations",
                "Custom Integrations",
                "CustomIntegrations",
                &["manage_integrations"],
            ),
            ("white-label", "White Label", "WhiteLabel", &["customize_branding"]),
        ],
    },
    TemplateRow {
        portal_type: PortalType::Marketplace,
        roles: &[UserRole::Carrier, UserRole::Broker, UserRole::Shipper],
        component: "MarketplacePortal",
        description: "Complete marketplace portal",
        keywords: &["marketplace", "loads", "quotes", "auctions"],
        features: &[
            ("load-board", "Load Board", "LoadBoard", &["view_loads", "post_loads"]),
            ("rate-quotes", "Rate Quotes", "RateQuotes", &["request_quotes", "provide_quotes"]),
            ("auctions", "Auctions", "Auctions", &["participate_auctions"]),
            ("reviews", "Reviews & Ratings", "Reviews", &["view_reviews", "post_reviews"]),
        ],
    },
    TemplateRow {
        portal_type: PortalType::Analytics,
        roles: &[UserRole::Analyst, UserRole::Admin, UserRole::SuperAdmin],
        component: "AnalyticsPortal",
        description: "Complete analytics portal",
        keywords: &["analytics", "reports", "predictions", "business-intelligence"],
        features: &[
            (
                "data-visualization",
                "Data Visualization",
                "DataVisualization",
                &["view_visualizations"],
            ),
            ("reporting", "Reporting", "Reporting", &["generate_reports"]),
            (
                "predictive-analytics",
                "Predictive Analytics",
                "PredictiveAnalytics",
                &["view_predictions"],
            ),
            (
                "business-intelligence",
                "Business Intelligence",
                "BusinessIntelligence",
                &["view_bi"],
            ),
        ],
    },
    TemplateRow {
        portal_type: PortalType::Billing,
        roles: &[UserRole::Billing, UserRole::Admin],
        component: "BillingPortal",
        description: "Complete billing management portal",
        keywords: &["billing", "invoices", "payments", "subscriptions"],
        features: &[
            ("invoice-management", "Invoice Management", "InvoiceManagement", &["manage_invoices"]),
            (
                "payment-processing",
                "Payment Processing",
                "PaymentProcessing",
                &["process_payments"],
            ),
            (
                "financial-reports",
                "Financial Reports",
                "FinancialReports",
                &["view_financial_reports"],
            ),
            (
                "subscription-management",
                "Subscription Management",
                "SubscriptionManagement",
                &["manage_subscriptions"],
            ),
        ],
    },
    TemplateRow {
        portal_type: PortalType::Support,
        roles: &[UserRole::Support, UserRole::Admin],
        component: "SupportPortal",
        description: "Complete support management portal",
        keywords: &["support", "tickets", "knowledge-base", "chat"],
        features: &[
            ("ticket-management", "Ticket Management", "TicketManagement", &["manage_tickets"]),
            ("knowledge-base", "Knowledge Base", "KnowledgeBase", &["manage_knowledge_base"]),
            ("live-chat", "Live Chat", "LiveChat", &["manage_chat"]),
            ("customer-feedback", "Customer Feedback", "CustomerFeedback", &["view_feedback"]),
        ],
    },
];

/// One template per portal type except super-admin
#[must_use]
pub fn default_templates() -> Vec<PortalTemplate> {
    TEMPLATE_ROWS.iter().map(build_template).collect()
}

fn build_template(row: &TemplateRow) -> PortalTemplate {
    let features: Vec<PortalFeature> = row
        .features
        .iter()
        .map(|(id, name, component, permissions)| PortalFeature {
            id: (*id).to_string(),
            name: (*name).to_string(),
            component: (*component).to_string(),
            permissions: permissions.iter().map(|p| (*p).to_string()).collect(),
        })
        .collect();

    let mut permissions: Vec<String> = Vec::new();
    for perm in features.iter().flat_map(|f| f.permissions.iter()) {
        if !permissions.contains(perm) {
            permissions.push(perm.clone());
        }
    }

    let name = row.portal_type.display_name().to_string();
    PortalTemplate {
        id: row.portal_type.template_id(),
        name: name.clone(),
        portal_type: row.portal_type,
        roles: row.roles.to_vec(),
        path: format!("/{}", row.portal_type.slug()),
        component: row.component.to_string(),
        features,
        permissions,
        metadata: PortalMetadata {
            title: name,
            description: row.description.to_string(),
            keywords: row.keywords.iter().map(|k| (*k).to_string()).collect(),
            author: "Autonomous Agent".to_string(),
            last_modified: Utc::now(),
        },
    }
}

/// Permissions granted to each role
#[must_use]
pub fn permissions_for_role(role: UserRole) -> &'static [&'static str] {
    match role {
        UserRole::Carrier => &[
            "view_loads",
            "bid_loads",
            "manage_fleet",
            "manage_dispatch",
            "view_analytics",
        ],
        UserRole::Broker => &["manage_loads", "view_carriers", "negotiate_rates", "view_analytics"],
        UserRole::Shipper => &[
            "manage_shipments",
            "request_quotes",
            "track_shipments",
            "view_analytics",
        ],
        UserRole::Driver => &["view_assignments", "plan_routes", "track_time", "view_documents"],
        UserRole::OwnerOperator => &[
            "manage_business",
            "track_finances",
            "view_opportunities",
            "manage_compliance",
        ],
        UserRole::Admin => &["manage_users", "configure_system", "monitor_system", "view_reports"],
        UserRole::SuperAdmin => &[
            "manage_users",
            "configure_system",
            "monitor_system",
            "view_reports",
            "manage_all_portals",
        ],
        UserRole::Enterprise => &[
            "manage_tenants",
            "view_advanced_analytics",
            "manage_integrations",
            "customize_branding",
        ],
        UserRole::Analyst => &[
            "view_visualizations",
            "generate_reports",
            "view_predictions",
            "view_bi",
        ],
        UserRole::Billing => &[
            "manage_invoices",
            "process_payments",
            "view_financial_reports",
            "manage_subscriptions",
        ],
        UserRole::Support => &[
            "manage_tickets",
            "manage_knowledge_base",
            "manage_chat",
            "view_feedback",
        ],
    }
}

/// An entry of the canonical portal registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalPortal {
    pub key: &'static str,
    pub name: &'static str,
    pub route: &'static str,
}

const CANONICAL: &[CanonicalPortal] = &[
    CanonicalPortal { key: "super_admin", name: "Super Admin Portal", route: "/super-admin" },
    CanonicalPortal { key: "admin", name: "Admin Portal", route: "/admin" },
    CanonicalPortal { key: "tms_admin", name: "TMS Admin Portal", route: "/tms-admin" },
    CanonicalPortal { key: "onboarding", name: "Onboarding Portal", route: "/onboarding" },
    CanonicalPortal { key: "broker", name: "Broker Portal", route: "/broker" },
    CanonicalPortal { key: "shipper", name: "Shipper Portal", route: "/shipper" },
    CanonicalPortal { key: "carrier", name: "Carrier Portal", route: "/carrier" },
    CanonicalPortal { key: "driver", name: "Driver Portal", route: "/driver" },
    CanonicalPortal {
        key: "owner_operator",
        name: "Owner Operator Portal",
        route: "/owner-operator",
    },
    CanonicalPortal { key: "factoring", name: "Factoring Portal", route: "/factoring" },
    CanonicalPortal { key: "load_board", name: "Load Board Portal", route: "/load-board" },
    CanonicalPortal { key: "crm", name: "CRM Portal", route: "/crm" },
    CanonicalPortal { key: "financials", name: "Financials Portal", route: "/financials" },
    CanonicalPortal { key: "edi", name: "EDI Portal", route: "/edi" },
    CanonicalPortal { key: "marketplace", name: "Marketplace Portal", route: "/marketplace" },
    CanonicalPortal { key: "analytics", name: "Analytics Portal", route: "/analytics" },
    CanonicalPortal { key: "autonomous", name: "Autonomous AI Portal", route: "/autonomous" },
    CanonicalPortal { key: "workers", name: "Workers Portal", route: "/workers" },
    CanonicalPortal { key: "rates", name: "Rates Portal", route: "/rates" },
    CanonicalPortal { key: "directory", name: "Directory Portal", route: "/directory" },
];

/// The twenty portals registered at startup
#[must_use]
pub fn canonical_portals() -> &'static [CanonicalPortal] {
    CANONICAL
}
