//! ---
//! cms_section: "06-security-access-control"
//! cms_subsection: "module"
//! cms_type: "source"
//! cms_scope: "code"
//! cms_description: "Dashboard links gated by plant permissions."
//! cms_version: "v0.0.0-prealpha"
//! cms_owner: "tbd"
//! ---
use serde::Serialize;

use crate::rbac::{Permission, RbacEngine, RoleSet};

/// Sidebar link of the plant dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DashboardLink {
    pub href: &'static str,
    pub label: &'static str,
    pub permission: Permission,
}

const fn link(href: &'static str, label: &'static str, permission: Permission) -> DashboardLink {
    DashboardLink {
        href,
        label,
        permission,
    }
}

/// Every dashboard link with the permission it requires.
pub const DASHBOARD_LINKS: &[DashboardLink] = &[
    link("/", "Overview", Permission::TelemetryRead),
    link("/machines/grinder_01", "Machine", Permission::TelemetryRead),
    link("/simulation", "Simulation", Permission::SimulationRun),
    link("/maintenance", "Maintenance", Permission::MaintenanceCreate),
    link("/reports", "Reports", Permission::ReportExport),
    link("/admin", "Admin", Permission::UserManage),
    link("/rbac-print", "RBAC", Permission::UserManage),
    link(
        "/maintenance_alert",
        "Maintenance Alert",
        Permission::MaintenanceCreate,
    ),
    link(
        "/energy_optimizer",
        "Energy Optimization",
        Permission::SimulationRun,
    ),
];

/// Links the holder of `roles` may navigate to, in sidebar order.
pub fn visible_links(engine: &RbacEngine, roles: &RoleSet) -> Vec<DashboardLink> {
    DASHBOARD_LINKS
        .iter()
        .filter(|link| engine.is_authorized(roles, link.permission))
        .copied()
        .collect()
}
