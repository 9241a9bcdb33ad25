//! ---
//! cms_section: "06-security-access-control"
//! cms_subsection: "module"
//! cms_type: "source"
//! cms_scope: "code"
//! cms_description: "Role-based access control for the plant dashboard."
//! cms_version: "v0.0.0-prealpha"
//! cms_owner: "tbd"
//! ---
//! Role-based access control: the static plant role table, role-assignment
//! stores, the access guard consulted before protected actions, and the
//! separate job-title scheme of the operations console.

pub mod console;
pub mod guard;
pub mod metrics;
pub mod nav;
pub mod rbac;
pub mod store;

pub use console::{can_view, console_menu, ConsolePage, JobRole, CONSOLE_PAGES};
pub use guard::{parse_roles, AccessDecision, AccessGuard, ROLE_SELECTION_PATH};
pub use metrics::SecurityMetrics;
pub use nav::{visible_links, DashboardLink, DASHBOARD_LINKS};
pub use rbac::{Permission, PlantRole, RbacEngine, RoleGrant, RoleSet};
pub use store::{
    InMemoryRoleStore, JsonFileRoleStore, RoleStore, RoleStoreError, SharedRoleStore, UserId,
};
