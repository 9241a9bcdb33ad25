//! ---
//! cms_section: "06-security-access-control"
//! cms_subsection: "module"
//! cms_type: "source"
//! cms_scope: "code"
//! cms_description: "Plant role to permission model."
//! cms_version: "v0.0.0-prealpha"
//! cms_owner: "tbd"
//! ---
use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Closed set of actions that can be gated in the dashboard.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
pub enum Permission {
    /// Read live and historical telemetry.
    #[serde(rename = "telemetry.read")]
    #[strum(serialize = "telemetry.read")]
    TelemetryRead,
    /// Subscribe to the server-sent telemetry stream.
    #[serde(rename = "telemetry.stream")]
    #[strum(serialize = "telemetry.stream")]
    TelemetryStream,
    /// Run what-if simulations and model predictions.
    #[serde(rename = "simulation.run")]
    #[strum(serialize = "simulation.run")]
    SimulationRun,
    /// Apply an optimiser recommendation to a machine.
    #[serde(rename = "recommendation.apply")]
    #[strum(serialize = "recommendation.apply")]
    RecommendationApply,
    /// Raise maintenance tickets.
    #[serde(rename = "maintenance.create")]
    #[strum(serialize = "maintenance.create")]
    MaintenanceCreate,
    /// Assign roles to other users.
    #[serde(rename = "user.manage")]
    #[strum(serialize = "user.manage")]
    UserManage,
    /// Read the audit trail.
    #[serde(rename = "audit.read")]
    #[strum(serialize = "audit.read")]
    AuditRead,
    /// Export reports.
    #[serde(rename = "report.export")]
    #[strum(serialize = "report.export")]
    ReportExport,
}

impl Permission {
    /// Parse a permission label, returning `None` for anything outside the closed set.
    pub fn parse(label: &str) -> Option<Self> {
        label.parse().ok()
    }

    /// Label as used on the wire (`telemetry.read`, ...).
    pub fn label(self) -> &'static str {
        self.into()
    }
}

/// Plant roles. Labels are upper snake case (`PROCESS_ENGINEER`).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PlantRole {
    Operator,
    Supervisor,
    ProcessEngineer,
    Maintenance,
    PlantManager,
    NmdcAdmin,
}

impl PlantRole {
    /// Parse a role label, returning `None` for unknown labels.
    pub fn parse(label: &str) -> Option<Self> {
        label.parse().ok()
    }

    pub fn label(self) -> &'static str {
        self.into()
    }

    /// Permissions granted by the role. Fixed at build time.
    pub fn grants(self) -> &'static [Permission] {
        use Permission::*;
        match self {
            PlantRole::Operator => &[TelemetryRead, TelemetryStream],
            PlantRole::Supervisor => &[TelemetryRead, TelemetryStream, RecommendationApply],
            PlantRole::ProcessEngineer => {
                &[TelemetryRead, TelemetryStream, SimulationRun, ReportExport]
            }
            PlantRole::Maintenance => &[TelemetryRead, MaintenanceCreate, ReportExport],
            PlantRole::PlantManager => &[TelemetryRead, ReportExport, AuditRead],
            PlantRole::NmdcAdmin => &[
                TelemetryRead,
                TelemetryStream,
                SimulationRun,
                RecommendationApply,
                MaintenanceCreate,
                UserManage,
                AuditRead,
                ReportExport,
            ],
        }
    }
}

/// Set of roles held by one user.
pub type RoleSet = BTreeSet<PlantRole>;

/// One row of the role/permission matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub role: PlantRole,
    pub permissions: Vec<Permission>,
}

/// Evaluates permission checks against the static role table.
#[derive(Debug, Clone)]
pub struct RbacEngine {
    roles: HashMap<PlantRole, HashSet<Permission>>,
}

impl Default for RbacEngine {
    fn default() -> Self {
        let roles = PlantRole::iter()
            .map(|role| (role, role.grants().iter().copied().collect()))
            .collect();
        Self { roles }
    }
}

impl RbacEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Permissions granted by `role`.
    pub fn permissions(&self, role: PlantRole) -> Option<&HashSet<Permission>> {
        self.roles.get(&role)
    }

    /// Typed check: true when any role grants the permission.
    pub fn is_authorized<'a>(
        &self,
        roles: impl IntoIterator<Item = &'a PlantRole>,
        permission: Permission,
    ) -> bool {
        roles.into_iter().any(|role| {
            self.roles
                .get(role)
                .is_some_and(|granted| granted.contains(&permission))
        })
    }

    /// Label-based check used at the API boundary.
    ///
    /// Unknown permission labels and unknown role labels never grant anything.
    pub fn has_permission<I, S>(&self, roles: I, permission: &str) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let Some(permission) = Permission::parse(permission) else {
            return false;
        };
        roles
            .into_iter()
            .filter_map(|label| PlantRole::parse(label.as_ref()))
            .any(|role| self.is_authorized([&role], permission))
    }

    /// Full matrix in declaration order, used by the admin print view.
    pub fn matrix(&self) -> Vec<RoleGrant> {
        PlantRole::iter()
            .map(|role| {
                let mut permissions: Vec<Permission> = self
                    .roles
                    .get(&role)
                    .map(|set| set.iter().copied().collect())
                    .unwrap_or_default();
                permissions.sort();
                RoleGrant { role, permissions }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_reads_but_cannot_manage_users() {
        let engine = RbacEngine::new();
        assert!(engine.has_permission(["OPERATOR"], "telemetry.read"));
        assert!(engine.has_permission(["OPERATOR"], "telemetry.stream"));
        assert!(!engine.has_permission(["OPERATOR"], "user.manage"));
        assert!(!engine.has_permission(["OPERATOR"], "simulation.run"));
    }

    #[test]
    fn unknown_permission_fails_closed() {
        let engine = RbacEngine::new();
        let everyone: Vec<&str> = PlantRole::iter().map(PlantRole::label).collect();
        for label in ["telemetry.write", "", "TELEMETRY.READ", "user.manage "] {
            assert!(!engine.has_permission(&everyone, label), "{label}");
        }
    }

    #[test]
    fn unknown_roles_grant_nothing() {
        let engine = RbacEngine::new();
        for permission in Permission::iter() {
            for role in ["admin", "operator", "ROOT", "nmdc_admin"] {
                assert!(!engine.has_permission([role], permission.label()));
            }
        }
    }

    #[test]
    fn any_role_suffices() {
        let engine = RbacEngine::new();
        assert!(engine.has_permission(["OPERATOR", "MAINTENANCE"], "maintenance.create"));
        assert!(engine.has_permission(["bogus", "PROCESS_ENGINEER"], "simulation.run"));
        assert!(!engine.has_permission(Vec::<String>::new(), "telemetry.read"));
    }

    #[test]
    fn admin_is_superset_of_every_role() {
        let engine = RbacEngine::new();
        let admin = engine.permissions(PlantRole::NmdcAdmin).unwrap();
        for role in PlantRole::iter() {
            let granted = engine.permissions(role).unwrap();
            assert!(granted.is_subset(admin), "{role} exceeds admin");
        }
        assert_eq!(admin.len(), Permission::iter().count());
    }

    #[test]
    fn labels_round_trip_through_strum() {
        assert_eq!(PlantRole::ProcessEngineer.label(), "PROCESS_ENGINEER");
        assert_eq!(PlantRole::parse("NMDC_ADMIN"), Some(PlantRole::NmdcAdmin));
        assert_eq!(Permission::parse("report.export"), Some(Permission::ReportExport));
        assert_eq!(Permission::AuditRead.to_string(), "audit.read");
        assert_eq!(
            serde_json::to_string(&PlantRole::PlantManager).unwrap(),
            "\"PLANT_MANAGER\""
        );
    }

    #[test]
    fn matrix_lists_every_role_once() {
        let matrix = RbacEngine::new().matrix();
        assert_eq!(matrix.len(), 6);
        let maintenance = matrix
            .iter()
            .find(|row| row.role == PlantRole::Maintenance)
            .unwrap();
        assert_eq!(
            maintenance.permissions,
            vec![
                Permission::TelemetryRead,
                Permission::MaintenanceCreate,
                Permission::ReportExport
            ]
        );
    }
}
