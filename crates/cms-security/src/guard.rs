//! ---
//! cms_section: "06-security-access-control"
//! cms_subsection: "module"
//! cms_type: "source"
//! cms_scope: "code"
//! cms_description: "Access decisions for protected views and actions."
//! cms_version: "v0.0.0-prealpha"
//! cms_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::metrics::SecurityMetrics;
use crate::rbac::{Permission, PlantRole, RbacEngine, RoleSet};
use crate::store::{RoleStoreError, SharedRoleStore};

/// Path of the role-selection flow users without roles are sent to.
pub const ROLE_SELECTION_PATH: &str = "/select-role";

/// Outcome of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessDecision {
    Granted,
    /// The user holds no role at all and must pick one first.
    RoleSelectionRequired,
    Forbidden,
}

impl AccessDecision {
    pub fn is_granted(self) -> bool {
        matches!(self, AccessDecision::Granted)
    }
}

/// Combines the role store with the static role table.
#[derive(Clone)]
pub struct AccessGuard {
    engine: RbacEngine,
    store: SharedRoleStore,
    metrics: Option<SecurityMetrics>,
}

impl AccessGuard {
    pub fn new(store: SharedRoleStore) -> Self {
        Self {
            engine: RbacEngine::new(),
            store,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: SecurityMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn engine(&self) -> &RbacEngine {
        &self.engine
    }

    pub fn store(&self) -> &SharedRoleStore {
        &self.store
    }

    /// Roles currently held by `user_id`.
    pub async fn roles(&self, user_id: &str) -> Result<RoleSet, RoleStoreError> {
        self.store.roles(user_id).await
    }

    /// Replace the roles of `user_id`.
    pub async fn assign(&self, user_id: &str, roles: RoleSet) -> Result<(), RoleStoreError> {
        let labels: Vec<&str> = roles.iter().map(|r| r.label()).collect();
        self.store.set_roles(user_id, roles.clone()).await?;
        if let Some(metrics) = &self.metrics {
            metrics.inc_role_assignment();
        }
        debug!(user_id, roles = ?labels, "role assignment replaced");
        Ok(())
    }

    /// Decide whether `user_id` may perform `permission`.
    ///
    /// Unknown permission labels are forbidden for everybody.
    pub async fn check(
        &self,
        user_id: &str,
        permission: &str,
    ) -> Result<AccessDecision, RoleStoreError> {
        let roles = self.store.roles(user_id).await?;
        let decision = self.decide(&roles, permission);
        if let Some(metrics) = &self.metrics {
            metrics.inc_rbac_check();
            if !decision.is_granted() {
                metrics.inc_rbac_denial();
            }
        }
        if !decision.is_granted() {
            debug!(user_id, permission, ?decision, "access denied");
        }
        Ok(decision)
    }

    /// Pure decision for an already-resolved role set.
    pub fn decide(&self, roles: &RoleSet, permission: &str) -> AccessDecision {
        if roles.is_empty() {
            return AccessDecision::RoleSelectionRequired;
        }
        match Permission::parse(permission) {
            Some(permission) if self.engine.is_authorized(roles, permission) => {
                AccessDecision::Granted
            }
            _ => AccessDecision::Forbidden,
        }
    }

    /// Whether `caller` may overwrite the assignment of `target`.
    ///
    /// `user.manage` holders may assign anyone; a user without roles may pick their own.
    pub async fn may_assign(&self, caller: &str, target: &str) -> Result<bool, RoleStoreError> {
        let caller_roles = self.store.roles(caller).await?;
        if self
            .engine
            .is_authorized(&caller_roles, Permission::UserManage)
        {
            return Ok(true);
        }
        Ok(caller == target && caller_roles.is_empty())
    }

    /// Whether `caller` may read the assignment of `target`.
    pub async fn may_read(&self, caller: &str, target: &str) -> Result<bool, RoleStoreError> {
        if caller == target {
            return Ok(true);
        }
        let caller_roles = self.store.roles(caller).await?;
        Ok(self
            .engine
            .is_authorized(&caller_roles, Permission::UserManage))
    }
}

/// Parse role labels from a request body. Returns the first unknown label on failure.
pub fn parse_roles<I, S>(labels: I) -> Result<RoleSet, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    labels
        .into_iter()
        .map(|label| PlantRole::parse(label.as_ref()).ok_or_else(|| label.as_ref().to_owned()))
        .collect()
}
