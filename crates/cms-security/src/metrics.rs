//! ---
//! cms_section: "06-security-access-control"
//! cms_subsection: "module"
//! cms_type: "source"
//! cms_scope: "code"
//! cms_description: "Prometheus counters for access control."
//! cms_version: "v0.0.0-prealpha"
//! cms_owner: "tbd"
//! ---
use prometheus::{IntCounter, Registry};
use std::sync::Arc;

/// Access-control metrics exported via Prometheus.
#[derive(Clone)]
pub struct SecurityMetrics {
    registry: Arc<Registry>,
    rbac_checks_total: IntCounter,
    rbac_denials_total: IntCounter,
    role_assignments_total: IntCounter,
}

impl SecurityMetrics {
    /// Register metrics with the provided registry.
    pub fn new(registry: Arc<Registry>) -> anyhow::Result<Self> {
        let rbac_checks_total =
            IntCounter::new("rbac_checks_total", "Permission checks evaluated")?;
        let rbac_denials_total =
            IntCounter::new("rbac_denials_total", "Access denials due to RBAC policies")?;
        let role_assignments_total =
            IntCounter::new("role_assignments_total", "Role assignments written")?;

        registry.register(Box::new(rbac_checks_total.clone()))?;
        registry.register(Box::new(rbac_denials_total.clone()))?;
        registry.register(Box::new(role_assignments_total.clone()))?;

        Ok(Self {
            registry,
            rbac_checks_total,
            rbac_denials_total,
            role_assignments_total,
        })
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn inc_rbac_check(&self) {
        self.rbac_checks_total.inc();
    }

    pub fn inc_rbac_denial(&self) {
        self.rbac_denials_total.inc();
    }

    pub fn inc_role_assignment(&self) {
        self.role_assignments_total.inc();
    }

    pub fn denials(&self) -> u64 {
        self.rbac_denials_total.get()
    }
}
