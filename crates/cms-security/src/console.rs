//! ---
//! cms_section: "06-security-access-control"
//! cms_subsection: "module"
//! cms_type: "source"
//! cms_scope: "code"
//! cms_description: "Job-title roles of the operations console."
//! cms_version: "v0.0.0-prealpha"
//! cms_owner: "tbd"
//! ---
//! The operations console gates its pages by a single job title per user.
//! These titles are a separate scheme from [`crate::rbac::PlantRole`]: there is
//! no mapping between the two and `admin` here implies nothing about
//! `NMDC_ADMIN` there.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobRole {
    Operator,
    Engineer,
    Manager,
    Admin,
}

impl JobRole {
    pub fn parse(label: &str) -> Option<Self> {
        label.parse().ok()
    }
}

/// True when `allowed` is empty, otherwise only for a present role listed in `allowed`.
pub fn can_view(role: Option<JobRole>, allowed: &[JobRole]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    match role {
        Some(role) => allowed.contains(&role),
        None => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConsolePage {
    pub path: &'static str,
    pub label: &'static str,
    pub allowed: &'static [JobRole],
}

const EVERYONE: &[JobRole] = &[
    JobRole::Operator,
    JobRole::Engineer,
    JobRole::Manager,
    JobRole::Admin,
];

pub const CONSOLE_PAGES: &[ConsolePage] = &[
    ConsolePage {
        path: "/dashboard",
        label: "Dashboard",
        allowed: EVERYONE,
    },
    ConsolePage {
        path: "/operations",
        label: "Operations",
        allowed: EVERYONE,
    },
    ConsolePage {
        path: "/twin-lab",
        label: "Twin Lab",
        allowed: EVERYONE,
    },
    ConsolePage {
        path: "/maintenance",
        label: "Maintenance",
        allowed: &[JobRole::Engineer, JobRole::Manager, JobRole::Admin],
    },
    ConsolePage {
        path: "/scheduling",
        label: "Scheduling",
        allowed: EVERYONE,
    },
    ConsolePage {
        path: "/admin",
        label: "Admin",
        allowed: &[JobRole::Admin],
    },
];

/// Console pages shown to `role`, in menu order.
pub fn console_menu(role: Option<JobRole>) -> Vec<ConsolePage> {
    CONSOLE_PAGES
        .iter()
        .filter(|page| can_view(role, page.allowed))
        .copied()
        .collect()
}
