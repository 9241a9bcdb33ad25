//! ---
//! cms_section: "05-networking-external-interfaces"
//! cms_subsection: "module"
//! cms_type: "source"
//! cms_scope: "code"
//! cms_description: "HTTP surface of the dashboard backend."
//! cms_version: "v0.0.0-prealpha"
//! cms_owner: "tbd"
//! ---
pub mod alerts;
pub mod error;
pub mod inference;
pub mod metrics;
pub mod rest;
pub mod tickets;

pub use alerts::{
    AlertLevel, AlertRecommendation, MaintenanceAlert, MaintenanceAlertClient, MaintenanceFeatures,
};
pub use error::ApiError;
pub use inference::{EnergyFeatures, InferenceClient, InferenceError};
pub use metrics::{ApiMetrics, StreamGauge};
pub use rest::{
    Caller, RestApiBuilder, RestApiHandle, RoleAssignmentView, StatusSnapshot, USER_HEADER,
};
pub use tickets::{NewTicket, Ticket, TicketBoard, TicketStatus, TICKET_CAPACITY};
