//! ---
//! cms_section: "01-core-functionality"
//! cms_subsection: "module"
//! cms_type: "source"
//! cms_scope: "code"
//! cms_description: "Shared primitives and utilities for the core runtime."
//! cms_version: "v0.0.0-prealpha"
//! cms_owner: "tbd"
//! ---
//! Core shared primitives for the ComminuSense workspace: configuration
//! loading and tracing initialisation.

pub mod config;
pub mod logging;

pub use config::{
    ApiConfig, AppConfig, InferenceConfig, LoadedAppConfig, LoggingConfig, MetricsConfig,
    RbacConfig, RoleStoreBackend, SimulationConfig, DEFAULT_PLANT_ID,
};
pub use logging::{init_tracing, LogFormat};
