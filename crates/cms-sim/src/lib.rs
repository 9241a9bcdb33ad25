//! ---
//! cms_section: "11-simulation"
//! cms_subsection: "01-bootstrap"
//! cms_type: "source"
//! cms_scope: "code"
//! cms_description: "Simulation module exports and shared types."
//! cms_version: "v0.1.0"
//! cms_owner: "tbd"
//! ---
//! Synthetic plant telemetry for the ComminuSense dashboard.
//!
//! Everything here is deterministic: the "noise" is a trigonometric function of
//! the tick or sample index, so runs and streams are reproducible.

pub mod batch;
pub mod frames;
pub mod generator;
pub mod input;
pub mod models;
pub mod report;
pub mod stream;
pub mod window;

pub use batch::{
    simulate, PowerPoint, SimulationKpi, SimulationParams, SimulationRequest, SimulationRun,
};
pub use frames::{MachineTarget, Metric, TelemetrySample, PLANT_AGGREGATE};
pub use generator::{Baseline, TelemetryGenerator};
pub use models::{
    predict_energy, predict_maintenance, EnergyPrediction, MaintenancePrediction, ModelRequest,
};
pub use report::{
    energy_report, render_csv, report_rows, EnergyReportRow, DEFAULT_REPORT_ROWS, MAX_REPORT_ROWS,
    REPORT_FILE_NAME,
};
pub use stream::{subscribe, StreamSettings, Subscription};
pub use window::{RollingWindow, DEFAULT_WINDOW};
