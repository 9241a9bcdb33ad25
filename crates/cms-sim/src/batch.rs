//! ---
//! cms_section: "11-simulation"
//! cms_subsection: "module"
//! cms_type: "source"
//! cms_scope: "code"
//! cms_description: "Run-once power curve simulation for what-if scenarios."
//! cms_version: "v0.1.0"
//! cms_owner: "tbd"
//! ---
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::frames::round_to;
use crate::input::number_or;

pub const DEFAULT_RPM: f64 = 315.0;
pub const DEFAULT_LOAD_TPH: f64 = 55.0;
pub const DEFAULT_MOISTURE_PCT: f64 = 3.0;
pub const DEFAULT_HORIZON: usize = 60;
pub const MIN_HORIZON: usize = 10;
pub const MAX_HORIZON: usize = 600;

/// Raw request body. Only an absent field takes its default; an explicit
/// `null` is kept so it coerces to zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationRequest {
    #[serde(default, deserialize_with = "present")]
    pub rpm: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub load_tph: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub moisture_pct: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub horizon: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Resolved inputs of a simulation run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationParams {
    pub rpm: f64,
    pub load_tph: f64,
    pub moisture_pct: f64,
    /// Sample count, always within `MIN_HORIZON..=MAX_HORIZON`.
    pub horizon: usize,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            rpm: DEFAULT_RPM,
            load_tph: DEFAULT_LOAD_TPH,
            moisture_pct: DEFAULT_MOISTURE_PCT,
            horizon: DEFAULT_HORIZON,
        }
    }
}

impl SimulationParams {
    /// Build params, clamping `horizon` into range.
    pub fn new(rpm: f64, load_tph: f64, moisture_pct: f64, horizon: f64) -> Self {
        Self {
            rpm,
            load_tph,
            moisture_pct,
            horizon: clamp_horizon(horizon),
        }
    }

    pub fn from_request(request: &SimulationRequest) -> Self {
        Self::new(
            number_or(request.rpm.as_ref(), DEFAULT_RPM),
            number_or(request.load_tph.as_ref(), DEFAULT_LOAD_TPH),
            number_or(request.moisture_pct.as_ref(), DEFAULT_MOISTURE_PCT),
            number_or(request.horizon.as_ref(), DEFAULT_HORIZON as f64),
        )
    }
}

/// Clamp into `[10, 600]` and round up: a fractional horizon still gets
/// the sample that starts inside it.
pub fn clamp_horizon(horizon: f64) -> usize {
    if !horizon.is_finite() {
        return DEFAULT_HORIZON;
    }
    horizon.clamp(MIN_HORIZON as f64, MAX_HORIZON as f64).ceil() as usize
}

/// Pseudo-noise of the batch curve for index `i`.
pub fn batch_noise(i: usize, amplitude: f64) -> f64 {
    let i = i as f64;
    ((i / 6.0).sin() + (i / 5.0).cos()) * amplitude
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerPoint {
    /// Elapsed-time label such as `"12s"`.
    pub t: String,
    pub power_kw: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationKpi {
    pub kwh_per_ton: f64,
    pub avg_power_kw: f64,
    pub load_tph: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRun {
    pub timeseries: Vec<PowerPoint>,
    pub kpi: SimulationKpi,
}

/// Compute the power curve and KPIs. Pure: equal params give equal runs.
pub fn simulate(params: &SimulationParams) -> SimulationRun {
    let n = params.horizon;
    let mut timeseries = Vec::with_capacity(n);
    let mut sum_power = 0.0;

    for i in 0..n {
        let adjusted_load = params.load_tph - params.moisture_pct * 0.8 + batch_noise(i, 1.2);
        let power =
            60.0 + 0.6 * adjusted_load + 0.08 * (params.rpm - 250.0) + batch_noise(i, 2.5);
        sum_power += power;
        timeseries.push(PowerPoint {
            t: format!("{i}s"),
            power_kw: round_to(power, 2),
        });
    }

    let avg_power_kw = if n == 0 { 0.0 } else { sum_power / n as f64 };
    SimulationRun {
        timeseries,
        kpi: SimulationKpi {
            kwh_per_ton: avg_power_kw / params.load_tph.max(1.0),
            avg_power_kw,
            load_tph: params.load_tph,
        },
    }
}
