//! ---
//! cms_section: "11-simulation"
//! cms_subsection: "module"
//! cms_type: "source"
//! cms_scope: "code"
//! cms_description: "Deterministic plant and machine telemetry generator."
//! cms_version: "v0.1.0"
//! cms_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};

use crate::frames::{round_to, MachineTarget, Metric, TelemetrySample};

/// Fixed operating point a generator oscillates around.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    pub load_tph: f64,
    pub rpm: f64,
    pub vibration: f64,
    pub temperature_c: f64,
    pub ore_grade: f64,
    pub moisture_pct: f64,
}

impl Baseline {
    pub const VIBRATION: f64 = 4.8;
    pub const TEMPERATURE_C: f64 = 78.0;
    pub const ORE_GRADE: f64 = 0.52;
    pub const MOISTURE_PCT: f64 = 3.1;
    pub const MACHINE_RPM: f64 = 315.0;

    pub fn for_target(target: &MachineTarget) -> Self {
        let (load_tph, rpm) = if target.is_aggregate() {
            (220.0, 0.0)
        } else {
            (55.0, Self::MACHINE_RPM)
        };
        Self {
            load_tph,
            rpm,
            vibration: Self::VIBRATION,
            temperature_c: Self::TEMPERATURE_C,
            ore_grade: Self::ORE_GRADE,
            moisture_pct: Self::MOISTURE_PCT,
        }
    }
}

/// Trigonometric pseudo-noise for tick `t`. Identical ticks give identical values.
pub fn stream_noise(t: u64, amplitude: f64) -> f64 {
    let t = t as f64;
    ((t / 7.0).sin() + (t / 5.0).cos()) * amplitude
}

/// Produces the sample series of one subscription.
///
/// Holds nothing but the target, its baseline and a tick counter, so two
/// generators for the same target emit identical metric sequences.
#[derive(Debug, Clone)]
pub struct TelemetryGenerator {
    plant_id: String,
    target: MachineTarget,
    baseline: Baseline,
    tick: u64,
}

impl TelemetryGenerator {
    pub fn new(plant_id: impl Into<String>, target: MachineTarget) -> Self {
        let baseline = Baseline::for_target(&target);
        Self {
            plant_id: plant_id.into(),
            target,
            baseline,
            tick: 0,
        }
    }

    pub fn target(&self) -> &MachineTarget {
        &self.target
    }

    pub fn baseline(&self) -> &Baseline {
        &self.baseline
    }

    /// Number of samples produced so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Advance one tick and compute its metrics.
    pub fn next_metric(&mut self) -> Metric {
        self.tick += 1;
        let t = self.tick;
        let base = &self.baseline;

        let load = base.load_tph + stream_noise(t, 3.0);
        let power = if self.target.is_aggregate() {
            480.0 + stream_noise(t, 15.0)
        } else {
            120.0 + 0.8 * (load - 55.0) + stream_noise(t, 4.0)
        };
        let rpm = if base.rpm != 0.0 {
            // Half rounds toward +inf.
            base.rpm + (stream_noise(t, 2.0) + 0.5).floor()
        } else {
            0.0
        };

        Metric {
            power_kw: round_to(power, 2),
            load_tph: round_to(load, 2),
            rpm,
            vibration: round_to(base.vibration + stream_noise(t, 0.2).abs(), 2),
            temperature_c: round_to(base.temperature_c + stream_noise(t, 0.4).abs(), 1),
            ore_grade: base.ore_grade,
            moisture_pct: base.moisture_pct,
        }
    }

    /// Advance one tick and wrap the metrics into a sample stamped `timestamp`.
    pub fn next_sample(&mut self, timestamp: DateTime<Utc>) -> TelemetrySample {
        let metric = self.next_metric();
        TelemetrySample {
            timestamp,
            plant_id: self.plant_id.clone(),
            machine_id: self.target.id().to_owned(),
            metric,
        }
    }
}
