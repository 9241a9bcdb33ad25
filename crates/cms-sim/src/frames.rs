//! ---
//! cms_section: "11-simulation"
//! cms_subsection: "module"
//! cms_type: "source"
//! cms_scope: "code"
//! cms_description: "Telemetry sample types and machine target resolution."
//! cms_version: "v0.1.0"
//! cms_owner: "tbd"
//! ---
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Machine identifier standing for the whole plant.
pub const PLANT_AGGREGATE: &str = "plant_aggregate";

const MAX_MACHINE_ID_LEN: usize = 64;

/// Which series a generator produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MachineTarget {
    PlantAggregate,
    Machine(String),
}

impl MachineTarget {
    /// Resolve a raw identifier. Missing, blank or malformed ids fall back to the aggregate.
    pub fn resolve(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(id) if id != PLANT_AGGREGATE && is_well_formed(id) => {
                MachineTarget::Machine(id.to_owned())
            }
            _ => MachineTarget::PlantAggregate,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            MachineTarget::PlantAggregate => PLANT_AGGREGATE,
            MachineTarget::Machine(id) => id,
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, MachineTarget::PlantAggregate)
    }
}

fn is_well_formed(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_MACHINE_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Sensor readings carried by one sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub power_kw: f64,
    pub load_tph: f64,
    pub rpm: f64,
    pub vibration: f64,
    pub temperature_c: f64,
    pub ore_grade: f64,
    pub moisture_pct: f64,
}

/// Synthetic telemetry emitted on every generator tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    #[serde(with = "rfc3339_millis")]
    pub timestamp: DateTime<Utc>,
    pub plant_id: String,
    pub machine_id: String,
    pub metric: Metric,
}

/// Round half away from zero to `decimals` places.
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub(crate) mod rfc3339_millis {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
