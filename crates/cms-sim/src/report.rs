//! ---
//! cms_section: "11-simulation"
//! cms_subsection: "module"
//! cms_type: "source"
//! cms_scope: "code"
//! cms_description: "Energy report rows and their CSV export."
//! cms_version: "v0.1.0"
//! cms_owner: "tbd"
//! ---
use chrono::{DateTime, Duration, Utc};
use serde::{Serialize, Serializer};

use crate::frames::rfc3339_millis;
use crate::generator::TelemetryGenerator;

pub const DEFAULT_REPORT_ROWS: usize = 60;
pub const MAX_REPORT_ROWS: usize = 1440;

/// Download name offered to the browser.
pub const REPORT_FILE_NAME: &str = "energy_report.csv";

/// One line of the energy report. Field order is the CSV column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnergyReportRow {
    #[serde(serialize_with = "rfc3339_millis::serialize")]
    pub timestamp: DateTime<Utc>,
    pub power_kw: f64,
    pub load_tph: f64,
    #[serde(serialize_with = "two_decimals")]
    pub kwh_per_ton: f64,
}

fn two_decimals<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{value:.2}"))
}

/// Clamp a requested row count into `1..=MAX_REPORT_ROWS`.
pub fn report_rows(requested: Option<usize>) -> usize {
    requested
        .unwrap_or(DEFAULT_REPORT_ROWS)
        .clamp(1, MAX_REPORT_ROWS)
}

/// Draw `rows` samples from `generator`, the last one stamped `end` and each
/// earlier one `step` before its successor.
pub fn energy_report(
    generator: &mut TelemetryGenerator,
    rows: usize,
    end: DateTime<Utc>,
    step: Duration,
) -> Vec<EnergyReportRow> {
    (0..rows)
        .map(|i| {
            let back = i32::try_from(rows - 1 - i).unwrap_or(i32::MAX);
            let sample = generator.next_sample(end - step * back);
            let metric = sample.metric;
            EnergyReportRow {
                timestamp: sample.timestamp,
                power_kw: metric.power_kw,
                load_tph: metric.load_tph,
                kwh_per_ton: metric.power_kw / metric.load_tph.max(1.0),
            }
        })
        .collect()
}

/// Render rows as `\n`-terminated CSV with a header line.
pub fn render_csv(rows: &[EnergyReportRow]) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    writer
        .into_inner()
        .map_err(|err| csv::Error::from(err.into_error()))
}
