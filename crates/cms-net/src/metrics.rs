//! ---
//! cms_section: "05-networking-external-interfaces"
//! cms_subsection: "module"
//! cms_type: "source"
//! cms_scope: "code"
//! cms_description: "Prometheus instruments for the API surface."
//! cms_version: "v0.0.0-prealpha"
//! cms_owner: "tbd"
//! ---
use prometheus::{IntCounter, IntGauge, Registry};

/// Stream and simulation counters.
#[derive(Clone)]
pub struct ApiMetrics {
    streams_active: IntGauge,
    samples_total: IntCounter,
    simulation_runs_total: IntCounter,
}

impl ApiMetrics {
    pub fn new(registry: &Registry) -> anyhow::Result<Self> {
        let streams_active =
            IntGauge::new("telemetry_streams_active", "Open telemetry stream subscriptions")?;
        let samples_total =
            IntCounter::new("telemetry_samples_total", "Telemetry samples pushed to clients")?;
        let simulation_runs_total =
            IntCounter::new("simulation_runs_total", "Batch simulations computed")?;

        registry.register(Box::new(streams_active.clone()))?;
        registry.register(Box::new(samples_total.clone()))?;
        registry.register(Box::new(simulation_runs_total.clone()))?;

        Ok(Self {
            streams_active,
            samples_total,
            simulation_runs_total,
        })
    }

    /// Count an open stream until the returned guard is dropped.
    pub fn stream_opened(&self) -> StreamGauge {
        self.streams_active.inc();
        StreamGauge {
            gauge: self.streams_active.clone(),
        }
    }

    pub fn streams_active(&self) -> i64 {
        self.streams_active.get()
    }

    pub fn inc_sample(&self) {
        self.samples_total.inc();
    }

    pub fn inc_simulation(&self) {
        self.simulation_runs_total.inc();
    }
}

pub struct StreamGauge {
    gauge: IntGauge,
}

impl Drop for StreamGauge {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}
