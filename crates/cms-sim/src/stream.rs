//! ---
//! cms_section: "11-simulation"
//! cms_subsection: "module"
//! cms_type: "source"
//! cms_scope: "code"
//! cms_description: "Timer-driven telemetry subscriptions."
//! cms_version: "v0.1.0"
//! cms_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, Stream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::frames::{MachineTarget, TelemetrySample};
use crate::generator::TelemetryGenerator;

const DEFAULT_BUFFER: usize = 8;

/// Parameters shared by every subscription of a service.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub plant_id: String,
    pub cadence: Duration,
    /// Samples queued between producer and consumer before the producer waits.
    pub buffer: usize,
}

impl StreamSettings {
    pub fn new(plant_id: impl Into<String>, cadence: Duration) -> Self {
        Self {
            plant_id: plant_id.into(),
            cadence,
            buffer: DEFAULT_BUFFER,
        }
    }
}

/// One live telemetry feed.
///
/// Owns a producer task with its own timer and tick counter. Cancelling or
/// dropping the subscription stops that task before its next emission.
#[derive(Debug)]
pub struct Subscription {
    machine_id: String,
    rx: mpsc::Receiver<TelemetrySample>,
    cancel: watch::Sender<bool>,
    emitted: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

/// Start a feed for `target`. Must be called inside a tokio runtime.
pub fn subscribe(settings: &StreamSettings, target: MachineTarget) -> Subscription {
    let machine_id = target.id().to_owned();
    let generator = TelemetryGenerator::new(settings.plant_id.clone(), target);
    let (tx, rx) = mpsc::channel(settings.buffer.max(1));
    let (cancel, cancel_rx) = watch::channel(false);
    let emitted = Arc::new(AtomicU64::new(0));

    let task = tokio::spawn(produce(
        generator,
        settings.cadence,
        tx,
        cancel_rx,
        emitted.clone(),
    ));
    debug!(machine_id = %machine_id, cadence_ms = settings.cadence.as_millis() as u64, "telemetry subscription started");

    Subscription {
        machine_id,
        rx,
        cancel,
        emitted,
        task,
    }
}

async fn produce(
    mut generator: TelemetryGenerator,
    cadence: Duration,
    tx: mpsc::Sender<TelemetrySample>,
    mut cancel: watch::Receiver<bool>,
    emitted: Arc<AtomicU64>,
) {
    let mut interval = tokio::time::interval(cadence);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            // Err means the subscription was dropped.
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    break;
                }
            }
            _ = interval.tick() => {
                if *cancel.borrow() {
                    break;
                }
                let sample = generator.next_sample(Utc::now());
                tokio::select! {
                    biased;
                    _ = cancel.changed() => break,
                    sent = tx.send(sample) => {
                        if sent.is_err() {
                            break;
                        }
                        emitted.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
        }
    }
    debug!(
        machine_id = %generator.target().id(),
        ticks = generator.tick(),
        "telemetry subscription stopped"
    );
}

impl Subscription {
    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    /// Next sample in tick order, `None` once cancelled.
    pub async fn recv(&mut self) -> Option<TelemetrySample> {
        self.rx.recv().await
    }

    /// Samples handed to the channel so far.
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::SeqCst)
    }

    /// Stop the producer and discard anything still queued.
    pub fn cancel(&mut self) {
        let _ = self.cancel.send(true);
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel and wait for the producer task to exit.
    pub async fn shutdown(mut self) {
        self.cancel();
        let _ = self.task.await;
    }

    /// Adapt into a stream ending when the subscription is cancelled.
    pub fn into_stream(self) -> impl Stream<Item = TelemetrySample> + Send + 'static {
        stream::unfold(self, |mut sub| async move {
            let sample = sub.recv().await?;
            Some((sample, sub))
        })
    }
}
