//! Core module - event channel, loop supervision and pipeline orchestration

mod engine;
mod event_bus;
mod supervisor;

pub use engine::{Pipeline, PipelineBuilder};
pub use event_bus::{
    decode_reading, encode_reading, sensor_topics, EventChannel, MemoryChannel, Message,
    Subscription,
};
pub use supervisor::isolate;

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Pipeline-wide counters, shared by the running loops
#[derive(Debug, Default)]
pub struct PipelineStats {
    readings_emitted: AtomicU64,
    publish_failures: AtomicU64,
    sink_failures: AtomicU64,
    messages_scored: AtomicU64,
    messages_discarded: AtomicU64,
    anomalies_detected: AtomicU64,
    iterations_failed: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_emitted(&self) {
        self.readings_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sink_failure(&self) {
        self.sink_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scored(&self) {
        self.messages_scored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discarded(&self) {
        self.messages_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_anomaly(&self) {
        self.anomalies_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_iteration_failure(&self) {
        self.iterations_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            readings_emitted: self.readings_emitted.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            messages_scored: self.messages_scored.load(Ordering::Relaxed),
            messages_discarded: self.messages_discarded.load(Ordering::Relaxed),
            anomalies_detected: self.anomalies_detected.load(Ordering::Relaxed),
            iterations_failed: self.iterations_failed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub readings_emitted: u64,
    pub publish_failures: u64,
    pub sink_failures: u64,
    pub messages_scored: u64,
    pub messages_discarded: u64,
    pub anomalies_detected: u64,
    pub iterations_failed: u64,
}
