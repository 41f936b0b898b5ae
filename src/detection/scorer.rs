// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Anomaly scorer - consumes readings from the event channel and records the
//! anomalous ones

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::ModelRegistry;
use crate::core::{decode_reading, isolate, Message, PipelineStats, Subscription};
use crate::db::{off_thread, Sink};
use crate::error::Error;
use crate::sensors::{AnomalyRecord, Reading};
use crate::streaming::{LiveEvent, LiveFanout};

/// Outcome of handling one message
#[derive(Debug)]
pub enum Handled {
    /// The message was not a valid reading
    Discarded(Error),
    Normal(Reading),
    Anomalous(AnomalyRecord),
}

/// Scores readings against the per-sensor-type models.
///
/// Clones share the registry, sink and fan-out, so one scorer can be cloned
/// into a task per topic partition.
#[derive(Clone)]
pub struct AnomalyScorer {
    registry: Arc<ModelRegistry>,
    sink: Arc<dyn Sink>,
    fanout: Arc<LiveFanout>,
    stats: Arc<PipelineStats>,
    poll_timeout: Duration,
}

impl AnomalyScorer {
    pub fn new(
        registry: Arc<ModelRegistry>,
        sink: Arc<dyn Sink>,
        fanout: Arc<LiveFanout>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            registry,
            sink,
            fanout,
            stats,
            poll_timeout: Duration::from_secs(1),
        }
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    /// Classify one message and apply the side effects of an anomaly.
    ///
    /// Normal readings cause no writes; the source already stored and
    /// broadcast them when they were emitted.
    pub async fn handle(&self, message: &Message) -> Handled {
        let reading = match decode_reading(message) {
            Ok(reading) => reading,
            Err(e) => {
                debug!("Discarding message on {}: {}", message.topic, e);
                self.stats.record_discarded();
                return Handled::Discarded(e);
            }
        };

        self.stats.record_scored();

        if !self.registry.score(reading.sensor_type, reading.value).is_anomalous() {
            return Handled::Normal(reading);
        }

        let anomaly = AnomalyRecord::from(&reading);
        warn!("Anomaly detected in {}: {}", anomaly.sensor_type, anomaly.value);
        self.stats.record_anomaly();

        let record = anomaly;
        if let Err(e) = off_thread(&self.sink, move |sink| sink.append_anomaly(&record)).await {
            error!("Failed to store {} anomaly: {}", anomaly.sensor_type, e);
            self.stats.record_sink_failure();
        }
        self.fanout.broadcast(LiveEvent::anomaly(&anomaly));

        Handled::Anomalous(anomaly)
    }

    /// Poll loop. Messages are handled one at a time, in delivery order,
    /// until `shutdown` fires.
    pub async fn run(self, mut subscription: Box<dyn Subscription>, shutdown: CancellationToken) {
        let topics = subscription.topics().join(",");
        info!("Anomaly scorer consuming [{}]", topics);

        loop {
            let message = tokio::select! {
                _ = shutdown.cancelled() => break,
                message = subscription.poll(self.poll_timeout) => message,
            };

            let Some(message) = message else { continue };

            if isolate("scorer", self.handle(&message)).await.is_none() {
                self.stats.record_iteration_failure();
            }
        }

        info!("Anomaly scorer [{}] stopped", topics);
    }
}
