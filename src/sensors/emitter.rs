// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Emission loop - drives a [`ReadingSource`] and hands every reading to the
//! channel, the sink and the live fan-out

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::Rng;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{Reading, ReadingSource};
use crate::core::{encode_reading, isolate, EventChannel, PipelineStats};
use crate::db::{off_thread, Sink};
use crate::streaming::{LiveEvent, LiveFanout};

pub struct Emitter<R = StdRng> {
    source: ReadingSource<R>,
    channel: Arc<dyn EventChannel>,
    sink: Arc<dyn Sink>,
    fanout: Arc<LiveFanout>,
    stats: Arc<PipelineStats>,
    tick: Duration,
}

impl<R: Rng + Send + Sync> Emitter<R> {
    pub fn new(
        source: ReadingSource<R>,
        channel: Arc<dyn EventChannel>,
        sink: Arc<dyn Sink>,
        fanout: Arc<LiveFanout>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            source,
            channel,
            sink,
            fanout,
            stats,
            tick: Duration::from_millis(100),
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Publish, persist and broadcast one reading.
    ///
    /// Each destination is attempted once. A failure on one is logged and
    /// does not prevent the others.
    pub async fn emit(&self, reading: &Reading) {
        let published = match encode_reading(reading) {
            Ok(payload) => self.channel.publish(&reading.sensor_type.topic(), payload).await,
            Err(e) => Err(e),
        };
        if let Err(e) = published {
            warn!("Failed to publish {} reading: {}", reading.sensor_type, e);
            self.stats.record_publish_failure();
        }

        let record = *reading;
        if let Err(e) = off_thread(&self.sink, move |sink| sink.append_reading(&record)).await {
            error!("Failed to store {} reading: {}", reading.sensor_type, e);
            self.stats.record_sink_failure();
        }

        self.fanout.broadcast(LiveEvent::reading(reading));
        self.stats.record_emitted();
        debug!("Emitted {}: {}", reading.sensor_type, reading.value);
    }

    /// One emission cycle at monotonic offset `now`
    pub async fn step(&mut self, now: Duration, observed_at: DateTime<Utc>) -> usize {
        let readings = self.source.tick(now, observed_at);
        for reading in &readings {
            self.emit(reading).await;
        }
        readings.len()
    }

    /// Tick until `shutdown` fires. A panicking cycle is logged and the loop
    /// moves on to the next tick.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Reading source started (tick {:?})", self.tick);

        let start = Instant::now();
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let now = start.elapsed();
            if isolate("source", self.step(now, Utc::now())).await.is_none() {
                self.stats.record_iteration_failure();
            }
        }

        info!("Reading source stopped");
    }
}
