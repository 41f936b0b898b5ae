// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Reading source - decides, tick by tick, which sensor types emit

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Uniform;

use super::{Reading, SensorType};
use crate::config::SensorsConfig;

/// Last emission instant per sensor type.
///
/// Instants are offsets on the source's monotonic clock. A sensor type that
/// never emitted is always due.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThrottleState {
    last_emit_at: [Option<Duration>; SensorType::COUNT],
}

impl ThrottleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every sensor type last emitted at `at`
    pub fn starting_at(at: Duration) -> Self {
        Self {
            last_emit_at: [Some(at); SensorType::COUNT],
        }
    }

    pub fn last_emit_at(&self, sensor: SensorType) -> Option<Duration> {
        self.last_emit_at[sensor.index()]
    }

    /// Whether `interval` has passed since the last emission of `sensor`
    pub fn interval_elapsed(&self, sensor: SensorType, now: Duration, interval: Duration) -> bool {
        match self.last_emit_at(sensor) {
            None => true,
            Some(last) => now.saturating_sub(last) >= interval,
        }
    }

    fn record_emit(&mut self, sensor: SensorType, now: Duration) {
        self.last_emit_at[sensor.index()] = Some(now);
    }
}

#[derive(Debug, Clone)]
struct Schedule {
    interval: Duration,
    values: Uniform<f64>,
    spike_probability: f64,
}

/// Synthetic reading generator with interval cadence and random spikes.
///
/// `tick` is synchronous and clock-injected; the async emission loop lives in
/// [`super::Emitter`].
pub struct ReadingSource<R = StdRng> {
    schedules: [Schedule; SensorType::COUNT],
    throttle: ThrottleState,
    rng: R,
}

impl ReadingSource<StdRng> {
    pub fn from_config(sensors: &SensorsConfig) -> Self {
        Self::with_rng(sensors, StdRng::from_entropy())
    }
}

impl<R: Rng> ReadingSource<R> {
    pub fn with_rng(sensors: &SensorsConfig, rng: R) -> Self {
        let schedules = SensorType::ALL.map(|sensor| {
            let settings = sensors.get(sensor);
            Schedule {
                interval: settings.interval(),
                values: Uniform::new_inclusive(settings.min, settings.max),
                spike_probability: settings.spike_probability.clamp(0.0, 1.0),
            }
        });

        Self {
            schedules,
            throttle: ThrottleState::new(),
            rng,
        }
    }

    /// Replace the throttle state, e.g. to resume from a known instant
    pub fn with_throttle(mut self, throttle: ThrottleState) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn throttle(&self) -> &ThrottleState {
        &self.throttle
    }

    /// Run one emission cycle.
    ///
    /// A sensor type emits when its interval has elapsed or its spike trial
    /// fires. The spike trial is drawn every tick for every sensor type.
    pub fn tick(&mut self, now: Duration, observed_at: DateTime<Utc>) -> Vec<Reading> {
        let mut readings = Vec::new();

        for sensor in SensorType::ALL {
            let schedule = &self.schedules[sensor.index()];
            let due = self.throttle.interval_elapsed(sensor, now, schedule.interval);
            let spike = self.rng.gen_bool(schedule.spike_probability);

            if due || spike {
                let value = round2(self.rng.sample(schedule.values));
                self.throttle.record_emit(sensor, now);
                readings.push(Reading::new(sensor, value, observed_at));
            }
        }

        readings
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
