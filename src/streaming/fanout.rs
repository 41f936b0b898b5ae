// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Live fan-out - best-effort push of readings and anomalies to observers

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;
use uuid::Uuid;

use crate::sensors::{AnomalyRecord, Reading, SensorType};

/// Payload of a live update
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LivePayload {
    #[serde(rename = "type")]
    pub sensor_type: SensorType,
    pub value: f64,
}

/// Live update event, serialized as `{"event": "...", "data": {type, value}}`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum LiveEvent {
    SensorData(LivePayload),
    AnomalyData(LivePayload),
}

impl LiveEvent {
    pub fn reading(reading: &Reading) -> Self {
        LiveEvent::SensorData(LivePayload {
            sensor_type: reading.sensor_type,
            value: reading.value,
        })
    }

    pub fn anomaly(anomaly: &AnomalyRecord) -> Self {
        LiveEvent::AnomalyData(LivePayload {
            sensor_type: anomaly.sensor_type,
            value: anomaly.value,
        })
    }

    /// Event name on the live update channel
    pub fn name(&self) -> &'static str {
        match self {
            LiveEvent::SensorData(_) => "sensor_data",
            LiveEvent::AnomalyData(_) => "anomaly_data",
        }
    }

    pub fn payload(&self) -> &LivePayload {
        match self {
            LiveEvent::SensorData(p) | LiveEvent::AnomalyData(p) => p,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::json!({
            "event": self.name(),
            "data": self.payload(),
        })
        .to_string()
    }
}

/// A connected observer's end of the fan-out
pub struct Observer {
    id: Uuid,
    rx: mpsc::Receiver<LiveEvent>,
}

impl Observer {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next event, or `None` once the observer was removed
    pub async fn recv(&mut self) -> Option<LiveEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<LiveEvent> {
        self.rx.try_recv().ok()
    }
}

/// Dynamic set of observers.
///
/// `broadcast` never waits: an observer whose queue is full misses the
/// event, an observer that went away is dropped from the set.
pub struct LiveFanout {
    observers: RwLock<HashMap<Uuid, mpsc::Sender<LiveEvent>>>,
    buffer: usize,
}

impl LiveFanout {
    pub fn new(buffer: usize) -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            buffer: buffer.max(1),
        }
    }

    pub fn register(&self) -> Observer {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = Uuid::new_v4();
        self.observers.write().insert(id, tx);
        debug!("Observer {} registered", id);
        Observer { id, rx }
    }

    pub fn unregister(&self, id: Uuid) {
        if self.observers.write().remove(&id).is_some() {
            debug!("Observer {} unregistered", id);
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    /// Deliver to every connected observer; returns how many received it
    pub fn broadcast(&self, event: LiveEvent) -> usize {
        let mut delivered = 0;
        let mut gone = Vec::new();

        {
            let observers = self.observers.read();
            for (id, tx) in observers.iter() {
                match tx.try_send(event) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        debug!("Observer {} is behind, skipping {}", id, event.name());
                    }
                    Err(TrySendError::Closed(_)) => gone.push(*id),
                }
            }
        }

        if !gone.is_empty() {
            let mut observers = self.observers.write();
            for id in gone {
                observers.remove(&id);
            }
        }

        delivered
    }
}
