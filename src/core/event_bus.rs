// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Event channel - per-sensor-type topics between the source and the scorer
//!
//! Delivery is at-least-once. A subscription acknowledges a message by
//! polling for the next one; a message handed out but not acknowledged when
//! the subscription is dropped is delivered again to the next subscriber.

use std::collections::{HashMap, VecDeque};
use std::future::poll_fn;
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::sensors::{Reading, SensorType};

/// A message as carried by a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Publish side of the event channel
#[async_trait]
pub trait EventChannel: Send + Sync {
    /// Enqueue a payload on a topic. One attempt, no retry.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;

    /// Become the consumer of `topics`
    async fn subscribe(&self, topics: &[String]) -> Result<Box<dyn Subscription>>;
}

/// Consume side of the event channel
#[async_trait]
pub trait Subscription: Send {
    /// Wait at most `timeout` for the next message
    async fn poll(&mut self, timeout: Duration) -> Option<Message>;

    fn topics(&self) -> &[String];
}

/// Topic names for every sensor type
pub fn sensor_topics() -> Vec<String> {
    SensorType::ALL.iter().map(|s| s.topic()).collect()
}

#[derive(Debug, Serialize, Deserialize)]
struct WireReading {
    sensor_type: SensorType,
    value: f64,
    timestamp: f64,
}

/// Serialize a reading as `{sensor_type, value, timestamp}` JSON, with the
/// timestamp in float unix seconds
pub fn encode_reading(reading: &Reading) -> Result<Vec<u8>> {
    let wire = WireReading {
        sensor_type: reading.sensor_type,
        value: reading.value,
        timestamp: reading.observed_at.timestamp_micros() as f64 / 1e6,
    };
    serde_json::to_vec(&wire).map_err(|e| Error::Channel(format!("encode failed: {}", e)))
}

/// Parse a message back into a reading.
///
/// The body must name the same sensor type as the topic it arrived on.
pub fn decode_reading(message: &Message) -> Result<Reading> {
    let wire: WireReading = serde_json::from_slice(&message.payload)?;

    match SensorType::from_topic(&message.topic) {
        Some(sensor) if sensor == wire.sensor_type => {}
        _ => {
            return Err(Error::Decode(format!(
                "{} reading arrived on topic '{}'",
                wire.sensor_type, message.topic
            )))
        }
    }

    if !wire.value.is_finite() {
        return Err(Error::Decode(format!("non-finite value {}", wire.value)));
    }

    let observed_at = timestamp_from_secs(wire.timestamp)
        .ok_or_else(|| Error::Decode(format!("invalid timestamp {}", wire.timestamp)))?;

    Ok(Reading::new(wire.sensor_type, wire.value, observed_at))
}

fn timestamp_from_secs(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let micros = (secs * 1e6).round();
    if micros.abs() >= i64::MAX as f64 {
        return None;
    }
    Utc.timestamp_micros(micros as i64).single()
}

struct TopicQueue {
    tx: mpsc::UnboundedSender<Message>,
    /// Taken while a subscription owns the topic
    rx: Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
    redeliver: Mutex<VecDeque<Message>>,
}

type Topics = Arc<HashMap<String, TopicQueue>>;

/// In-process event channel.
///
/// Topics are fixed at construction. Queues are unbounded so publishing
/// never blocks the source, and messages published before anyone subscribes
/// wait in the queue.
#[derive(Clone)]
pub struct MemoryChannel {
    topics: Topics,
}

impl MemoryChannel {
    pub fn new<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let topics = topics
            .into_iter()
            .map(|name| {
                let (tx, rx) = mpsc::unbounded_channel();
                let queue = TopicQueue {
                    tx,
                    rx: Mutex::new(Some(rx)),
                    redeliver: Mutex::new(VecDeque::new()),
                };
                (name.into(), queue)
            })
            .collect();

        Self {
            topics: Arc::new(topics),
        }
    }

    /// One topic per sensor type
    pub fn for_sensors() -> Self {
        Self::new(sensor_topics())
    }

    fn queue(&self, topic: &str) -> Result<&TopicQueue> {
        self.topics
            .get(topic)
            .ok_or_else(|| Error::Channel(format!("unknown topic '{}'", topic)))
    }
}

#[async_trait]
impl EventChannel for MemoryChannel {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let queue = self.queue(topic)?;
        queue
            .tx
            .send(Message {
                topic: topic.to_string(),
                payload,
            })
            .map_err(|_| Error::Channel(format!("topic '{}' is closed", topic)))
    }

    async fn subscribe(&self, topics: &[String]) -> Result<Box<dyn Subscription>> {
        let mut parts = Vec::with_capacity(topics.len());

        for topic in topics {
            let taken = self.queue(topic).map(|queue| queue.rx.lock().take());
            match taken {
                Ok(Some(rx)) => parts.push(Part {
                    topic: topic.clone(),
                    rx,
                }),
                outcome => {
                    // hand back whatever was taken before failing
                    drop(MemorySubscription::new(self.topics.clone(), parts));
                    return Err(match outcome {
                        Err(e) => e,
                        _ => Error::Channel(format!("topic '{}' already has a consumer", topic)),
                    });
                }
            }
        }

        debug!("Subscribed to {:?}", topics);
        Ok(Box::new(MemorySubscription::new(self.topics.clone(), parts)))
    }
}

struct Part {
    topic: String,
    rx: mpsc::UnboundedReceiver<Message>,
}

struct MemorySubscription {
    topics: Topics,
    names: Vec<String>,
    parts: Vec<Part>,
    next: usize,
    in_flight: Option<Message>,
}

impl MemorySubscription {
    fn new(topics: Topics, parts: Vec<Part>) -> Self {
        Self {
            names: parts.iter().map(|p| p.topic.clone()).collect(),
            topics,
            parts,
            next: 0,
            in_flight: None,
        }
    }

    fn take_redelivery(&self) -> Option<Message> {
        self.names
            .iter()
            .filter_map(|name| self.topics.get(name))
            .find_map(|queue| queue.redeliver.lock().pop_front())
    }
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn poll(&mut self, timeout: Duration) -> Option<Message> {
        // polling acknowledges the previous message
        self.in_flight = None;

        if let Some(message) = self.take_redelivery() {
            self.in_flight = Some(message.clone());
            return Some(message);
        }

        let count = self.parts.len();
        let start = self.next;
        let parts = &mut self.parts;

        // round-robin across topics so one busy topic cannot starve the rest
        let next = poll_fn(|cx| {
            for offset in 0..count {
                let idx = (start + offset) % count;
                if let Poll::Ready(Some(message)) = parts[idx].rx.poll_recv(cx) {
                    return Poll::Ready((idx, message));
                }
            }
            Poll::Pending
        });

        let received = tokio::time::timeout(timeout, next).await;
        match received {
            Ok((idx, message)) => {
                self.next = (idx + 1) % count;
                self.in_flight = Some(message.clone());
                Some(message)
            }
            Err(_) => None,
        }
    }

    fn topics(&self) -> &[String] {
        &self.names
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        if let Some(message) = self.in_flight.take() {
            if let Some(queue) = self.topics.get(&message.topic) {
                queue.redeliver.lock().push_front(message);
            }
        }
        for part in self.parts.drain(..) {
            if let Some(queue) = self.topics.get(&part.topic) {
                *queue.rx.lock() = Some(part.rx);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLL: Duration = Duration::from_millis(50);

    fn message(sensor: SensorType, value: f64) -> (String, Vec<u8>) {
        let reading = Reading::now(sensor, value);
        (sensor.topic(), encode_reading(&reading).unwrap())
    }

    #[test]
    fn test_codec_roundtrip_keeps_timestamp() {
        let reading = Reading::now(SensorType::Pressure, 23.45);
        let msg = Message {
            topic: SensorType::Pressure.topic(),
            payload: encode_reading(&reading).unwrap(),
        };
        assert_eq!(decode_reading(&msg).unwrap(), reading);
    }

    #[test]
    fn test_decode_rejects_malformed() {
        let topic = SensorType::Temperature.topic();
        let bad = [
            b"not json".to_vec(),
            br#"{"sensor_type":"temperature","value":"hot","timestamp":1.0}"#.to_vec(),
            br#"{"sensor_type":"wind","value":1.0,"timestamp":1.0}"#.to_vec(),
            br#"{"sensor_type":"humidity","value":1.0,"timestamp":1.0}"#.to_vec(),
            br#"{"sensor_type":"temperature","value":1.0}"#.to_vec(),
        ];
        for payload in bad {
            let msg = Message {
                topic: topic.clone(),
                payload,
            };
            assert!(matches!(decode_reading(&msg), Err(Error::Decode(_))));
        }
    }

    #[tokio::test]
    async fn test_publish_before_subscribe_is_kept_in_order() {
        let channel = MemoryChannel::for_sensors();
        for value in [1.0, 2.0, 3.0] {
            let (topic, payload) = message(SensorType::Humidity, value);
            channel.publish(&topic, payload).await.unwrap();
        }

        let mut sub = channel.subscribe(&sensor_topics()).await.unwrap();
        let mut values = Vec::new();
        while let Some(msg) = sub.poll(POLL).await {
            values.push(decode_reading(&msg).unwrap().value);
        }
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn test_poll_times_out_when_idle() {
        let channel = MemoryChannel::for_sensors();
        let mut sub = channel.subscribe(&sensor_topics()).await.unwrap();
        assert!(sub.poll(POLL).await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_topic_and_exclusive_consumer() {
        let channel = MemoryChannel::for_sensors();
        assert!(channel.publish("sensor_wind", vec![]).await.is_err());

        let topics = vec![SensorType::Temperature.topic()];
        let first = channel.subscribe(&topics).await.unwrap();
        assert!(channel.subscribe(&topics).await.is_err());

        // a failed multi-topic subscribe must not leak the topics it took
        let mixed = vec![SensorType::Pressure.topic(), SensorType::Temperature.topic()];
        assert!(channel.subscribe(&mixed).await.is_err());
        let pressure = channel.subscribe(&[SensorType::Pressure.topic()]).await;
        assert!(pressure.is_ok());

        drop(first);
        assert!(channel.subscribe(&topics).await.is_ok());
    }

    #[tokio::test]
    async fn test_unacknowledged_message_is_redelivered() {
        let channel = MemoryChannel::for_sensors();
        for value in [10.0, 20.0] {
            let (topic, payload) = message(SensorType::Temperature, value);
            channel.publish(&topic, payload).await.unwrap();
        }

        let topics = vec![SensorType::Temperature.topic()];
        let mut sub = channel.subscribe(&topics).await.unwrap();
        let first = sub.poll(POLL).await.unwrap();
        drop(sub);

        let mut sub = channel.subscribe(&topics).await.unwrap();
        let again = sub.poll(POLL).await.unwrap();
        assert_eq!(again, first);
        let second = sub.poll(POLL).await.unwrap();
        assert_eq!(decode_reading(&second).unwrap().value, 20.0);
        assert!(sub.poll(POLL).await.is_none());
    }

    #[tokio::test]
    async fn test_topics_are_interleaved() {
        let channel = MemoryChannel::for_sensors();
        for _ in 0..3 {
            for sensor in SensorType::ALL {
                let (topic, payload) = message(sensor, 1.0);
                channel.publish(&topic, payload).await.unwrap();
            }
        }

        let mut sub = channel.subscribe(&sensor_topics()).await.unwrap();
        let mut seen = Vec::new();
        for _ in 0..SensorType::COUNT {
            let msg = sub.poll(POLL).await.unwrap();
            seen.push(SensorType::from_topic(&msg.topic).unwrap());
        }
        seen.sort();
        assert_eq!(seen, SensorType::ALL.to_vec());
    }
}
