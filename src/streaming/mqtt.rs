// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! MQTT-backed event channel
//!
//! Publishes and subscriptions use QoS 1 with a persistent session, so the
//! broker redelivers unacknowledged readings after a reconnect.

use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, ConnectionError, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ChannelConfig;
use crate::core::{EventChannel, Message, Subscription};
use crate::error::{Error, Result};

/// Pending client requests before `publish` starts failing
const REQUEST_CAPACITY: usize = 100;

/// Received messages held while no scorer is attached
const INBOUND_CAPACITY: usize = 10_000;

type Inbound = Arc<Mutex<Option<mpsc::Receiver<Message>>>>;

/// Hand a received message to the attached consumer without blocking the
/// event loop. Returns false when the message was dropped.
fn forward(tx: &mpsc::Sender<Message>, message: Message) -> bool {
    match tx.try_send(message) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(message)) => {
            warn!("MQTT inbound buffer full, dropping message on {}", message.topic);
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// MQTT client wrapper implementing [`EventChannel`]
pub struct MqttChannel {
    client: AsyncClient,
    inbound: Inbound,
}

impl MqttChannel {
    /// Create the client and spawn its event loop. Must be called inside a
    /// tokio runtime.
    pub fn connect(config: &ChannelConfig) -> Self {
        let mut options = MqttOptions::new(
            &config.mqtt_client_id,
            &config.mqtt_broker,
            config.mqtt_port,
        );

        options.set_keep_alive(Duration::from_secs(config.mqtt_keep_alive_secs));
        options.set_clean_session(false);

        if let (Some(username), Some(password)) = (&config.mqtt_username, &config.mqtt_password) {
            options.set_credentials(username, password);
        }

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);

        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("MQTT connected");
                    }
                    Ok(Event::Incoming(Packet::Publish(msg))) => {
                        debug!("MQTT received: {:?}", msg.topic);
                        // the receiver waits in `inbound` between consumers, so
                        // messages buffer up to INBOUND_CAPACITY until one attaches
                        forward(
                            &tx,
                            Message {
                                topic: msg.topic.clone(),
                                payload: msg.payload.to_vec(),
                            },
                        );
                    }
                    Ok(_) => {}
                    Err(ConnectionError::RequestsDone) => {
                        debug!("MQTT client dropped, stopping event loop");
                        break;
                    }
                    Err(e) => {
                        warn!("MQTT error: {:?}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });

        info!("MQTT channel initialized for {}:{}", config.mqtt_broker, config.mqtt_port);

        Self {
            client,
            inbound: Arc::new(Mutex::new(Some(rx))),
        }
    }
}

#[async_trait]
impl EventChannel for MqttChannel {
    /// Queue a QoS 1 publish. A full request queue (broker unreachable for
    /// a while) is reported as a failure rather than waited out.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload)
            .map_err(|e| Error::Channel(format!("MQTT publish failed: {}", e)))
    }

    async fn subscribe(&self, topics: &[String]) -> Result<Box<dyn Subscription>> {
        let rx = self
            .inbound
            .lock()
            .take()
            .ok_or_else(|| Error::Channel("MQTT channel already has a consumer".into()))?;

        let subscription = MqttSubscription {
            inbound: self.inbound.clone(),
            rx: Some(rx),
            topics: topics.to_vec(),
        };

        for topic in topics {
            self.client
                .subscribe(topic.as_str(), QoS::AtLeastOnce)
                .await
                .map_err(|e| Error::Channel(format!("MQTT subscribe failed: {}", e)))?;
            info!("Subscribed to MQTT topic: {}", topic);
        }

        Ok(Box::new(subscription))
    }
}

struct MqttSubscription {
    inbound: Inbound,
    rx: Option<mpsc::Receiver<Message>>,
    topics: Vec<String>,
}

#[async_trait]
impl Subscription for MqttSubscription {
    async fn poll(&mut self, timeout: Duration) -> Option<Message> {
        let rx = self.rx.as_mut()?;
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(message)) if self.topics.contains(&message.topic) => return Some(message),
                Ok(Some(message)) => debug!("Ignoring message on unsubscribed topic {}", message.topic),
                Ok(None) => {
                    // event loop is gone; keep the caller's cadence instead of spinning
                    tokio::time::sleep_until(deadline).await;
                    return None;
                }
                Err(_) => return None,
            }
        }
    }

    fn topics(&self) -> &[String] {
        &self.topics
    }
}

impl Drop for MqttSubscription {
    fn drop(&mut self) {
        if let Some(rx) = self.rx.take() {
            *self.inbound.lock() = Some(rx);
        }
    }
}
