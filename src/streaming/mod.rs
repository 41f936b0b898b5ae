//! Streaming module - live fan-out, WebSocket observers and the MQTT channel

mod fanout;
mod mqtt;
mod websocket;

pub use fanout::{LiveEvent, LiveFanout, LivePayload, Observer};
pub use mqtt::MqttChannel;
pub use websocket::WebSocketServer;
