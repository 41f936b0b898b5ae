// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! WebSocket server - each connection is a live fan-out observer

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::LiveFanout;
use crate::error::Result;

/// WebSocket server
pub struct WebSocketServer {
    addr: SocketAddr,
    max_clients: usize,
    fanout: Arc<LiveFanout>,
}

impl WebSocketServer {
    pub fn new(addr: SocketAddr, max_clients: usize, fanout: Arc<LiveFanout>) -> Self {
        Self {
            addr,
            max_clients,
            fanout,
        }
    }

    /// Bind and serve until `shutdown` fires; returns the bound address
    pub async fn start(&self, shutdown: CancellationToken) -> Result<SocketAddr> {
        let listener = TcpListener::bind(self.addr).await?;
        let local = listener.local_addr()?;

        info!("WebSocket server listening on ws://{}", local);

        let fanout = self.fanout.clone();
        let max_clients = self.max_clients;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok((stream, addr)) => {
                                if fanout.observer_count() >= max_clients {
                                    warn!("Max clients reached, rejecting connection from {}", addr);
                                    continue;
                                }

                                tokio::spawn(handle_connection(
                                    stream,
                                    addr,
                                    fanout.clone(),
                                    shutdown.clone(),
                                ));
                            }
                            Err(e) => {
                                error!("Accept error: {}", e);
                            }
                        }
                    }
                    _ = shutdown.cancelled() => {
                        info!("WebSocket server shutting down");
                        break;
                    }
                }
            }
        });

        Ok(local)
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    fanout: Arc<LiveFanout>,
    shutdown: CancellationToken,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket handshake failed for {}: {}", addr, e);
            return;
        }
    };

    let mut observer = fanout.register();
    let observer_id = observer.id();
    info!("New WebSocket connection from {} (id: {})", addr, observer_id);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let welcome = serde_json::json!({
        "type": "welcome",
        "client_id": observer_id,
        "server": "SensorWatch",
        "version": env!("CARGO_PKG_VERSION"),
    });

    if let Err(e) = ws_sender.send(Message::Text(welcome.to_string())).await {
        warn!("Failed to send welcome: {}", e);
    }

    loop {
        tokio::select! {
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        debug!("Received from {}: {}", addr, text);

                        let is_ping = serde_json::from_str::<serde_json::Value>(&text)
                            .ok()
                            .and_then(|cmd| cmd.get("type").and_then(|v| v.as_str()).map(|t| t == "ping"))
                            .unwrap_or(false);
                        if is_ping {
                            let pong = serde_json::json!({"type": "pong"});
                            let _ = ws_sender.send(Message::Text(pong.to_string())).await;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket closed by client {}", addr);
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_sender.send(Message::Pong(data)).await;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error from {}: {}", addr, e);
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }

            event = observer.recv() => {
                let Some(event) = event else { break };
                if let Err(e) = ws_sender.send(Message::Text(event.to_json())).await {
                    debug!("Dropping observer {}: {}", addr, e);
                    break;
                }
            }

            _ = shutdown.cancelled() => {
                let _ = ws_sender.send(Message::Close(None)).await;
                break;
            }
        }
    }

    fanout.unregister(observer_id);
    info!("WebSocket client {} disconnected", addr);
}
