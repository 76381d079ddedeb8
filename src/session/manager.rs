use crate::identity::ConnectionId;
use crate::relay::Relay;
use crate::session::protocol::ClientMessage;
use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Drives one WebSocket connection.
///
/// Inbound client messages go to the relay; outbound messages queued by the
/// fanout are written to the socket in order. On exit the relay cleans up
/// the connection's entity and viewport channel.
pub struct SessionHandler {
    connection: ConnectionId,
    relay: Arc<Relay>,
    /// A viewport channel was declared and must be deleted on close
    viewport_declared: bool,
    /// `ID` was requested before the connection had an entity
    identity_pending: bool,
}

impl SessionHandler {
    pub fn new(connection: ConnectionId, relay: Arc<Relay>) -> Self {
        Self {
            connection,
            relay,
            viewport_declared: false,
            identity_pending: false,
        }
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Handle WebSocket connection lifecycle.
    ///
    /// Outbound messages are written by a separate task and keep flowing
    /// while an inbound frame awaits the backend.
    pub async fn handle(mut self, socket: WebSocket, outbound: mpsc::Receiver<String>) {
        info!(connection = %self.connection, "WebSocket connection established");

        let (sink, mut stream) = socket.split();
        let mut writer = tokio::spawn(forward_outbound(sink, outbound));

        loop {
            tokio::select! {
                msg = stream.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = self.handle_text(&text).await {
                                debug!(connection = %self.connection, error = %e, "Ignoring malformed client message");
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!(connection = %self.connection, "WebSocket client disconnected");
                            break;
                        }
                        Some(Ok(_)) => {
                            // Ignore binary, ping and pong messages; axum answers pings
                        }
                        Some(Err(e)) => {
                            warn!(connection = %self.connection, error = %e, "WebSocket error");
                            break;
                        }
                    }
                }

                written = &mut writer => {
                    match written {
                        Ok(Ok(())) => debug!(connection = %self.connection, "Outbound queue closed"),
                        Ok(Err(e)) => warn!(connection = %self.connection, error = %e, "Failed to send message"),
                        Err(e) => error!(connection = %self.connection, error = %e, "Writer task failed"),
                    }
                    break;
                }
            }
        }

        writer.abort();
        self.close().await;
    }

    /// Parse and handle one text frame
    pub async fn handle_text(&mut self, text: &str) -> anyhow::Result<()> {
        let message = ClientMessage::parse(text)?;
        self.handle_message(message).await;
        Ok(())
    }

    pub async fn handle_message(&mut self, message: ClientMessage) {
        match message {
            ClientMessage::Feature(feature) => {
                let bound = self
                    .relay
                    .update_location(self.connection, &feature)
                    .await
                    .is_some();
                if bound && self.identity_pending {
                    self.identity_pending = !self.relay.send_identity(self.connection);
                }
            }
            ClientMessage::Viewport { bounds } => {
                if self.relay.update_viewport(self.connection, bounds).await {
                    self.viewport_declared = true;
                }
            }
            ClientMessage::Message { feature, text } => {
                self.relay
                    .relay_message(self.connection, &feature, &text)
                    .await;
            }
            ClientMessage::Id => {
                self.identity_pending = !self.relay.send_identity(self.connection);
            }
            ClientMessage::Places => self.relay.send_places(self.connection),
            ClientMessage::Unknown => {
                debug!(connection = %self.connection, "Ignoring unknown client message type");
            }
        }
    }

    /// Release everything the connection holds in the backend
    pub async fn close(self) {
        self.relay
            .close(self.connection, self.viewport_declared)
            .await;
        info!(connection = %self.connection, "WebSocket connection closed");
    }
}

/// Write queued messages to `sink` in order until the queue closes.
///
/// Returns the sink's error if a write fails.
pub async fn forward_outbound<S>(mut sink: S, mut outbound: mpsc::Receiver<String>) -> Result<(), S::Error>
where
    S: Sink<Message> + Unpin,
{
    while let Some(text) = outbound.recv().await {
        sink.send(Message::Text(text)).await?;
    }
    Ok(())
}
