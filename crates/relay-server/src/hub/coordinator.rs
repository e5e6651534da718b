//! Broadcast coordinator: the counter, the reset rule, and fan-out.
//!
//! A `Coordinator` is plain single-owner state. Serialization comes from the
//! actor in [`super::actor`], which is the only place one is mutated.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, info, warn};

use super::registry::ConnectionRegistry;
use crate::errors::HubError;
use crate::metrics::{
    BROADCAST_DROPS_TOTAL, COUNTER_RESETS_TOTAL, DECODE_ERRORS_TOTAL, FRAMES_SENT_TOTAL,
    MESSAGES_RECEIVED_TOTAL,
};
use crate::websocket::connection::{ClientConnection, ConnectionId};

/// Raw frame text that resets the counter.
pub const RESET_SIGNAL: &str = "clean";

/// WebSocket normal-closure status code.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Decode an inbound frame as a batch of message strings.
pub fn decode_batch(raw: &str) -> Result<Vec<String>, HubError> {
    Ok(serde_json::from_str(raw)?)
}

/// Outbound wire format: `"<counter>,<message>"`.
pub fn format_frame(counter: u64, message: &str) -> String {
    format!("{counter},{message}")
}

/// What handling one inbound frame did.
#[derive(Debug)]
pub struct MessageReport {
    /// Frames queued across all recipients.
    pub frames_sent: usize,
    /// Set when the frame was not a JSON array of strings.
    pub decode_error: Option<HubError>,
    /// Whether the frame reset the counter.
    pub reset: bool,
}

/// State for one logical hub: registry, counter, close policy.
#[derive(Debug)]
pub struct Coordinator {
    name: String,
    registry: ConnectionRegistry,
    counter: u64,
    close_reason: String,
}

impl Coordinator {
    /// Fresh coordinator with the counter at 0.
    pub fn new(name: impl Into<String>, close_reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registry: ConnectionRegistry::new(),
            counter: 0,
            close_reason: close_reason.into(),
        }
    }

    #[cfg(test)]
    fn with_counter(mut self, value: u64) -> Self {
        self.counter = value;
        self
    }

    /// Logical hub name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current counter value.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Registered connections.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Register a freshly upgraded connection and mark it open.
    ///
    /// A connection whose transport already failed is not registered; its
    /// close event will follow and find nothing to remove.
    pub fn on_connection_opened(&mut self, connection: Arc<ClientConnection>) {
        let id = connection.id();
        if !connection.mark_open() {
            debug!(hub = %self.name, conn_id = %id, "connection closed before registration");
            return;
        }
        if self.registry.register(connection) {
            info!(
                hub = %self.name,
                conn_id = %id,
                connections = self.registry.len(),
                "connection registered"
            );
        }
    }

    /// Handle one inbound frame from `from`.
    ///
    /// A decodable batch is broadcast first; then, independently of decoding,
    /// a raw frame equal to [`RESET_SIGNAL`] sets the counter to 0.
    pub fn on_message(&mut self, from: ConnectionId, raw: &str) -> MessageReport {
        debug!(hub = %self.name, conn_id = %from, payload = raw, "received message");
        counter!(MESSAGES_RECEIVED_TOTAL).increment(1);

        let (frames_sent, decode_error) = match decode_batch(raw) {
            Ok(messages) => (self.broadcast(&messages), None),
            Err(e) => {
                warn!(
                    hub = %self.name,
                    conn_id = %from,
                    error = %e,
                    error_kind = e.kind(),
                    "dropping undecodable frame"
                );
                counter!(DECODE_ERRORS_TOTAL).increment(1);
                (0, Some(e))
            }
        };

        let reset = raw == RESET_SIGNAL;
        if reset {
            let previous = std::mem::replace(&mut self.counter, 0);
            info!(hub = %self.name, conn_id = %from, previous, "counter reset");
            counter!(COUNTER_RESETS_TOTAL).increment(1);
        }

        MessageReport {
            frames_sent,
            decode_error,
            reset,
        }
    }

    /// Handle a closed transport.
    ///
    /// Always unregisters. For `code == 1000` a reciprocal normal-closure
    /// frame is queued first. Returns whether that frame was queued.
    pub fn on_connection_closed(&mut self, id: ConnectionId, code: Option<u16>) -> bool {
        let Some(connection) = self.registry.unregister(id) else {
            debug!(hub = %self.name, conn_id = %id, ?code, "close for unregistered connection");
            return false;
        };

        let reciprocated =
            code == Some(NORMAL_CLOSURE) && connection.close(NORMAL_CLOSURE, &self.close_reason);
        let _ = connection.mark_closed();

        info!(
            hub = %self.name,
            conn_id = %id,
            ?code,
            reciprocated,
            dropped_frames = connection.dropped_frames(),
            age_secs = connection.age().as_secs_f64(),
            connections = self.registry.len(),
            "connection unregistered"
        );
        reciprocated
    }

    /// Queue `"<counter>,<message>"` for every open connection and every
    /// message, in order. Returns the number of frames queued.
    ///
    /// The counter is read per frame; nothing can change it mid-fan-out
    /// because the coordinator is only reachable through its actor.
    pub fn broadcast(&self, messages: &[String]) -> usize {
        let mut sent = 0usize;
        let mut dropped = 0u64;
        let recipients = self.registry.for_each_open(|connection| {
            for message in messages {
                if connection.send_text(format_frame(self.counter, message)) {
                    sent += 1;
                } else {
                    dropped += 1;
                    warn!(
                        hub = %self.name,
                        conn_id = %connection.id(),
                        state = ?connection.state(),
                        total_drops = connection.dropped_frames(),
                        "failed to queue frame"
                    );
                    // The writer is gone; the rest of the batch would fail too.
                    break;
                }
            }
        });

        counter!(FRAMES_SENT_TOTAL).increment(sent as u64);
        if dropped > 0 {
            counter!(BROADCAST_DROPS_TOTAL).increment(dropped);
        }
        debug!(
            hub = %self.name,
            recipients,
            messages = messages.len(),
            frames = sent,
            "broadcast"
        );
        sent
    }
}
