//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::fmt::Display;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::{Sink, SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval_at, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::{ClientConnection, Outbound};
use crate::hub::HubHandle;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// Close code sent to clients when the server shuts down.
pub const GOING_AWAY: u16 = 1001;

/// Close code sent when the hub cannot accept the connection.
pub const INTERNAL_ERROR: u16 = 1011;

/// Per-session limits.
#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    /// Bound on a single socket write; a peer that exceeds it is dropped.
    pub send_timeout: Duration,
    /// Interval between server Ping frames.
    pub heartbeat_interval: Duration,
    /// Max inbound message size, applied at upgrade.
    pub max_message_size: usize,
}

/// What an inbound WebSocket frame means to the hub.
#[derive(Debug, PartialEq, Eq)]
pub enum Inbound {
    /// Hand this raw text to the hub.
    Frame(String),
    /// Peer closed, with its close code if it sent one.
    Closed(Option<u16>),
    /// Control frame; nothing to do.
    Ignore,
}

/// Classify an inbound frame.
///
/// Binary frames carry no text and are forwarded as an empty payload, which
/// the hub rejects as undecodable.
pub fn classify(message: Message) -> Inbound {
    match message {
        Message::Text(text) => Inbound::Frame(text.as_str().to_owned()),
        Message::Binary(_) => Inbound::Frame(String::new()),
        Message::Close(frame) => Inbound::Closed(frame.map(|f| f.code)),
        Message::Ping(_) | Message::Pong(_) => Inbound::Ignore,
    }
}

/// Run a WebSocket session for a connected client.
///
/// 1. Registers the connection with `hub`
/// 2. Forwards inbound text frames to the hub in arrival order
/// 3. Drains queued outbound frames to the socket with a bounded write time
/// 4. Sends periodic Ping frames
/// 5. Reports the close (with the peer's code) to the hub and cleans up
#[instrument(skip_all, fields(hub = %hub.name(), conn_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    hub: HubHandle,
    config: SessionConfig,
    cancel: CancellationToken,
) {
    let (ws_tx, mut ws_rx) = ws.split();

    let (send_tx, send_rx) = mpsc::unbounded_channel();
    let connection = Arc::new(ClientConnection::new(send_tx));
    let id = connection.id();
    let _ = tracing::Span::current().record("conn_id", tracing::field::display(id));

    let started = Instant::now();
    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let mut writer = tokio::spawn(write_loop(
        ws_tx,
        send_rx,
        Arc::downgrade(&connection),
        config.send_timeout,
        config.heartbeat_interval,
    ));
    let mut writer_done = false;

    let code = if let Err(e) = hub.open(connection.clone()).await {
        warn!(error = %e, "hub rejected connection");
        let _ = connection.close(INTERNAL_ERROR, "hub unavailable");
        None
    } else {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("server shutting down, closing client");
                    let _ = connection.close(GOING_AWAY, "server shutting down");
                    break None;
                }
                _ = &mut writer => {
                    writer_done = true;
                    break None;
                }
                frame = ws_rx.next() => match frame {
                    Some(Ok(message)) => match classify(message) {
                        Inbound::Frame(raw) => {
                            if let Err(e) = hub.message(id, raw).await {
                                warn!(error = %e, "hub stopped mid-session");
                                break None;
                            }
                        }
                        Inbound::Closed(code) => {
                            info!(?code, "client sent close frame");
                            break code;
                        }
                        Inbound::Ignore => {}
                    },
                    Some(Err(e)) => {
                        debug!(error = %e, "websocket read failed");
                        break None;
                    }
                    None => break None,
                },
            }
        }
    };

    if hub.closed(id, code).await.is_err() {
        let _ = connection.mark_closed();
    }
    drop(connection);

    // The writer ends once the hub releases its handle and the queue drains.
    if !writer_done && timeout(config.send_timeout, &mut writer).await.is_err() {
        debug!("writer did not finish in time, aborting");
        writer.abort();
    }

    info!(?code, "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
}

/// Drain `rx` into `sink`, interleaving Ping frames.
///
/// Stops after writing a close frame, when the queue is closed, or when a
/// write fails or exceeds `send_timeout`; the latter two mark the connection
/// closed so broadcasts skip it.
pub async fn write_loop<S>(
    mut sink: S,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    connection: Weak<ClientConnection>,
    send_timeout: Duration,
    heartbeat_interval: Duration,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let start = tokio::time::Instant::now() + heartbeat_interval;
    let mut heartbeat = interval_at(start, heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let (message, is_close) = tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(Outbound::Text(text)) => (Message::Text(text.into()), false),
                Some(Outbound::Close { code, reason }) => (
                    Message::Close(Some(CloseFrame { code, reason: reason.into() })),
                    true,
                ),
                None => break,
            },
            _ = heartbeat.tick() => (Message::Ping(vec![].into()), false),
        };

        match timeout(send_timeout, sink.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(error = %e, "websocket write failed");
                mark_closed(&connection);
                break;
            }
            Err(_) => {
                warn!(
                    timeout_ms = u64::try_from(send_timeout.as_millis()).unwrap_or(u64::MAX),
                    "websocket write timed out, dropping client"
                );
                mark_closed(&connection);
                break;
            }
        }

        if is_close {
            break;
        }
    }
}

fn mark_closed(connection: &Weak<ClientConnection>) {
    if let Some(connection) = connection.upgrade() {
        let _ = connection.mark_closed();
    }
}
