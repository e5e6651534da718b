//! Hub actor: one task per hub owns the [`Coordinator`] and applies
//! mailbox events strictly in arrival order.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use super::coordinator::Coordinator;
use crate::errors::HubError;
use crate::websocket::connection::{ClientConnection, ConnectionId};

/// Everything a hub can be asked to do.
#[derive(Debug)]
pub enum HubEvent {
    /// A connection finished its upgrade.
    Opened(Arc<ClientConnection>),
    /// A frame arrived on a connection.
    Message {
        /// Sending connection.
        from: ConnectionId,
        /// Raw frame text.
        raw: String,
    },
    /// A connection's transport closed.
    Closed {
        /// Closed connection.
        id: ConnectionId,
        /// Peer close code, if the peer sent one.
        code: Option<u16>,
    },
    /// Snapshot request.
    Stats(oneshot::Sender<HubStats>),
}

/// Point-in-time view of a hub.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Logical hub name.
    pub name: String,
    /// Registered connections.
    pub connections: usize,
    /// Current counter value.
    pub counter: u64,
}

/// Cheap, cloneable sender side of a hub's mailbox.
#[derive(Clone, Debug)]
pub struct HubHandle {
    name: Arc<str>,
    tx: mpsc::Sender<HubEvent>,
}

impl HubHandle {
    /// Spawn the actor for `coordinator` with a bounded mailbox.
    ///
    /// The actor stops once every handle is dropped.
    pub fn spawn(coordinator: Coordinator, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let name: Arc<str> = Arc::from(coordinator.name());
        let task = tokio::spawn(run(coordinator, rx));
        (Self { name, tx }, task)
    }

    /// Logical hub name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Register a connection.
    pub async fn open(&self, connection: Arc<ClientConnection>) -> Result<(), HubError> {
        self.send(HubEvent::Opened(connection)).await
    }

    /// Submit an inbound frame.
    pub async fn message(&self, from: ConnectionId, raw: String) -> Result<(), HubError> {
        self.send(HubEvent::Message { from, raw }).await
    }

    /// Report a closed transport.
    pub async fn closed(&self, id: ConnectionId, code: Option<u16>) -> Result<(), HubError> {
        self.send(HubEvent::Closed { id, code }).await
    }

    /// Ask the actor for a snapshot. Ordered after every event already queued.
    pub async fn stats(&self) -> Result<HubStats, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubEvent::Stats(reply)).await?;
        rx.await.map_err(|_| self.unavailable())
    }

    async fn send(&self, event: HubEvent) -> Result<(), HubError> {
        self.tx.send(event).await.map_err(|_| self.unavailable())
    }

    fn unavailable(&self) -> HubError {
        HubError::HubUnavailable {
            name: self.name.to_string(),
        }
    }
}

#[instrument(skip_all, fields(hub = %coordinator.name()))]
async fn run(mut coordinator: Coordinator, mut rx: mpsc::Receiver<HubEvent>) {
    info!("hub started");
    while let Some(event) = rx.recv().await {
        match event {
            HubEvent::Opened(connection) => coordinator.on_connection_opened(connection),
            HubEvent::Message { from, raw } => {
                let _ = coordinator.on_message(from, &raw);
            }
            HubEvent::Closed { id, code } => {
                let _ = coordinator.on_connection_closed(id, code);
            }
            HubEvent::Stats(reply) => {
                let stats = HubStats {
                    name: coordinator.name().to_owned(),
                    connections: coordinator.registry().len(),
                    counter: coordinator.counter(),
                };
                if reply.send(stats).is_err() {
                    debug!("stats requester went away");
                }
            }
        }
    }
    info!(
        connections = coordinator.registry().len(),
        "hub stopped"
    );
}
