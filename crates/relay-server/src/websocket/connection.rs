//! WebSocket client connection handle.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

/// Opaque connection identity, unique for the life of the process.
///
/// Ids are handed out in creation order; they are used for registry
/// membership only, never for addressing a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{}", self.0)
    }
}

/// Transport lifecycle of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Upgraded but not yet registered with a hub.
    Connecting = 0,
    /// Registered and eligible for broadcasts.
    Open = 1,
    /// A close frame has been queued.
    Closing = 2,
    /// Terminal.
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// A frame queued for the connection's writer task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// UTF-8 text frame.
    Text(String),
    /// Close frame; the writer stops after sending it.
    Close {
        /// Close status code.
        code: u16,
        /// Close reason text.
        reason: String,
    },
}

/// A connected WebSocket client as seen by the hub.
///
/// Sends never wait: frames go into an unbounded queue drained by the
/// session's writer task. A peer that stops reading is dropped by the
/// writer's send timeout, not by the queue, so a live client never misses a
/// frame.
pub struct ClientConnection {
    id: ConnectionId,
    state: AtomicU8,
    tx: mpsc::UnboundedSender<Outbound>,
    connected_at: Instant,
    dropped_frames: AtomicU64,
}

impl ClientConnection {
    /// Create a connection in the `Connecting` state with a fresh id.
    pub fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            id: ConnectionId::next(),
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            tx,
            connected_at: Instant::now(),
            dropped_frames: AtomicU64::new(0),
        }
    }

    /// Connection id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the connection can receive broadcasts right now.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// `Connecting → Open`.
    ///
    /// Returns `true` if the connection is open afterwards. A connection that
    /// already began closing is never reopened.
    pub fn mark_open(&self) -> bool {
        match self.state.compare_exchange(
            ConnectionState::Connecting as u8,
            ConnectionState::Open as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => true,
            Err(current) => current == ConnectionState::Open as u8,
        }
    }

    /// Move to the terminal state, returning the previous one.
    pub fn mark_closed(&self) -> ConnectionState {
        ConnectionState::from_u8(
            self.state
                .swap(ConnectionState::Closed as u8, Ordering::AcqRel),
        )
    }

    /// Queue a text frame.
    ///
    /// Returns `false` (and counts a drop) if the connection is not open or
    /// its writer has gone away.
    pub fn send_text(&self, text: String) -> bool {
        if self.is_open() && self.tx.send(Outbound::Text(text)).is_ok() {
            true
        } else {
            let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Queue a close frame and move to `Closing`.
    ///
    /// Returns `false` if the connection is already closed or the frame
    /// could not be queued.
    pub fn close(&self, code: u16, reason: &str) -> bool {
        let previous = self.state.fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
            (s != ConnectionState::Closed as u8).then_some(ConnectionState::Closing as u8)
        });
        if previous.is_err() {
            return false;
        }
        self.tx
            .send(Outbound::Close {
                code,
                reason: reason.to_owned(),
            })
            .is_ok()
    }

    /// Frames dropped for this connection so far.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Time since the connection was created.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
