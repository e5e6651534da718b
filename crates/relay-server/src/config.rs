//! Server configuration.

use std::time::Duration;

use relay_settings::RelaySettings;
use serde::{Deserialize, Serialize};

use crate::websocket::session::SessionConfig;

/// Runtime configuration for [`RelayServer`](crate::RelayServer).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Name of the hub that `/api/ws` joins.
    pub hub_name: String,
    /// Per-hub mailbox capacity.
    pub mailbox_capacity: usize,
    /// Reason text on the reciprocal normal-closure frame.
    pub close_reason: String,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Bound on a single socket write, in milliseconds.
    pub send_timeout_ms: u64,
    /// Interval between server Ping frames, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Grace period for draining tasks at shutdown, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            hub_name: "global".into(),
            mailbox_capacity: 1024,
            close_reason: "hub is closing WebSocket".into(),
            max_message_size: 1024 * 1024,
            send_timeout_ms: 5_000,
            heartbeat_interval_ms: 30_000,
            shutdown_timeout_ms: 10_000,
        }
    }
}

impl ServerConfig {
    /// Session limits derived from this config.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            send_timeout: Duration::from_millis(self.send_timeout_ms),
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            max_message_size: self.max_message_size,
        }
    }

    /// Shutdown grace period.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl From<&RelaySettings> for ServerConfig {
    fn from(settings: &RelaySettings) -> Self {
        let server = &settings.server;
        let hub = &settings.hub;
        Self {
            host: server.host.clone(),
            port: server.port,
            hub_name: hub.name.clone(),
            mailbox_capacity: hub.mailbox_capacity,
            close_reason: hub.close_reason.clone(),
            max_message_size: server.max_message_size,
            send_timeout_ms: server.send_timeout_ms,
            heartbeat_interval_ms: server.heartbeat_interval_ms,
            shutdown_timeout_ms: server.shutdown_timeout_ms,
        }
    }
}
