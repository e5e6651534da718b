//! # relay-server
//!
//! Single-instance WebSocket broadcast hub.
//!
//! - [`hub`]: connection registry, broadcast coordinator, and the actor that
//!   serializes every registry/counter mutation through one mailbox
//! - [`websocket`]: per-connection handle and reader/writer session loop
//! - [`server`]: Axum gateway (`/`, `/api/ws`, `/health`, `/metrics`) with
//!   the upgrade check that answers `426` before anything reaches a hub
//! - [`shutdown`]: `CancellationToken`-driven graceful shutdown; open sessions
//!   close with 1001

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod hub;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::HubError;
pub use hub::{Coordinator, HubDirectory, HubHandle, HubStats};
pub use server::RelayServer;
