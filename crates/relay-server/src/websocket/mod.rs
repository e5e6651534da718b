//! WebSocket connection handle and session loop.

pub mod connection;
pub mod session;
