//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

use crate::hub::HubStats;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` when the default hub answers, `"degraded"` otherwise.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Default hub name.
    pub hub: String,
    /// Connections registered with the default hub.
    pub connections: usize,
    /// Default hub's counter.
    pub counter: u64,
}

impl HealthResponse {
    /// Whether the response reports a healthy hub.
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Build a health response from a hub snapshot, or from the hub name alone
/// when the hub did not answer.
pub fn health_check(start_time: Instant, hub: &str, stats: Option<HubStats>) -> HealthResponse {
    let uptime_secs = start_time.elapsed().as_secs();
    match stats {
        Some(stats) => HealthResponse {
            status: "ok".into(),
            uptime_secs,
            hub: stats.name,
            connections: stats.connections,
            counter: stats.counter,
        },
        None => HealthResponse {
            status: "degraded".into(),
            uptime_secs,
            hub: hub.to_owned(),
            connections: 0,
            counter: 0,
        },
    }
}
