//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

use duet_switchboard::SwitchboardStats;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Bound client connections.
    pub connections: usize,
    /// Users queued for a partner.
    pub waiting: usize,
    /// Active rooms.
    pub active_rooms: usize,
}

/// Build a health response from live counters.
#[must_use]
pub fn health_check(start_time: Instant, stats: SwitchboardStats) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections: stats.connections,
        waiting: stats.waiting,
        active_rooms: stats.active_rooms,
    }
}
