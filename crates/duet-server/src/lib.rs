//! # duet-server
//!
//! Axum HTTP + `WebSocket` front end for the duet switchboard.
//!
//! - `/ws` — the client protocol: one `WebSocket` session per connection,
//!   JSON text frames in both directions
//! - `/health` — liveness probe with connection and room counters
//! - `/metrics` — Prometheus exposition
//! - Per-connection auth window, server pings, and slow-client eviction
//! - Graceful shutdown via `CancellationToken` fan-out to every session

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod ws;

pub use config::{ConfigError, ServerConfig};
pub use server::DuetServer;
