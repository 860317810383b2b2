//! Metric name constants emitted by this crate.
//!
//! The recorder is installed (and these names described) by the server
//! crate; emission here goes through the `metrics` facade and is a no-op
//! until then.

/// Counter: successful pairings.
pub const MATCHES_TOTAL: &str = "duet_matches_total";
/// Histogram: seconds from entering the pool to being matched.
pub const WAIT_SECONDS: &str = "duet_wait_seconds";
/// Gauge: users currently in the waiting pool.
pub const WAITING_GAUGE: &str = "duet_waiting";
/// Gauge: rooms currently active.
pub const ROOMS_ACTIVE_GAUGE: &str = "duet_rooms_active";
/// Counter: chat messages relayed (echo not counted separately).
pub const CHAT_MESSAGES_TOTAL: &str = "duet_chat_messages_total";
/// Counter: negotiation payloads relayed.
pub const SIGNALS_TOTAL: &str = "duet_signals_total";
/// Counter: outbound messages dropped on full or closed client queues.
pub const MESSAGES_DROPPED_TOTAL: &str = "duet_messages_dropped_total";
/// Counter: abuse reports accepted.
pub const REPORTS_TOTAL: &str = "duet_reports_total";
/// Counter: failed authentication attempts.
pub const AUTH_FAILURES_TOTAL: &str = "duet_auth_failures_total";
