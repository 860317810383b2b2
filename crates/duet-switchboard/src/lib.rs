//! # duet-switchboard
//!
//! The stateful heart of the duet server: tracks which users are reachable,
//! queues unmatched users, pairs them atomically into two-participant rooms,
//! and relays chat and negotiation payloads between room partners.
//!
//! Layout:
//!
//! - [`client`] — per-connection handle ([`ClientHandle`]) and its protocol
//!   state machine ([`SessionState`])
//! - [`registry`] — identity → connection map ([`ClientRegistry`]), the
//!   single source of truth for reachability
//! - [`pool`] — the waiting pool of users seeking a partner
//! - [`rooms`] — room allocation, lookup, and inactive tombstones
//! - [`switchboard`] — the one coordinating entry point: authentication,
//!   matching, leaving, and disconnect cleanup as atomic transactions
//! - [`relay`] — chat/signal forwarding and abuse reports
//!
//! Concurrency model: one `parking_lot` mutex guards the pool and room table
//! together, so matching and cleanup are observed as single transactions by
//! every connection task. The lock is only ever held for in-memory work; a
//! transaction's frames are pushed non-blocking onto the affected
//! connections' bounded queues before release, so every client reads frames
//! in transaction order, and directory I/O stays outside the lock.

#![deny(unsafe_code)]

pub mod client;
pub mod errors;
pub mod metrics;
pub mod pool;
pub mod registry;
pub mod relay;
pub mod rooms;
pub mod switchboard;

pub use client::{ClientHandle, SessionState, client_channel};
pub use errors::{SwitchboardError, SwitchboardResult};
pub use registry::ClientRegistry;
pub use rooms::Room;
pub use switchboard::{Switchboard, SwitchboardStats};
