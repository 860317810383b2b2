//! Per-connection handle and protocol state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use duet_core::{ConnId, RoomId, ServerMessage, UserId};
use duet_directory::UserProfile;

use crate::metrics::MESSAGES_DROPPED_TOTAL;

/// Protocol state of one connection.
///
/// Drives which inbound message types are accepted. The state lives on the
/// shared [`ClientHandle`] so the switchboard can flip a partner's state in
/// the same transaction that mutates the pool and room tables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Transport open, no identity bound yet.
    Connected,
    /// Identity bound; has not yet asked for a match.
    Authenticated,
    /// Authenticated, not waiting and not in a room.
    Idle,
    /// Queued in the waiting pool.
    Waiting,
    /// Bound to the given active room.
    InRoom(RoomId),
    /// Terminal; the transport is closing or closed.
    Closed,
}

/// One live client connection.
///
/// Owned by the [`ClientRegistry`](crate::registry::ClientRegistry) for its
/// lifetime; the session task and the switchboard share it behind an `Arc`.
/// Delivery is a bounded, non-blocking enqueue into the connection's write
/// task — a full or closed queue is a counted drop, never backpressure on
/// the sending side.
pub struct ClientHandle {
    /// Unique connection ID.
    pub conn_id: ConnId,
    /// Protocol state; flipped by the switchboard's transactions.
    state: Mutex<SessionState>,
    /// Profile cached at authentication time.
    profile: Mutex<Option<UserProfile>>,
    /// Typed outbound queue draining into the WebSocket write task.
    tx: mpsc::Sender<ServerMessage>,
    /// Cancelled to close the session task (slow client, rebind, shutdown).
    closing: CancellationToken,
    /// When this connection was established.
    pub connected_at: Instant,
    /// When the last Pong was received.
    last_pong: Mutex<Instant>,
    /// Count of messages dropped due to a full or closed queue.
    dropped: AtomicU64,
}

impl ClientHandle {
    /// Create a handle draining into `tx`.
    pub fn new(conn_id: ConnId, tx: mpsc::Sender<ServerMessage>, closing: CancellationToken) -> Self {
        let now = Instant::now();
        Self {
            conn_id,
            state: Mutex::new(SessionState::Connected),
            profile: Mutex::new(None),
            tx,
            closing,
            connected_at: now,
            last_pong: Mutex::new(now),
            dropped: AtomicU64::new(0),
        }
    }

    /// Current protocol state.
    pub fn state(&self) -> SessionState {
        self.state.lock().clone()
    }

    /// Replace the protocol state.
    pub fn set_state(&self, state: SessionState) {
        *self.state.lock() = state;
    }

    /// Cache the authenticated profile.
    pub fn bind_profile(&self, profile: UserProfile) {
        *self.profile.lock() = Some(profile);
    }

    /// The authenticated profile, if identity is bound.
    pub fn profile(&self) -> Option<UserProfile> {
        self.profile.lock().clone()
    }

    /// The bound user identity, if authenticated.
    pub fn user_id(&self) -> Option<UserId> {
        self.profile.lock().as_ref().map(|p| p.id.clone())
    }

    /// Enqueue a message for the client.
    ///
    /// Returns `false` if the queue is full or closed, and counts the drop.
    pub fn send(&self, message: ServerMessage) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(MESSAGES_DROPPED_TOTAL).increment(1);
            false
        }
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Signal the session task to close the transport.
    pub fn close(&self) {
        self.closing.cancel();
    }

    /// Whether a close has been requested.
    pub fn is_closing(&self) -> bool {
        self.closing.is_cancelled()
    }

    /// A token that resolves once a close has been requested.
    pub fn close_signal(&self) -> CancellationToken {
        self.closing.clone()
    }

    /// Record a Pong from the client.
    pub fn mark_alive(&self) {
        *self.last_pong.lock() = Instant::now();
    }

    /// Time since the last Pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Build a handle plus the receiving end of its outbound queue.
///
/// Convenience for the session task and for tests.
pub fn client_channel(
    capacity: usize,
    closing: CancellationToken,
) -> (Arc<ClientHandle>, mpsc::Receiver<ServerMessage>) {
    let (tx, rx) = mpsc::channel(capacity);
    let handle = Arc::new(ClientHandle::new(ConnId::new(), tx, closing));
    (handle, rx)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
