//! The coordinating entry point for all shared-state transactions.
//!
//! Every operation that touches more than one shared structure — pairing two
//! waiting users, tearing a connection down — runs here, under one match
//! lock over the pool and the room table, so other connection tasks observe
//! each transaction as a whole or not at all. A transaction's frames are
//! enqueued non-blocking on the affected clients' bounded queues before the
//! lock is released, so each queue reads in transaction order; directory
//! I/O stays outside the lock.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, info, warn};

use duet_core::{PublicProfile, RoomId, ServerMessage, UserId};
use duet_directory::{Directory, DirectoryError, UserProfile};

use crate::client::{ClientHandle, SessionState};
use crate::errors::{SwitchboardError, SwitchboardResult};
use crate::metrics::{
    AUTH_FAILURES_TOTAL, MATCHES_TOTAL, ROOMS_ACTIVE_GAUGE, WAIT_SECONDS, WAITING_GAUGE,
};
use crate::pool::WaitingPool;
use crate::registry::ClientRegistry;
use crate::rooms::RoomTable;

/// Pool and room table, guarded together as one transaction domain.
pub(crate) struct MatchState {
    pub(crate) pool: WaitingPool,
    pub(crate) rooms: RoomTable,
}

/// Point-in-time counters for health reporting.
#[derive(Clone, Copy, Debug)]
pub struct SwitchboardStats {
    /// Bound connections.
    pub connections: usize,
    /// Users queued for matching.
    pub waiting: usize,
    /// Currently active rooms.
    pub active_rooms: usize,
}

/// Shared state and transactions of the matchmaking server.
pub struct Switchboard {
    pub(crate) registry: ClientRegistry,
    pub(crate) state: Mutex<MatchState>,
    pub(crate) directory: Arc<dyn Directory>,
}

impl Switchboard {
    /// Create a switchboard backed by the given directory.
    #[must_use]
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self {
            registry: ClientRegistry::new(),
            state: Mutex::new(MatchState {
                pool: WaitingPool::new(),
                rooms: RoomTable::new(),
            }),
            directory,
        }
    }

    /// The connection registry.
    #[must_use]
    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Point-in-time counters for health reporting.
    #[must_use]
    pub fn stats(&self) -> SwitchboardStats {
        let st = self.state.lock();
        SwitchboardStats {
            connections: self.registry.count(),
            waiting: st.pool.len(),
            active_rooms: st.rooms.active_count(),
        }
    }

    /// Bind an external identity to `handle`.
    ///
    /// Succeeds only from the unauthenticated state, only for identities the
    /// directory knows, and only for verified accounts. A prior connection
    /// for the same identity is fully torn down (its partner notified, its
    /// pool entry scrubbed) before the new mapping takes effect. On success
    /// the client receives `auth-success` and the directory records the user
    /// online.
    pub async fn authenticate(
        &self,
        handle: &Arc<ClientHandle>,
        user_id: UserId,
    ) -> SwitchboardResult<UserProfile> {
        if handle.state() != SessionState::Connected {
            return Err(SwitchboardError::InvalidState { action: "auth" });
        }

        let profile = match self.directory.lookup(&user_id).await {
            Ok(profile) => profile,
            Err(DirectoryError::UserNotFound(id)) => {
                metrics::counter!(AUTH_FAILURES_TOTAL).increment(1);
                return Err(SwitchboardError::UnknownUser(id));
            }
            Err(err) => {
                metrics::counter!(AUTH_FAILURES_TOTAL).increment(1);
                return Err(err.into());
            }
        };
        if !profile.verified {
            metrics::counter!(AUTH_FAILURES_TOTAL).increment(1);
            return Err(SwitchboardError::Unverified(user_id));
        }

        // Replace any prior connection for this identity. The old mapping is
        // already displaced, so its teardown cannot unbind the new one and
        // presence stays online across the swap.
        if let Some(old) = self.registry.bind(user_id.clone(), Arc::clone(handle)) {
            if !Arc::ptr_eq(&old, handle) {
                info!(user = %user_id, old_conn = %old.conn_id, "replacing existing connection");
                let _ = self.teardown_sync(&old);
                old.close();
            }
        }

        handle.bind_profile(profile.clone());
        handle.set_state(SessionState::Authenticated);

        if let Err(err) = self.directory.set_presence(&user_id, true).await {
            warn!(user = %user_id, error = %err, "failed to record online presence");
        }

        let _ = handle.send(ServerMessage::AuthSuccess {
            user: profile.public(),
        });
        info!(user = %user_id, conn = %handle.conn_id, "authenticated");
        Ok(profile)
    }

    /// Enter the waiting pool and try to pair immediately.
    ///
    /// With no other user waiting, the caller is queued and told `waiting`.
    /// Otherwise one candidate is drawn uniformly at random; a candidate
    /// whose connection went away between snapshot and commit is scrubbed
    /// from the pool and the draw repeats. On success both users leave the
    /// pool, a room is created, and both `match` frames carrying the other's
    /// public profile are queued — all inside one lock hold, so a racing
    /// transaction's frames cannot land in between.
    pub fn join_waiting(&self, handle: &Arc<ClientHandle>) -> SwitchboardResult<()> {
        let user = handle.user_id().ok_or(SwitchboardError::NotAuthenticated)?;

        let mut st = self.state.lock();
        match handle.state() {
            // Re-joining while queued is a fresh match attempt.
            SessionState::Authenticated | SessionState::Idle | SessionState::Waiting => {}
            SessionState::InRoom(_) | SessionState::Closed => {
                return Err(SwitchboardError::InvalidState {
                    action: "join-waiting",
                });
            }
            SessionState::Connected => return Err(SwitchboardError::NotAuthenticated),
        }

        let _ = st.pool.add(user.clone());
        handle.set_state(SessionState::Waiting);

        let mut candidates = st.pool.snapshot_excluding(&user);
        loop {
            if candidates.is_empty() {
                if !handle.send(ServerMessage::waiting()) {
                    debug!(user = %user, "waiting notice dropped");
                }
                publish_gauges(&st);
                drop(st);
                debug!(user = %user, "queued for matching");
                return Ok(());
            }

            let pick = rand::rng().random_range(0..candidates.len());
            let candidate = candidates.swap_remove(pick);

            // Reachability re-check between snapshot and commit.
            let Some(partner) = self.registry.lookup(&candidate) else {
                let _ = st.pool.remove(&candidate);
                debug!(user = %candidate, "scrubbed unbound candidate from pool");
                continue;
            };
            if partner.is_closing() || partner.state() != SessionState::Waiting {
                let _ = st.pool.remove(&candidate);
                debug!(user = %candidate, "scrubbed stale candidate from pool");
                continue;
            }

            // Commit: both leave the pool, one room forms, both move in,
            // and both match frames are queued before the lock is released.
            let my_wait = st.pool.remove(&user);
            let their_wait = st.pool.remove(&candidate);
            let room = st.rooms.create(user.clone(), candidate.clone());
            handle.set_state(SessionState::InRoom(room.id.clone()));
            partner.set_state(SessionState::InRoom(room.id.clone()));

            let me = public_profile(handle, &user);
            let them = public_profile(&partner, &candidate);
            let _ = handle.send(ServerMessage::Match {
                room_id: room.id.clone(),
                partner: them,
            });
            if !partner.send(ServerMessage::Match {
                room_id: room.id.clone(),
                partner: me,
            }) {
                warn!(user = %candidate, "match notification dropped");
            }

            metrics::counter!(MATCHES_TOTAL).increment(1);
            for wait in [my_wait, their_wait].into_iter().flatten() {
                metrics::histogram!(WAIT_SECONDS).record(wait.as_secs_f64());
            }
            publish_gauges(&st);
            drop(st);

            info!(room = %room.id, a = %user, b = %candidate, "matched");
            return Ok(());
        }
    }

    /// Leave the waiting pool without disconnecting.
    ///
    /// Leaving twice lands in the same state with no further side effects.
    pub fn leave_waiting(&self, handle: &Arc<ClientHandle>) -> SwitchboardResult<()> {
        let user = handle.user_id().ok_or(SwitchboardError::NotAuthenticated)?;

        let mut st = self.state.lock();
        match handle.state() {
            SessionState::Waiting => {
                let _ = st.pool.remove(&user);
                handle.set_state(SessionState::Idle);
                publish_gauges(&st);
                debug!(user = %user, "left the waiting pool");
                Ok(())
            }
            SessionState::Authenticated | SessionState::Idle => Ok(()),
            SessionState::InRoom(_) | SessionState::Closed => {
                Err(SwitchboardError::InvalidState {
                    action: "leave-waiting",
                })
            }
            SessionState::Connected => Err(SwitchboardError::NotAuthenticated),
        }
    }

    /// Close the current room (if any) and look for a new partner.
    ///
    /// Two explicitly ordered transactions: the room close commits with the
    /// partner's `partner-left` already on its queue, then the caller
    /// re-enters the pool. A partner re-matched by a racing task still
    /// reads the closure notice first.
    pub fn next_partner(&self, handle: &Arc<ClientHandle>) -> SwitchboardResult<()> {
        if handle.user_id().is_none() {
            return Err(SwitchboardError::NotAuthenticated);
        }

        {
            let mut st = self.state.lock();
            match handle.state() {
                SessionState::InRoom(room_id) => {
                    let user = handle.user_id();
                    if st.rooms.close(&room_id) {
                        self.notify_partner_left(&st, &room_id, user.as_ref());
                    }
                    handle.set_state(SessionState::Idle);
                    publish_gauges(&st);
                }
                SessionState::Closed => {
                    return Err(SwitchboardError::InvalidState { action: "next" });
                }
                _ => {}
            }
        }

        self.join_waiting(handle)
    }

    /// Full teardown for a departing connection.
    ///
    /// Safe to call from every exit path (graceful `disconnect`, transport
    /// close, auth timeout, forced close); repeat calls are no-ops. Closes
    /// the room and notifies the partner, scrubs the pool entry, unbinds the
    /// identity if this connection still owns it, and records the user
    /// offline.
    pub async fn disconnect(&self, handle: &Arc<ClientHandle>) {
        if let Some(user) = self.teardown_sync(handle) {
            if let Err(err) = self.directory.set_presence(&user, false).await {
                warn!(user = %user, error = %err, "failed to record offline presence");
            }
            info!(user = %user, conn = %handle.conn_id, "disconnected");
        }
        handle.close();
    }

    /// The in-memory half of teardown, one transaction under the match lock.
    ///
    /// Closes the room with the partner's notice queued in the same hold,
    /// scrubs the pool entry, and unbinds the identity if this connection
    /// still owns it. Returns the identity to record offline, if any.
    fn teardown_sync(&self, handle: &Arc<ClientHandle>) -> Option<UserId> {
        let user = handle.user_id();

        let mut st = self.state.lock();
        match handle.state() {
            SessionState::Closed => return None,
            SessionState::Waiting => {
                if let Some(user) = &user {
                    let _ = st.pool.remove(user);
                }
            }
            SessionState::InRoom(room_id) => {
                if st.rooms.close(&room_id) {
                    self.notify_partner_left(&st, &room_id, user.as_ref());
                }
            }
            SessionState::Connected | SessionState::Authenticated | SessionState::Idle => {}
        }
        handle.set_state(SessionState::Closed);

        let mut went_offline = None;
        if let Some(user) = user {
            if self.registry.unbind_if_current(&user, handle) {
                went_offline = Some(user);
            }
        }
        publish_gauges(&st);
        went_offline
    }

    /// Flip the partner of a just-closed room back to idle and queue its
    /// `partner-left`.
    ///
    /// Runs inside the caller's lock hold, so the notice lands on the
    /// partner's queue before any later transaction can append to it.
    /// Skipped for a partner that is no longer the bound connection for its
    /// identity or no longer thought it was in that room.
    fn notify_partner_left(&self, st: &MatchState, room_id: &RoomId, user: Option<&UserId>) {
        let Some(user) = user else { return };
        let Some(room) = st.rooms.get(room_id) else { return };
        let Some(partner) = room.partner_of(user) else { return };
        let Some(partner_handle) = self.registry.lookup(partner) else {
            return;
        };
        if partner_handle.state() == SessionState::InRoom(room_id.clone()) {
            partner_handle.set_state(SessionState::Idle);
            if !partner_handle.send(ServerMessage::PartnerLeft) {
                debug!(conn = %partner_handle.conn_id, "partner-left notification dropped");
            }
        }
    }
}

/// Partner-facing profile for a handle, falling back to the bare identity.
fn public_profile(handle: &ClientHandle, user: &UserId) -> PublicProfile {
    handle.profile().map_or_else(
        || PublicProfile {
            id: user.clone(),
            display_name: user.to_string(),
        },
        |profile| profile.public(),
    )
}

#[allow(clippy::cast_precision_loss)]
fn publish_gauges(st: &MatchState) {
    metrics::gauge!(WAITING_GAUGE).set(st.pool.len() as f64);
    metrics::gauge!(ROOMS_ACTIVE_GAUGE).set(st.rooms.active_count() as f64);
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
