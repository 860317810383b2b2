//! Room allocation, lookup, and tombstones.
//!
//! Like the pool, a plain table owned by the switchboard behind the match
//! lock. Closed rooms are kept as inactive tombstones so a late in-flight
//! message resolves to "room inactive" instead of the ambiguous "unknown
//! room." Retention is bounded: past the cap, each new closure drops the
//! oldest tombstone, so the table does not grow with process uptime.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};

use duet_core::{RoomId, UserId};

/// Closed rooms retained as queryable tombstones. Only the recent
/// in-flight window matters; a message for an older room resolves as
/// unknown rather than inactive.
const CLOSED_RETENTION: usize = 1024;

/// One two-participant session room.
#[derive(Clone, Debug)]
pub struct Room {
    /// Unique room identity, minted at creation.
    pub id: RoomId,
    /// The two participants; never changed after creation.
    pub participants: [UserId; 2],
    /// Live flag; flipped once, active → inactive.
    pub active: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Room {
    /// Whether `user` is one of the two participants.
    #[must_use]
    pub fn has_participant(&self, user: &UserId) -> bool {
        self.participants.contains(user)
    }

    /// The other participant, if `user` is one of the two.
    #[must_use]
    pub fn partner_of(&self, user: &UserId) -> Option<&UserId> {
        if self.participants[0] == *user {
            Some(&self.participants[1])
        } else if self.participants[1] == *user {
            Some(&self.participants[0])
        } else {
            None
        }
    }
}

/// Rooms tracked by the switchboard, active and recently closed.
#[derive(Default)]
pub struct RoomTable {
    rooms: HashMap<RoomId, Room>,
    /// Index from participant to their active room. Each active room
    /// contributes exactly two entries; tombstones contribute none.
    active_by_user: HashMap<UserId, RoomId>,
    /// Tombstones in closure order, oldest first, for capped eviction.
    closed_order: VecDeque<RoomId>,
}

impl RoomTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new active room for `a` and `b`.
    ///
    /// Any existing active room containing either participant is closed
    /// first, so no user is ever in two active rooms.
    pub fn create(&mut self, a: UserId, b: UserId) -> Room {
        for user in [&a, &b] {
            if let Some(prior) = self.active_by_user.get(user).cloned() {
                let _ = self.close(&prior);
            }
        }

        let room = Room {
            id: RoomId::new(),
            participants: [a.clone(), b.clone()],
            active: true,
            created_at: Utc::now(),
        };
        let _ = self.active_by_user.insert(a, room.id.clone());
        let _ = self.active_by_user.insert(b, room.id.clone());
        let _ = self.rooms.insert(room.id.clone(), room.clone());
        room
    }

    /// Look up a room by identity, active or tombstoned.
    #[must_use]
    pub fn get(&self, id: &RoomId) -> Option<&Room> {
        self.rooms.get(id)
    }

    /// The active room containing `user`, if any.
    #[must_use]
    pub fn get_by_participant(&self, user: &UserId) -> Option<&Room> {
        self.active_by_user
            .get(user)
            .and_then(|id| self.rooms.get(id))
    }

    /// Set a room inactive, idempotently.
    ///
    /// Returns `true` if this call flipped the flag. The record stays
    /// queryable as a tombstone until the retention cap pushes it out.
    pub fn close(&mut self, id: &RoomId) -> bool {
        let Some(room) = self.rooms.get_mut(id) else {
            return false;
        };
        if !room.active {
            return false;
        }
        room.active = false;
        for user in room.participants.clone() {
            // Only clear index entries still pointing at this room.
            if self.active_by_user.get(&user) == Some(id) {
                let _ = self.active_by_user.remove(&user);
            }
        }
        // Rooms never reactivate and a second close is a no-op above, so
        // every id lands here exactly once and the queue holds tombstones
        // only.
        self.closed_order.push_back(id.clone());
        if self.closed_order.len() > CLOSED_RETENTION {
            if let Some(oldest) = self.closed_order.pop_front() {
                let _ = self.rooms.remove(&oldest);
            }
        }
        true
    }

    /// Number of currently active rooms.
    ///
    /// Derived from the participant index, which holds exactly two entries
    /// per active room; the tombstone set is never scanned.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active_by_user.len() / 2
    }

    /// Total rooms tracked, tombstones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Whether no room was ever created.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
