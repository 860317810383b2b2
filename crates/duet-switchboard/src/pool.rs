//! Waiting pool of users seeking a partner.
//!
//! A plain table with no interior locking: the switchboard owns it behind
//! the match lock, so pool reads and writes around a pairing decision are
//! one atomic unit.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use duet_core::UserId;

/// Users currently queued for matching, with their enqueue times.
///
/// A user appears at most once; entry and exit are idempotent.
#[derive(Default)]
pub struct WaitingPool {
    entries: HashMap<UserId, Instant>,
}

impl WaitingPool {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `user` if absent.
    ///
    /// Returns `true` if newly inserted. Re-adding keeps the original
    /// enqueue time, so wait metrics measure from the first request.
    pub fn add(&mut self, user: UserId) -> bool {
        match self.entries.entry(user) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                let _ = slot.insert(Instant::now());
                true
            }
        }
    }

    /// Remove `user` if present.
    ///
    /// Returns how long the user had been waiting, or `None` if absent.
    pub fn remove(&mut self, user: &UserId) -> Option<Duration> {
        self.entries.remove(user).map(|since| since.elapsed())
    }

    /// Whether `user` is currently queued.
    #[must_use]
    pub fn contains(&self, user: &UserId) -> bool {
        self.entries.contains_key(user)
    }

    /// The other queued users at this moment, as a candidate list.
    #[must_use]
    pub fn snapshot_excluding(&self, user: &UserId) -> Vec<UserId> {
        self.entries
            .keys()
            .filter(|queued| *queued != user)
            .cloned()
            .collect()
    }

    /// Number of queued users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the pool is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
