//! In-process [`Directory`] implementations.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;

use duet_core::UserId;

use crate::directory::{AbuseReport, Directory, DirectoryError, DirectoryResult, UserProfile};

/// Fixed-roster directory backed by in-memory maps.
///
/// Presence and reports are recorded so deployments (and tests) can inspect
/// the side effects this core produces for the external service.
#[derive(Default)]
pub struct MemoryDirectory {
    users: DashMap<UserId, UserProfile>,
    online: DashSet<UserId>,
    reports: Mutex<Vec<AbuseReport>>,
}

impl MemoryDirectory {
    /// Build a directory from an initial roster of profiles.
    #[must_use]
    pub fn new(roster: impl IntoIterator<Item = UserProfile>) -> Self {
        let dir = Self::default();
        for profile in roster {
            dir.insert(profile);
        }
        dir
    }

    /// Add or replace one profile.
    pub fn insert(&self, profile: UserProfile) {
        let _ = self.users.insert(profile.id.clone(), profile);
    }

    /// Whether the user is currently recorded online.
    #[must_use]
    pub fn is_online(&self, id: &UserId) -> bool {
        self.online.contains(id)
    }

    /// Snapshot of all reports submitted so far.
    #[must_use]
    pub fn reports(&self) -> Vec<AbuseReport> {
        self.reports.lock().clone()
    }

    /// Number of profiles in the roster.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether the roster is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn lookup(&self, id: &UserId) -> DirectoryResult<UserProfile> {
        self.users
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DirectoryError::UserNotFound(id.clone()))
    }

    async fn set_presence(&self, id: &UserId, online: bool) -> DirectoryResult<()> {
        if online {
            let _ = self.online.insert(id.clone());
        } else {
            let _ = self.online.remove(id);
        }
        Ok(())
    }

    async fn submit_report(&self, report: AbuseReport) -> DirectoryResult<()> {
        self.reports.lock().push(report);
        Ok(())
    }
}

/// Directory that accepts any identity on first sight.
///
/// Used for anonymous/dev deployments where there is no account roster: the
/// first lookup of an unknown identity creates a verified guest profile with
/// a display name derived from the identity itself. Repeat lookups return the
/// same profile.
#[derive(Default)]
pub struct OpenDirectory {
    inner: MemoryDirectory,
}

impl OpenDirectory {
    /// Create an empty open directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Access the underlying roster for inspection.
    #[must_use]
    pub fn roster(&self) -> &MemoryDirectory {
        &self.inner
    }

    fn guest_name(id: &UserId) -> String {
        let short: String = id
            .as_str()
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .take(8)
            .collect();
        if short.is_empty() {
            "guest".to_owned()
        } else {
            format!("guest-{short}")
        }
    }
}

#[async_trait]
impl Directory for OpenDirectory {
    async fn lookup(&self, id: &UserId) -> DirectoryResult<UserProfile> {
        let profile = self
            .inner
            .users
            .entry(id.clone())
            .or_insert_with(|| UserProfile {
                id: id.clone(),
                display_name: Self::guest_name(id),
                verified: true,
            })
            .value()
            .clone();
        Ok(profile)
    }

    async fn set_presence(&self, id: &UserId, online: bool) -> DirectoryResult<()> {
        self.inner.set_presence(id, online).await
    }

    async fn submit_report(&self, report: AbuseReport) -> DirectoryResult<()> {
        self.inner.submit_report(report).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
