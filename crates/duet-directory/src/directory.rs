//! # Directory Trait
//!
//! Core abstraction over the external account service. The matchmaking core
//! consumes exactly three things from that service: profile lookup (with the
//! account's verified flag), an online/offline presence side effect, and
//! abuse-report submission. Everything else about accounts (registration,
//! passwords, email verification) is out of scope and stays behind this
//! boundary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use duet_core::{PublicProfile, RoomId, UserId};

/// Result type alias for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Errors that can occur during directory operations.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// No account exists for the given identity.
    #[error("unknown user: {0}")]
    UserNotFound(UserId),

    /// The directory backend could not be reached or answered abnormally.
    #[error("directory unavailable: {message}")]
    Unavailable {
        /// Error description.
        message: String,
    },
}

/// A user profile as the account service knows it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Stable user identity.
    pub id: UserId,
    /// Display name chosen on the account service.
    pub display_name: String,
    /// Whether the account has completed verification and may be matched.
    #[serde(default)]
    pub verified: bool,
}

impl UserProfile {
    /// The subset of this profile disclosed to matched partners.
    #[must_use]
    pub fn public(&self) -> PublicProfile {
        PublicProfile {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

/// An abuse report produced from room participant data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbuseReport {
    /// Identity of the reporting participant.
    pub reporter: UserId,
    /// Identity of the reported participant.
    pub reported: UserId,
    /// Room the two shared when the report was filed.
    pub room_id: RoomId,
    /// Optional free-text reason supplied by the reporter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// When the report was filed.
    pub reported_at: DateTime<Utc>,
}

/// External account-service boundary.
///
/// Implementors must be `Send + Sync`; the server shares one instance across
/// all connection tasks behind an `Arc<dyn Directory>`.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Look up a user's profile, including the verified flag.
    async fn lookup(&self, id: &UserId) -> DirectoryResult<UserProfile>;

    /// Record the user as online (`true`) or offline (`false`).
    ///
    /// Presence is a side effect for the external service; failures are
    /// logged by callers, never surfaced to the connection.
    async fn set_presence(&self, id: &UserId, online: bool) -> DirectoryResult<()>;

    /// Submit an abuse report.
    async fn submit_report(&self, report: AbuseReport) -> DirectoryResult<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
