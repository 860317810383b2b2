//! Switchboard error taxonomy.
//!
//! Every error here is local to the offending connection: the server answers
//! it with an `error` frame (or closes the transport for fatal cases) and
//! the shared tables stay untouched for everyone else.

use duet_core::{RoomId, UserId};
use duet_directory::DirectoryError;

/// Result type alias for switchboard operations.
pub type SwitchboardResult<T> = Result<T, SwitchboardError>;

/// Errors surfaced to a connection by switchboard operations.
#[derive(Debug, thiserror::Error)]
pub enum SwitchboardError {
    /// Message arrived before the connection authenticated.
    #[error("authentication required")]
    NotAuthenticated,

    /// The `userId` field does not match the bound identity.
    #[error("identity does not match this connection")]
    IdentityMismatch,

    /// The message type is not valid in the connection's current state.
    #[error("'{action}' is not valid right now")]
    InvalidState {
        /// The offending message type.
        action: &'static str,
    },

    /// Authentication failed: no such account.
    #[error("unknown user: {0}")]
    UnknownUser(UserId),

    /// Authentication failed: the account has not completed verification.
    #[error("account not verified: {0}")]
    Unverified(UserId),

    /// No room with that identity was ever created.
    #[error("room not found: {0}")]
    RoomNotFound(RoomId),

    /// The room existed but has been closed.
    #[error("room no longer active: {0}")]
    RoomInactive(RoomId),

    /// The sender is not a participant of the room it addressed.
    #[error("not a participant of room {0}")]
    NotAParticipant(RoomId),

    /// The external directory failed.
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

impl SwitchboardError {
    /// Coarse category string for logging and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::NotAuthenticated | Self::IdentityMismatch | Self::NotAParticipant(_) => {
                "authorization"
            }
            Self::InvalidState { .. } => "protocol",
            Self::UnknownUser(_) | Self::Unverified(_) => "auth",
            Self::RoomNotFound(_) | Self::RoomInactive(_) => "resolution",
            Self::Directory(_) => "directory",
        }
    }

    /// Whether repeated occurrences should be logged as suspicious.
    pub fn is_suspicious(&self) -> bool {
        self.category() == "authorization"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_read_like_wire_errors() {
        assert_eq!(
            SwitchboardError::NotAuthenticated.to_string(),
            "authentication required"
        );
        assert_eq!(
            SwitchboardError::RoomNotFound(RoomId::from("r_1")).to_string(),
            "room not found: r_1"
        );
        assert_eq!(
            SwitchboardError::InvalidState { action: "message" }.to_string(),
            "'message' is not valid right now"
        );
    }

    #[test]
    fn categories_follow_the_taxonomy() {
        assert_eq!(SwitchboardError::NotAuthenticated.category(), "authorization");
        assert_eq!(
            SwitchboardError::NotAParticipant(RoomId::from("r")).category(),
            "authorization"
        );
        assert_eq!(
            SwitchboardError::InvalidState { action: "next" }.category(),
            "protocol"
        );
        assert_eq!(
            SwitchboardError::RoomInactive(RoomId::from("r")).category(),
            "resolution"
        );
        assert_eq!(
            SwitchboardError::UnknownUser(UserId::from("u")).category(),
            "auth"
        );
    }

    #[test]
    fn authorization_errors_are_suspicious() {
        assert!(SwitchboardError::IdentityMismatch.is_suspicious());
        assert!(!SwitchboardError::RoomNotFound(RoomId::from("r")).is_suspicious());
    }

    #[test]
    fn directory_errors_pass_through() {
        let err = SwitchboardError::from(DirectoryError::Unavailable {
            message: "connection refused".to_owned(),
        });
        assert_eq!(err.to_string(), "directory unavailable: connection refused");
        assert_eq!(err.category(), "directory");
    }
}
