//! Wire-format types for the client/server WebSocket protocol.
//!
//! Every frame is a JSON object with a `type` discriminator (kebab-case) and
//! camelCase fields. Inbound frames decode into [`ClientMessage`] exactly once
//! at the connection boundary; outbound frames are built as [`ServerMessage`]
//! values and serialized in the connection's writer task.
//!
//! The `signal` body is deliberately opaque: the server relays the two
//! clients' peer-to-peer negotiation payloads without interpreting them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{MessageId, RoomId, UserId};

/// Minimal public profile disclosed to a matched partner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    /// Stable user identity.
    pub id: UserId,
    /// Display name chosen on the external identity service.
    pub display_name: String,
}

/// Canonical chat envelope minted by the relay.
///
/// The same value (same `id`, same `sent_at`) is delivered to the partner and
/// echoed back to the sender, so both UIs agree on the message's identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Unique message identifier.
    pub id: MessageId,
    /// Room the message was sent in.
    pub room_id: RoomId,
    /// Identity of the sending participant.
    pub sender_id: UserId,
    /// Chat text, uninterpreted.
    pub text: String,
    /// ISO-8601 timestamp assigned at relay time.
    pub sent_at: String,
}

impl ChatMessage {
    /// Mint a new chat envelope with a fresh ID and the current UTC time.
    #[must_use]
    pub fn new(room_id: RoomId, sender_id: UserId, text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            room_id,
            sender_id,
            text: text.into(),
            sent_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        }
    }
}

/// Inbound frame from a client.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Bind an external identity to this connection.
    Auth {
        /// Identity to bind.
        user_id: UserId,
    },
    /// Enter the waiting pool and ask for a match.
    JoinWaiting {
        /// Bound identity, repeated for verification.
        user_id: UserId,
    },
    /// Leave the waiting pool without disconnecting.
    LeaveWaiting {
        /// Bound identity, repeated for verification.
        user_id: UserId,
    },
    /// Close the current room (if any) and look for a new partner.
    Next {
        /// Bound identity, repeated for verification.
        user_id: UserId,
    },
    /// Send chat text to the room partner.
    Message {
        /// Bound identity, repeated for verification.
        user_id: UserId,
        /// Target room.
        room_id: RoomId,
        /// Chat text.
        message: String,
    },
    /// Relay an opaque negotiation payload to the room partner.
    Signal {
        /// Bound identity, repeated for verification.
        user_id: UserId,
        /// Target room.
        room_id: RoomId,
        /// Opaque negotiation payload, passed through uninterpreted.
        signal: Value,
    },
    /// Report the other participant of a room for abuse.
    Report {
        /// Bound identity, repeated for verification.
        user_id: UserId,
        /// Room whose partner is being reported (active or recently closed).
        room_id: RoomId,
        /// Optional free-text reason.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Graceful close with full cleanup.
    Disconnect {
        /// Bound identity, repeated for verification.
        user_id: UserId,
    },
}

/// Outbound frame to a client.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Identity accepted; echoes the caller's own profile.
    AuthSuccess {
        /// The authenticated user's own profile.
        user: PublicProfile,
    },
    /// Queued in the waiting pool, no match yet.
    Waiting {
        /// Human-readable status line.
        message: String,
    },
    /// A room was formed with a partner.
    Match {
        /// Identity of the new room.
        room_id: RoomId,
        /// The other participant's public profile.
        partner: PublicProfile,
    },
    /// Chat delivered from the partner, or echoed back to the sender.
    Message {
        /// The canonical chat envelope.
        message: ChatMessage,
    },
    /// Negotiation payload relayed from the partner.
    Signal {
        /// Identity of the sending participant.
        user_id: UserId,
        /// Opaque negotiation payload.
        signal: Value,
    },
    /// The room partner disconnected or moved on.
    PartnerLeft,
    /// An abuse report was accepted.
    ReportAck,
    /// A request failed; the connection stays open.
    Error {
        /// Human-readable description of the failure.
        message: String,
    },
}

impl ClientMessage {
    /// The identity this frame claims to act as.
    ///
    /// Every inbound frame names its user; after authentication the claim
    /// must match the connection's bound identity.
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        match self {
            Self::Auth { user_id }
            | Self::JoinWaiting { user_id }
            | Self::LeaveWaiting { user_id }
            | Self::Next { user_id }
            | Self::Message { user_id, .. }
            | Self::Signal { user_id, .. }
            | Self::Report { user_id, .. }
            | Self::Disconnect { user_id } => user_id,
        }
    }
}

impl ServerMessage {
    /// Build an `error` frame.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Build the standard `waiting` frame.
    #[must_use]
    pub fn waiting() -> Self {
        Self::Waiting {
            message: "Waiting for a partner".to_owned(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
