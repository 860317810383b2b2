//! In-room relay: chat text, opaque signaling payloads, abuse reports.
//!
//! The switchboard never interprets relayed content. Chat gets a canonical
//! envelope minted server-side; signals pass through byte-for-byte. Both are
//! addressed by room, resolved against the live room table, and delivered
//! best-effort — a vanished partner is a log line, not a sender error.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use duet_core::{ChatMessage, RoomId, ServerMessage, UserId};
use duet_directory::AbuseReport;

use crate::client::ClientHandle;
use crate::errors::{SwitchboardError, SwitchboardResult};
use crate::metrics::{CHAT_MESSAGES_TOTAL, REPORTS_TOTAL, SIGNALS_TOTAL};
use crate::switchboard::Switchboard;

impl Switchboard {
    /// Relay chat text to the sender's partner in `room_id`.
    ///
    /// The envelope (message id, timestamp) is minted once and the identical
    /// copy goes to both sides: the partner as delivery, the sender as the
    /// echo confirming it.
    pub fn relay_chat(
        &self,
        handle: &Arc<ClientHandle>,
        room_id: RoomId,
        text: String,
    ) -> SwitchboardResult<()> {
        let sender = handle.user_id().ok_or(SwitchboardError::NotAuthenticated)?;
        let partner = self.partner_in_active_room(&sender, &room_id)?;

        let message = ChatMessage::new(room_id, sender, text);
        if !self.registry.send_to(
            &partner,
            ServerMessage::Message {
                message: message.clone(),
            },
        ) {
            debug!(partner = %partner, "chat not delivered; partner unreachable");
        }
        let _ = handle.send(ServerMessage::Message { message });
        metrics::counter!(CHAT_MESSAGES_TOTAL).increment(1);
        Ok(())
    }

    /// Relay an opaque signaling payload to the sender's partner in `room_id`.
    ///
    /// No echo here: signaling protocols carry their own acknowledgement
    /// semantics end to end.
    pub fn relay_signal(
        &self,
        handle: &Arc<ClientHandle>,
        room_id: RoomId,
        signal: Value,
    ) -> SwitchboardResult<()> {
        let sender = handle.user_id().ok_or(SwitchboardError::NotAuthenticated)?;
        let partner = self.partner_in_active_room(&sender, &room_id)?;

        if !self.registry.send_to(
            &partner,
            ServerMessage::Signal {
                user_id: sender,
                signal,
            },
        ) {
            debug!(partner = %partner, "signal not delivered; partner unreachable");
        }
        metrics::counter!(SIGNALS_TOTAL).increment(1);
        Ok(())
    }

    /// File an abuse report against the sender's partner in `room_id`.
    ///
    /// Reports stay valid after the room closes — the typical report arrives
    /// right after a bad encounter ended — so tombstoned rooms resolve here,
    /// only rooms the sender never sat in are rejected.
    pub async fn report_partner(
        &self,
        handle: &Arc<ClientHandle>,
        room_id: RoomId,
        reason: Option<String>,
    ) -> SwitchboardResult<()> {
        let reporter = handle.user_id().ok_or(SwitchboardError::NotAuthenticated)?;
        let reported = {
            let st = self.state.lock();
            let room = st
                .rooms
                .get(&room_id)
                .ok_or_else(|| SwitchboardError::RoomNotFound(room_id.clone()))?;
            room.partner_of(&reporter)
                .cloned()
                .ok_or_else(|| SwitchboardError::NotAParticipant(room_id.clone()))?
        };

        self.directory
            .submit_report(AbuseReport {
                reporter: reporter.clone(),
                reported: reported.clone(),
                room_id,
                reason,
                reported_at: Utc::now(),
            })
            .await?;
        metrics::counter!(REPORTS_TOTAL).increment(1);
        warn!(reporter = %reporter, reported = %reported, "abuse report filed");
        let _ = handle.send(ServerMessage::ReportAck);
        Ok(())
    }

    /// Resolve the sender's partner in a room that must still be active.
    ///
    /// Resolution order matters for the error a client sees: an unknown room
    /// and a closed room are reported as such even to non-participants; only
    /// an active foreign room is an authorization failure.
    fn partner_in_active_room(
        &self,
        sender: &UserId,
        room_id: &RoomId,
    ) -> SwitchboardResult<UserId> {
        let st = self.state.lock();
        let room = st
            .rooms
            .get(room_id)
            .ok_or_else(|| SwitchboardError::RoomNotFound(room_id.clone()))?;
        if !room.active {
            return Err(SwitchboardError::RoomInactive(room_id.clone()));
        }
        room.partner_of(sender)
            .cloned()
            .ok_or_else(|| SwitchboardError::NotAParticipant(room_id.clone()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
