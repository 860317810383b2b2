//! Frame dispatch — decodes inbound text as [`ClientMessage`] and routes it
//! to the switchboard.
//!
//! Success frames (`auth-success`, `waiting`, `match`, echoes, acks) are sent
//! by the switchboard itself; this layer only turns failures into `error`
//! frames for the sender.

use std::sync::Arc;

use tracing::{debug, warn};

use duet_core::{ClientMessage, ServerMessage};
use duet_switchboard::{ClientHandle, SwitchboardError};

use crate::server::AppState;

/// Result of handling one inbound frame.
pub struct HandleResult {
    /// The connection should close after this frame.
    pub close: bool,
    /// The frame tried to act as another identity or on a foreign room.
    pub suspicious: bool,
}

impl HandleResult {
    const CONTINUE: Self = Self {
        close: false,
        suspicious: false,
    };
}

/// Handle one inbound text frame.
pub async fn handle_frame(
    state: &AppState,
    handle: &Arc<ClientHandle>,
    text: &str,
) -> HandleResult {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(err) => {
            debug!(conn = %handle.conn_id, error = %err, "undecodable frame");
            let _ = handle.send(ServerMessage::error(format!("invalid message: {err}")));
            return HandleResult::CONTINUE;
        }
    };

    // Every frame names a user; once authenticated, the claim must match the
    // bound identity.
    if let Some(bound) = handle.user_id() {
        if *msg.user_id() != bound {
            warn!(
                conn = %handle.conn_id,
                claimed = %msg.user_id(),
                bound = %bound,
                "frame claims a different identity"
            );
            let _ = handle.send(ServerMessage::error(
                SwitchboardError::IdentityMismatch.to_string(),
            ));
            return HandleResult {
                close: false,
                suspicious: true,
            };
        }
    }

    let result = match msg {
        ClientMessage::Auth { user_id } => state
            .switchboard
            .authenticate(handle, user_id)
            .await
            .map(|_| ()),
        ClientMessage::JoinWaiting { .. } => state.switchboard.join_waiting(handle),
        ClientMessage::LeaveWaiting { .. } => state.switchboard.leave_waiting(handle),
        ClientMessage::Next { .. } => state.switchboard.next_partner(handle),
        ClientMessage::Message {
            room_id, message, ..
        } => state.switchboard.relay_chat(handle, room_id, message),
        ClientMessage::Signal {
            room_id, signal, ..
        } => state.switchboard.relay_signal(handle, room_id, signal),
        ClientMessage::Report {
            room_id, reason, ..
        } => state.switchboard.report_partner(handle, room_id, reason).await,
        ClientMessage::Disconnect { .. } => {
            state.switchboard.disconnect(handle).await;
            return HandleResult {
                close: true,
                suspicious: false,
            };
        }
    };

    match result {
        Ok(()) => HandleResult::CONTINUE,
        Err(err) => {
            debug!(
                conn = %handle.conn_id,
                category = err.category(),
                error = %err,
                "request rejected"
            );
            let suspicious = err.is_suspicious();
            let _ = handle.send(ServerMessage::error(err.to_string()));
            HandleResult {
                close: false,
                suspicious,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use metrics_exporter_prometheus::PrometheusBuilder;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use duet_core::UserId;
    use duet_directory::{Directory, MemoryDirectory, UserProfile};
    use duet_switchboard::{Switchboard, client_channel};

    use crate::config::ServerConfig;
    use crate::shutdown::ShutdownCoordinator;

    fn make_state() -> AppState {
        let directory: Arc<dyn Directory> = Arc::new(MemoryDirectory::new([
            UserProfile {
                id: UserId::from("u_1"),
                display_name: "ada".to_owned(),
                verified: true,
            },
            UserProfile {
                id: UserId::from("u_2"),
                display_name: "kim".to_owned(),
                verified: true,
            },
        ]));
        AppState {
            switchboard: Arc::new(Switchboard::new(directory)),
            config: Arc::new(ServerConfig::default()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics: PrometheusBuilder::new().build_recorder().handle(),
            start_time: Instant::now(),
        }
    }

    fn make_client() -> (Arc<ClientHandle>, mpsc::Receiver<ServerMessage>) {
        client_channel(16, CancellationToken::new())
    }

    async fn authed_client(
        state: &AppState,
        id: &str,
    ) -> (Arc<ClientHandle>, mpsc::Receiver<ServerMessage>) {
        let (handle, mut rx) = make_client();
        let frame = format!(r#"{{"type": "auth", "userId": "{id}"}}"#);
        let result = handle_frame(state, &handle, &frame).await;
        assert!(!result.close);
        let first = rx.try_recv().expect("auth-success");
        assert!(matches!(first, ServerMessage::AuthSuccess { .. }));
        (handle, rx)
    }

    #[tokio::test]
    async fn garbage_frame_yields_error_not_close() {
        let state = make_state();
        let (handle, mut rx) = make_client();

        let result = handle_frame(&state, &handle, "not json").await;
        assert!(!result.close);
        assert!(!result.suspicious);
        match rx.try_recv().unwrap() {
            ServerMessage::Error { message } => assert!(message.contains("invalid message")),
            other => panic!("expected error frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn request_before_auth_is_rejected() {
        let state = make_state();
        let (handle, mut rx) = make_client();

        let frame = r#"{"type": "join-waiting", "userId": "u_1"}"#;
        let result = handle_frame(&state, &handle, frame).await;
        assert!(!result.close);
        match rx.try_recv().unwrap() {
            ServerMessage::Error { message } => {
                assert_eq!(message, "authentication required");
            }
            other => panic!("expected error frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn auth_binds_and_acks() {
        let state = make_state();
        let (_handle, _rx) = authed_client(&state, "u_1").await;
        assert_eq!(state.switchboard.stats().connections, 1);
    }

    #[tokio::test]
    async fn frame_for_another_identity_is_suspicious() {
        let state = make_state();
        let (handle, mut rx) = authed_client(&state, "u_1").await;

        let frame = r#"{"type": "join-waiting", "userId": "u_2"}"#;
        let result = handle_frame(&state, &handle, frame).await;
        assert!(result.suspicious);
        assert!(!result.close);
        match rx.try_recv().unwrap() {
            ServerMessage::Error { message } => {
                assert!(message.contains("identity"));
            }
            other => panic!("expected error frame, got {other:?}"),
        }
        // The impersonated frame must not act on the pool.
        assert_eq!(state.switchboard.stats().waiting, 0);
    }

    #[tokio::test]
    async fn disconnect_frame_requests_close() {
        let state = make_state();
        let (handle, _rx) = authed_client(&state, "u_1").await;

        let frame = r#"{"type": "disconnect", "userId": "u_1"}"#;
        let result = handle_frame(&state, &handle, frame).await;
        assert!(result.close);
        assert_eq!(state.switchboard.stats().connections, 0);
    }

    #[tokio::test]
    async fn join_then_join_from_partner_pairs_both() {
        let state = make_state();
        let (h1, mut rx1) = authed_client(&state, "u_1").await;
        let (h2, mut rx2) = authed_client(&state, "u_2").await;

        let join1 = r#"{"type": "join-waiting", "userId": "u_1"}"#;
        let _ = handle_frame(&state, &h1, join1).await;
        assert!(matches!(
            rx1.try_recv().unwrap(),
            ServerMessage::Waiting { .. }
        ));

        let join2 = r#"{"type": "join-waiting", "userId": "u_2"}"#;
        let _ = handle_frame(&state, &h2, join2).await;
        assert!(matches!(rx1.try_recv().unwrap(), ServerMessage::Match { .. }));
        assert!(matches!(rx2.try_recv().unwrap(), ServerMessage::Match { .. }));
    }

    #[tokio::test]
    async fn signal_to_unknown_room_reports_resolution_error() {
        let state = make_state();
        let (handle, mut rx) = authed_client(&state, "u_1").await;

        let frame = r#"{"type": "signal", "userId": "u_1", "roomId": "r_404", "signal": {}}"#;
        let result = handle_frame(&state, &handle, frame).await;
        assert!(!result.close);
        assert!(!result.suspicious, "an unknown room is not impersonation");
        match rx.try_recv().unwrap() {
            ServerMessage::Error { message } => {
                assert!(message.contains("room not found"));
            }
            other => panic!("expected error frame, got {other:?}"),
        }
    }
}
