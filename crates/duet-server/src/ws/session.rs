//! `WebSocket` session lifecycle — handles a single connected client from
//! upgrade through disconnect.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use duet_core::ServerMessage;
use duet_switchboard::{ClientHandle, SessionState, client_channel};

use crate::metrics::{
    AUTH_TIMEOUTS_TOTAL, CONNECTION_DURATION_SECONDS, CONNECTIONS_ACTIVE, CONNECTIONS_TOTAL,
};
use crate::server::AppState;

use super::handler;

/// Missed ping cycles tolerated before a client is considered dead.
const STALE_PING_CYCLES: u32 = 3;

/// Suspicious frames on one connection before a warning is logged.
const SUSPICIOUS_FRAME_WARN: u32 = 3;

/// Run a `WebSocket` session for a connected client.
///
/// 1. Enforces the authentication window on fresh connections
/// 2. Dispatches inbound frames through the switchboard
/// 3. Drains the typed outbound queue into the socket, with periodic pings
/// 4. Evicts unresponsive and hopelessly slow clients
/// 5. Runs full switchboard cleanup on every exit path
#[instrument(skip_all, fields(conn, user))]
pub async fn run(socket: WebSocket, state: AppState) {
    let (ws_tx, mut ws_rx) = socket.split();
    let (handle, rx) = client_channel(
        state.config.outbound_buffer,
        state.shutdown.token().child_token(),
    );
    let _ = tracing::Span::current().record("conn", handle.conn_id.as_str());

    let started = Instant::now();
    counter!(CONNECTIONS_TOTAL).increment(1);
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
    info!("client connected");

    let writer = tokio::spawn(write_loop(ws_tx, rx, Arc::clone(&handle), state.clone()));

    let auth_deadline = tokio::time::sleep(state.config.auth_timeout());
    tokio::pin!(auth_deadline);
    let close_signal = handle.close_signal();
    let mut suspicious_frames = 0u32;
    let mut user_recorded = false;

    loop {
        tokio::select! {
            () = &mut auth_deadline, if handle.state() == SessionState::Connected => {
                counter!(AUTH_TIMEOUTS_TOTAL).increment(1);
                info!("authentication window elapsed");
                let _ = handle.send(ServerMessage::error("authentication required"));
                break;
            }
            () = close_signal.cancelled() => break,
            frame = ws_rx.next() => {
                let Some(Ok(frame)) = frame else { break };
                let text = match frame {
                    Message::Text(text) => text.to_string(),
                    // Tolerate clients that put JSON in binary frames.
                    Message::Binary(data) => match String::from_utf8(data.to_vec()) {
                        Ok(text) => text,
                        Err(_) => {
                            debug!(len = data.len(), "ignoring non-UTF8 binary frame");
                            continue;
                        }
                    },
                    Message::Close(_) => {
                        debug!("client sent close frame");
                        break;
                    }
                    Message::Ping(_) | Message::Pong(_) => {
                        handle.mark_alive();
                        continue;
                    }
                };

                let result = handler::handle_frame(&state, &handle, &text).await;
                if !user_recorded {
                    if let Some(user) = handle.user_id() {
                        let _ = tracing::Span::current().record("user", user.as_str());
                        user_recorded = true;
                    }
                }
                if result.suspicious {
                    suspicious_frames += 1;
                    if suspicious_frames == SUSPICIOUS_FRAME_WARN {
                        warn!(
                            count = suspicious_frames,
                            "repeated frames for identities or rooms not theirs"
                        );
                    }
                }
                if result.close {
                    break;
                }
            }
        }
    }

    // Cleanup is idempotent, so running it on every exit path is safe even
    // when the frame handler already disconnected us.
    state.switchboard.disconnect(&handle).await;
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    info!("client disconnected");
    let _ = writer.await;
}

/// Drain the outbound queue into the socket.
///
/// Also sends periodic pings, evicts clients that stop answering them or
/// fall too far behind, and on close flushes already-queued frames before
/// the close frame so a final `partner-left` or error still arrives.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<ServerMessage>,
    handle: Arc<ClientHandle>,
    state: AppState,
) {
    let ping_interval = state.config.ping_interval();
    let pong_deadline = ping_interval * STALE_PING_CYCLES;
    let mut ping = tokio::time::interval(ping_interval);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let _ = ping.tick().await; // skip the immediate first tick
    let closing = handle.close_signal();

    loop {
        tokio::select! {
            out = rx.recv() => {
                match out {
                    Some(msg) => {
                        if !write_frame(&mut ws_tx, &msg).await {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = ping.tick() => {
                if handle.last_pong_elapsed() > pong_deadline {
                    warn!(conn = %handle.conn_id, "client unresponsive, disconnecting");
                    break;
                }
                if handle.drop_count() > state.config.max_dropped_messages {
                    warn!(
                        conn = %handle.conn_id,
                        dropped = handle.drop_count(),
                        "client falling behind, disconnecting"
                    );
                    break;
                }
                if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }
            () = closing.cancelled() => {
                while let Ok(msg) = rx.try_recv() {
                    if !write_frame(&mut ws_tx, &msg).await {
                        break;
                    }
                }
                if state.shutdown.is_shutting_down() {
                    let _ = write_frame(&mut ws_tx, &ServerMessage::error("server shutting down"))
                        .await;
                }
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
        }
    }
    // Unblock the read side whichever way this loop ended.
    handle.close();
}

async fn write_frame(ws_tx: &mut SplitSink<WebSocket, Message>, msg: &ServerMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => ws_tx.send(Message::Text(json.into())).await.is_ok(),
        Err(err) => {
            error!(error = %err, "failed to serialize outbound frame");
            true
        }
    }
}
