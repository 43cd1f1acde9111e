//! Room WebSocket: upgrade, admission, and the per-socket read/write loops.

use axum::{
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use securechat_core::{
    ClientEvent, ConnId, Connection, ErrorCode, EventError, Outbound, ServerEvent, ValidationError,
    sanitize,
};

use crate::RelayState;

/// Query string of `/ws/{room_id}/{username}`.
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    /// Room password.
    #[serde(default)]
    pub pwd: String,
    /// Handshake token from POST /api/handshake.
    #[serde(default)]
    pub token: String,
}

/// A connection that made it into a room.
struct Admission {
    room_id: String,
    name: String,
    conn: ConnId,
    outbound: mpsc::Receiver<Outbound>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path((room_id, username)): Path<(String, String)>,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<RelayState>>,
) -> impl IntoResponse {
    // Attachments travel as data URLs inside one text frame.
    let max_frame = state.registry.limits().max_attachment_len + 64 * 1024;
    ws.max_message_size(max_frame)
        .on_upgrade(move |socket| handle_connection(socket, state, room_id, username, params))
}

/// Token, input validation, then the registry's own gating. Any failure is
/// returned as the `error` event to send before closing.
async fn admit(
    state: &RelayState,
    raw_room: &str,
    raw_name: &str,
    params: &ConnectParams,
) -> Result<Admission, ServerEvent> {
    let invalid = |e: ValidationError| ServerEvent::error(ErrorCode::InvalidInput, e.to_string());

    let name = sanitize::username(raw_name).map_err(invalid)?;
    if !state.tokens.verify(&params.token, &name) {
        return Err(ServerEvent::error(
            ErrorCode::InvalidToken,
            "Handshake token is missing, expired or was issued to someone else.",
        ));
    }
    let room_id = sanitize::room_id(raw_room).map_err(invalid)?;
    let limits = state.registry.limits();
    sanitize::secret(&params.pwd, limits.min_secret_len, limits.max_secret_len).map_err(invalid)?;

    let (conn, outbound) = Connection::channel(limits.outbound_queue);
    let conn_id = conn.id();
    state
        .registry
        .join(conn, &room_id, &name, &params.pwd)
        .await
        .map_err(|e| ServerEvent::error(e.code(), e.to_string()))?;

    Ok(Admission {
        room_id,
        name,
        conn: conn_id,
        outbound,
    })
}

/// Handle a single room WebSocket from upgrade to departure.
pub async fn handle_connection(
    socket: WebSocket,
    state: Arc<RelayState>,
    room_id: String,
    username: String,
    params: ConnectParams,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let Admission {
        room_id,
        name,
        conn,
        mut outbound,
    } = match admit(&state, &room_id, &username, &params).await {
        Ok(admission) => admission,
        Err(event) => {
            info!("refused '{username}' for room '{room_id}': {event:?}");
            if let Ok(json) = serde_json::to_string(&event) {
                let _ = ws_tx.send(Message::Text(json.into())).await;
            }
            let _ = ws_tx.close().await;
            return;
        }
    };

    // Drain the room's queue into the socket. A stalled send ends the
    // writer, which closes the queue and gets this member evicted.
    let send_timeout = state.config.send_timeout();
    let writer_name = name.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(Outbound::Event(event)) = outbound.recv().await {
            let json = match serde_json::to_string(&*event) {
                Ok(json) => json,
                Err(e) => {
                    error!("failed to encode event: {e}");
                    continue;
                }
            };
            match tokio::time::timeout(send_timeout, ws_tx.send(Message::Text(json.into()))).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!("send to '{writer_name}' failed: {e}");
                    break;
                }
                Err(_) => {
                    warn!("send to '{writer_name}' timed out after {send_timeout:?}");
                    break;
                }
            }
            // Kicks are enforced here: deliver the notice, then hang up.
            if matches!(&*event, ServerEvent::Kicked { target } if *target == writer_name) {
                info!("closing socket of kicked member '{writer_name}'");
                break;
            }
        }
        let _ = tokio::time::timeout(send_timeout, ws_tx.close()).await;
    });

    // Read incoming events from the client.
    let registry = state.registry.clone();
    let reader_room = room_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Text(text) => {
                    let event = match ClientEvent::parse(text.as_str()) {
                        Ok(event) => event,
                        Err(e) => {
                            match registry.reject_unparsed(&reader_room, conn, format!("unrecognized event: {e}")).await {
                                EventError::NotMember(_) => break,
                                e => debug!("frame from {conn} rejected: {e}"),
                            }
                            continue;
                        }
                    };
                    match registry.dispatch(&reader_room, conn, event).await {
                        Ok(()) => {}
                        // Evicted (e.g. too slow); nothing left to serve.
                        Err(EventError::NotMember(_)) => break,
                        Err(e) => debug!("event from {conn} rejected: {e}"),
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either side to finish.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.registry.leave(&room_id, conn).await;
    info!("'{name}' disconnected from room '{room_id}'");
}
