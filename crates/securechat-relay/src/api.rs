//! HTTP API used by the web client before it opens a room socket.
//!
//! Endpoints:
//! - POST /api/verify-room: pre-flight password check (never creates a room)
//! - POST /api/handshake: issue a single-use WebSocket token
//! - GET  /api/status: liveness and active room count

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use securechat_core::sanitize;

use crate::RelayState;
use crate::auth;

/// Request body for POST /api/verify-room.
#[derive(Debug, Deserialize)]
pub struct VerifyRoomRequest {
    pub room_id: String,
    #[serde(default)]
    pub password: String,
}

/// `{"status":"ok"}` / `{"status":"fail","message":...}` with extra fields
/// per endpoint.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub expires_in: Option<u64>,
}

impl ApiResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            message: None,
            token: None,
            expires_in: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            status: "fail".to_string(),
            message: Some(message.into()),
            token: None,
            expires_in: None,
        }
    }
}

/// Response for GET /api/status.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub active_rooms: usize,
    pub pending_handshakes: usize,
    pub uptime_secs: u64,
}

/// POST /api/verify-room: would this password get me into this room?
pub async fn verify_room(
    State(state): State<Arc<RelayState>>,
    Json(req): Json<VerifyRoomRequest>,
) -> Json<ApiResponse> {
    let room_id = match sanitize::room_id(&req.room_id) {
        Ok(id) => id,
        Err(e) => return Json(ApiResponse::fail(e.to_string())),
    };
    let limits = state.registry.limits();
    if let Err(e) = sanitize::secret(&req.password, limits.min_secret_len, limits.max_secret_len) {
        return Json(ApiResponse::fail(e.to_string()));
    }

    if state.registry.verify_room(&room_id, &req.password).await {
        Json(ApiResponse::ok())
    } else {
        debug!("pre-flight password mismatch for room '{room_id}'");
        Json(ApiResponse::fail("Invalid password for this room."))
    }
}

/// POST /api/handshake: token for the identity the auth service vouched for.
pub async fn handshake(State(state): State<Arc<RelayState>>, headers: HeaderMap) -> impl IntoResponse {
    let Some(identity) = auth::asserted_identity(&headers, &state.config.auth.identity_header) else {
        warn!("handshake requested without a verified identity");
        return (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::fail("Not authenticated.")),
        );
    };

    let token = state.tokens.issue(&identity);
    let mut body = ApiResponse::ok();
    body.token = Some(token);
    body.expires_in = Some(state.tokens.ttl().as_secs());
    (StatusCode::OK, Json(body))
}

/// GET /api/status
pub async fn status(State(state): State<Arc<RelayState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "running".to_string(),
        active_rooms: state.registry.room_count().await,
        pending_handshakes: state.tokens.pending(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

pub async fn health() -> &'static str {
    "ok"
}
