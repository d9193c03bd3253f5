//! Real-time WebSocket endpoint
//!
//! `GET /ws` authenticates the request with an access token, upgrades it, and
//! hands the socket to the connection hub. The token is read from the
//! `Authorization` header (raw or `Bearer <token>`), falling back to the
//! `token` query parameter for browser clients that cannot set headers.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use circle_hub::{Frame, UserId};
use futures::{future, SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::auth::auth_error_to_response;
use super::ErrorResponse;
use crate::auth::AuthError;
use crate::server::AppState;

/// Create the WebSocket router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .with_state(state)
}

/// Query parameters for the upgrade request
#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// Extract the access token from the request.
fn extract_token(headers: &HeaderMap, query: &WsQuery) -> Option<String> {
    let from_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).trim())
        .filter(|v| !v.is_empty());

    from_header
        .map(str::to_string)
        .or_else(|| query.token.clone().filter(|t| !t.is_empty()))
}

/// GET /ws
///
/// Authentication is checked before the upgrade so that rejected clients get a
/// plain HTTP error instead of an opened-then-closed socket.
async fn websocket_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let token = match extract_token(&headers, &query) {
        Some(token) => token,
        None => {
            warn!("WebSocket request without access token");
            return auth_error_to_response(AuthError::MissingToken).into_response();
        }
    };

    let claims = match state.tokens.validate(&token) {
        Ok(claims) => claims,
        Err(err) => {
            warn!("WebSocket auth failed: {}", err);
            return auth_error_to_response(err).into_response();
        }
    };
    let user_id = UserId(claims.user_id);

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            warn!(user_id = %user_id, "WebSocket upgrade failed: {}", rejection);
            return ErrorResponse::new("upgrade_failed", &rejection.body_text())
                .with_status(StatusCode::BAD_REQUEST)
                .into_response();
        }
    };

    info!(user_id = %user_id, email = %claims.email, "WebSocket connection authenticated");
    upgrade
        .on_failed_upgrade(move |e| warn!(user_id = %user_id, error = %e, "WebSocket upgrade failed"))
        .on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

/// Bridge an upgraded socket to the hub until the connection closes.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user_id: UserId) {
    let (sink, stream) = socket.split();

    let inbound = stream.filter_map(|message| future::ready(message_to_frame(message)));
    let outbound =
        sink.with(|frame: Frame| future::ready(Ok::<Message, axum::Error>(frame_to_message(frame))));

    let summary = state.hub.serve(user_id, inbound, outbound).await;
    debug!(
        user_id = %user_id,
        connection_id = %summary.connection_id,
        reason = %summary.reason,
        "WebSocket connection finished"
    );
}

/// Map a socket message to a hub frame. Ping and pong are handled by the socket.
fn message_to_frame(message: Result<Message, axum::Error>) -> Option<Result<Frame, axum::Error>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(Frame::Text(text))),
        Ok(Message::Binary(data)) => Some(Ok(Frame::Binary(data))),
        Ok(Message::Close(_)) => Some(Ok(Frame::Close)),
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
        Err(e) => Some(Err(e)),
    }
}

fn frame_to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text),
        Frame::Binary(data) => Message::Binary(data),
        Frame::Close => Message::Close(None),
    }
}
