//! Axum WebSocket transport
//!
//! Credentials are checked before the upgrade so a bad token costs an
//! HTTP 401 instead of an open-then-closed socket. After the upgrade the
//! socket splits into a send task draining the session channel and a
//! receive loop dispatching client frames into the hub.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use parley_shared::UserId;

use crate::events::{ClientEvent, ServerEvent};
use crate::hub::ConnectionHub;

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    /// Bearer credential; the `Authorization` header wins when both are set
    token: Option<String>,
}

/// Build the gateway router
pub fn router(hub: Arc<ConnectionHub>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(hub)
}

/// `GET /ws` upgrade endpoint
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(hub): State<Arc<ConnectionHub>>,
    Query(params): Query<GatewayQuery>,
    headers: HeaderMap,
) -> Result<Response, StatusCode> {
    let Some(credential) = bearer_credential(&headers, params.token) else {
        warn!("websocket upgrade refused: no credential");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let user = match hub.authenticate(&credential).await {
        Ok(user) => user,
        Err(error) => {
            warn!(%error, "websocket upgrade refused");
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, user.user_id, hub)))
}

/// Prefer the `Authorization: Bearer` header, fall back to `?token=`
fn bearer_credential(headers: &HeaderMap, query_token: Option<String>) -> Option<String> {
    let header_token = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string);
    header_token
        .or(query_token)
        .filter(|token| !token.is_empty())
}

async fn handle_socket(socket: WebSocket, user_id: UserId, hub: Arc<ConnectionHub>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let connection = hub.register(user_id, tx).await;

    // Drain the session channel onto the socket
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(error) => {
                    warn!(%error, "dropping unserializable server event");
                }
            }
        }
    });

    while let Some(Ok(message)) = ws_receiver.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => hub.handle_event(&connection, event).await,
                Err(error) => {
                    debug!(user_id = %user_id, %error, "malformed client frame");
                    let _ = connection.send(ServerEvent::Error {
                        message: "Invalid event format".to_string(),
                    });
                }
            },
            Message::Close(_) => break,
            // Transport-level pings are answered by axum; presence runs on
            // application heartbeats instead
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => {}
        }
    }

    hub.disconnect(&connection).await;
    send_task.abort();
}
