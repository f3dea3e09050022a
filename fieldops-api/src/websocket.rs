use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, Query,
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing;

use crate::auth::authenticate;
use crate::state::ApiState;

#[derive(Deserialize)]
pub struct WsQuery {
    token: String,
}

/// Browsers cannot set headers on a websocket handshake, so the token
/// travels in the query string.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Extension(state): Extension<ApiState>,
    Query(query): Query<WsQuery>,
) -> Response {
    let auth = match authenticate(&state, &query.token).await {
        Ok(auth) => auth,
        Err(e) => return e.into_response(),
    };
    let user_id = auth.user.id;
    ws.on_upgrade(move |socket| handle_socket(socket, user_id, state))
}

async fn handle_socket(socket: WebSocket, user_id: String, state: ApiState) {
    tracing::info!("WebSocket connection established for user: {}", user_id);

    let (mut sender, mut receiver) = socket.split();
    let mut live = state.live.subscribe();

    let unread = state.notifications.get_unread_count(&user_id).await;
    let hello = json!({ "type": "unread_count", "count": unread }).to_string();
    if sender.send(Message::Text(hello)).await.is_err() {
        return;
    }

    let user_send = user_id.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            match live.recv().await {
                Ok(notification) => {
                    if notification.user_id != user_send {
                        continue;
                    }
                    let frame = json!({ "type": "notification", "notification": notification });
                    if let Err(e) = sender.send(Message::Text(frame.to_string())).await {
                        tracing::debug!("Failed to send WebSocket message: {}", e);
                        return;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("WebSocket for {} lagged, skipped {} notifications", user_send, skipped);
                }
                Err(RecvError::Closed) => return,
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) | Err(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::info!("WebSocket connection closed for user: {}", user_id);
}
