use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use super::auth::AuthUser;
use crate::db::DirectMessage;
use crate::AppState;

/// WebSocket endpoint streaming direct messages addressed to the caller.
/// GET /messages/ws?token=...
pub async fn messages_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_message_stream(socket, state, user))
}

fn message_frame(message: &DirectMessage) -> String {
    serde_json::json!({ "type": "message", "message": message }).to_string()
}

async fn handle_message_stream(socket: WebSocket, state: Arc<AppState>, user: AuthUser) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before announcing readiness so nothing published after the
    // ready frame is missed
    let mut room = state.relay.subscribe(&user.id);
    tracing::debug!(identity_id = %user.id, "Relay subscriber connected");

    let ready = serde_json::json!({ "type": "ready", "room": user.id }).to_string();
    if sender.send(Message::Text(ready)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            relayed = room.recv() => {
                match relayed {
                    Ok(message) => {
                        if sender.send(Message::Text(message_frame(&message))).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // The client can reload the conversation to catch up
                        let notice = serde_json::json!({ "type": "lagged", "skipped": skipped }).to_string();
                        if sender.send(Message::Text(notice)).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            // Handle incoming messages (for ping/pong or close)
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    tracing::debug!(identity_id = %user.id, "Relay subscriber disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_frame_shape() {
        let message = DirectMessage::new("s1".into(), "a1".into(), "hello".into());
        let frame: serde_json::Value = serde_json::from_str(&message_frame(&message)).unwrap();
        assert_eq!(frame["type"], "message");
        assert_eq!(frame["message"]["fromUser"], "s1");
        assert_eq!(frame["message"]["toUser"], "a1");
        assert_eq!(frame["message"]["content"], "hello");
    }
}
