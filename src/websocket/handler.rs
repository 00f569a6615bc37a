use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    middleware::AuthUser,
    state::AppState,
    websocket::types::{ClientMessage, ErrorPayload, WsMessage},
};

use super::connection::WsSender;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Chat event socket. Server pushes `message_*` and `conversation_read`
/// frames; the client only sends keep-alives.
#[utoipa::path(
    get,
    path = "/api/ws",
    tag = "realtime",
    params(("token" = Option<String>, Query, description = "JWT, for clients that cannot set headers")),
    responses(
        (status = 101, description = "Switching protocols"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = []))
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, user_id, state))
}

async fn handle_socket(socket: WebSocket, user_id: Uuid, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();

    let connection_id = state.connections.add_connection(user_id, tx.clone());

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::error!(error = %e, "failed to encode ws frame"),
            }
        }
    });

    let tx_clone = tx.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if let Err(e) = process_client_message(&text, &tx_clone) {
                        tracing::debug!(user = %user_id, error = %e, "bad client frame");
                        let _ = tx_clone.send(WsMessage::Error(ErrorPayload {
                            message: e.to_string(),
                        }));
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    let tx_heartbeat = tx.clone();
    let mut heartbeat_task = tokio::spawn(async move {
        let mut interval = heartbeat_timer(HEARTBEAT_INTERVAL);
        loop {
            interval.tick().await;
            if tx_heartbeat.send(WsMessage::Ping).is_err() {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
            heartbeat_task.abort();
        },
        _ = &mut recv_task => {
            send_task.abort();
            heartbeat_task.abort();
        },
        _ = &mut heartbeat_task => {
            send_task.abort();
            recv_task.abort();
        }
    }

    state.connections.remove_connection(&user_id, connection_id);
    tracing::info!(user = %user_id, "chat socket closed");
}

fn process_client_message(text: &str, tx: &WsSender) -> Result<()> {
    let client_msg: ClientMessage = serde_json::from_str(text)
        .map_err(|e| AppError::BadRequest(format!("Invalid message format: {}", e)))?;

    match client_msg {
        ClientMessage::Ping => {
            let _ = tx.send(WsMessage::Pong);
        }
        ClientMessage::Pong => {}
    }

    Ok(())
}

/// First tick lands one period after connect, not on connect.
fn heartbeat_timer(period: Duration) -> tokio::time::Interval {
    tokio::time::interval_at(tokio::time::Instant::now() + period, period)
}
