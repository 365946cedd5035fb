//! WebSocket push endpoint of the development server
//!
//! Every connection receives the shared feed. Inbound `auth` envelopes are
//! verified and answered with `auth_ok` or `auth_error`; inbound updates on a
//! known topic are validated and republished to all clients.

use crate::auth::DevToken;
use crate::server::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use harvest_client::{Envelope, Topic, Update, AUTH_TOPIC};
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const AUTH_OK: &str = "auth_ok";
pub const AUTH_ERROR: &str = "auth_error";

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();

    let mut feed = state.feed.subscribe();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<Envelope>();

    info!(conn_id = %conn_id, "WebSocket client connected");

    let send_task = tokio::spawn(async move {
        loop {
            let envelope = tokio::select! {
                reply = reply_rx.recv() => match reply {
                    Some(envelope) => envelope,
                    None => break,
                },
                published = feed.recv() => match published {
                    Ok(envelope) => envelope,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(conn_id = %conn_id, skipped, "Client lagging, updates dropped");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };

            let text = match serde_json::to_string(&envelope) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Failed to encode envelope");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg_result) = receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                handle_client_envelope(text.as_bytes(), conn_id, &state, &reply_tx)
            }
            Ok(Message::Binary(data)) => handle_client_envelope(&data, conn_id, &state, &reply_tx),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    debug!(conn_id = %conn_id, "WebSocket client disconnected");
    send_task.abort();
}

fn handle_client_envelope(
    bytes: &[u8],
    conn_id: Uuid,
    state: &AppState,
    reply: &mpsc::UnboundedSender<Envelope>,
) {
    let envelope: Envelope = match serde_json::from_slice(bytes) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(conn_id = %conn_id, error = %e, "Malformed client message");
            return;
        }
    };

    if envelope.kind == AUTH_TOPIC {
        let _ = reply.send(authenticate(&envelope, conn_id, state));
        return;
    }

    if envelope.kind.parse::<Topic>().is_err() {
        debug!(conn_id = %conn_id, kind = %envelope.kind, "Ignoring client message");
        return;
    }

    match Update::from_envelope(envelope.clone()) {
        Ok(update) => {
            debug!(conn_id = %conn_id, topic = %update.topic(), "Republishing client update");
            let _ = state.feed.send(envelope);
        }
        Err(e) => warn!(conn_id = %conn_id, error = %e, "Rejected client update"),
    }
}

fn authenticate(envelope: &Envelope, conn_id: Uuid, state: &AppState) -> Envelope {
    let token = envelope.data.get("token").and_then(|token| token.as_str()).unwrap_or_default();

    match DevToken::parse(token, &state.token_secret) {
        Ok(token) => {
            info!(
                conn_id = %conn_id,
                user_id = %token.user_id(),
                role = %token.role(),
                "WebSocket client authenticated"
            );
            Envelope::new(AUTH_OK, json!({ "userId": token.user_id(), "role": token.role() }))
        }
        Err(e) => {
            warn!(conn_id = %conn_id, error = %e, "WebSocket authentication failed");
            Envelope::new(AUTH_ERROR, json!({ "message": e.to_string() }))
        }
    }
}
