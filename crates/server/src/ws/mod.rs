//! WebSocket connection lifecycle.
//!
//! One persistent full-duplex channel per authenticated client. The user
//! identity is resolved from the session token at upgrade time and carried
//! as connection metadata, never taken from message payloads.
//!
//! Each connection runs as a pair of tasks: a writer task that owns the
//! sink and drains the connection's event channel, and the reader loop
//! below that watches for close/disconnect. Registering the connection and
//! broadcasting presence happen before any event can be delivered; closing
//! the connection unconditionally unregisters it and rebroadcasts.

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use duplex_common::ServerEvent;

use crate::config::AppState;
use crate::error::{Error, Result};
use crate::registry::ConnectionHandle;

#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    token: String,
}

/// GET /ws?token=...
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response> {
    let user = state
        .auth
        .validate_session(&query.token)
        .await
        .map_err(|_| Error::LoginFail)?;

    Ok(ws.on_upgrade(move |socket| run_connection(socket, state, user.id)))
}

/// Actor for one authenticated connection.
pub async fn run_connection(socket: WebSocket, state: AppState, user_id: String) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<ServerEvent>();

    let handle = ConnectionHandle::new(tx);
    let connection_id = handle.id;

    if let Some(replaced) = state.registry.register(&user_id, handle) {
        // Last-connection-wins: dropping the replaced sender ends the old
        // writer task, which closes the old socket.
        debug!(
            user_id = %user_id,
            old_connection = %replaced.id,
            "replaced prior connection for user"
        );
    }
    state.presence.broadcast();

    info!(user_id = %user_id, connection = %connection_id, "WebSocket connection registered");

    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Reader loop: clients do not send application frames on this channel,
    // so we only watch for close and transport errors.
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                WsMessage::Close(frame) => {
                    info!(user_id = %user_id, reason = ?frame, "client initiated close");
                    break;
                }
                // Keepalive frames are answered by the transport layer
                WsMessage::Ping(_) | WsMessage::Pong(_) => {}
                other => {
                    debug!(user_id = %user_id, frame = ?other, "ignoring unexpected client frame");
                }
            },
            Some(Err(e)) => {
                warn!(user_id = %user_id, error = %e, "WebSocket receive error");
                break;
            }
            None => {
                info!(user_id = %user_id, "WebSocket stream ended");
                break;
            }
        }
    }

    writer_handle.abort();

    // Only the connection still on record removes the user and triggers a
    // presence rebroadcast; a stale handle racing a reconnect is a no-op.
    if state.registry.unregister(&user_id, connection_id) {
        state.presence.broadcast();
    }

    info!(user_id = %user_id, connection = %connection_id, "WebSocket connection closed");
}

/// Writer task: owns the sink, serializes events from the connection's
/// channel onto the wire.
async fn writer_task(
    mut ws_sender: SplitSink<WebSocket, WsMessage>,
    mut rx: mpsc::UnboundedReceiver<ServerEvent>,
) {
    while let Some(event) = rx.recv().await {
        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to serialize server event");
                continue;
            }
        };
        if ws_sender.send(WsMessage::Text(json.into())).await.is_err() {
            break;
        }
    }
    // Channel closed: the connection was replaced or torn down. Close the
    // socket so the client sees a clean shutdown.
    let _ = ws_sender.close().await;
}
