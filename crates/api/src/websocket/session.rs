//! WebSocket session handling
//!
//! One task per socket: decode frames, feed the router, forward outbound
//! events. Registration happens on upgrade; every exit path funnels through
//! the same guarded unregister, so a stale close never evicts a newer
//! session for the same party.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::Response,
};
use deskwire_shared::{PartyIdentity, PartyKind};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::chat::router::InboundMessage;
use crate::state::AppState;

use super::connection::Connection;
use super::events::{ClientEvent, ServerEvent};

/// Display name used when a customer never supplied one
const ANONYMOUS_SENDER: &str = "Guest";

#[derive(Debug, Deserialize)]
pub struct ChatPath {
    party_kind: PartyKind,
    party_id: String,
}

/// `GET /ws/chat/{party_kind}/{party_id}` - upgrade to a chat session
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(path): Path<ChatPath>,
) -> Result<Response, StatusCode> {
    if path.party_id.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let identity = PartyIdentity::new(path.party_kind, path.party_id);
    tracing::debug!(identity = %identity, "WebSocket upgrade requested");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, identity, state)))
}

/// Drive one upgraded socket until the client leaves or the registry evicts it
async fn handle_socket(socket: WebSocket, identity: PartyIdentity, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (tx, mut rx) = mpsc::channel::<ServerEvent>(state.config.ws_outbound_buffer);
    let conn = Arc::new(Connection::new(identity.clone(), tx));
    let connection_id = conn.id;

    state.registry.register(Arc::clone(&conn)).await;

    // Connection acknowledgment
    conn.send(ServerEvent::connected(connection_id));

    // Forward queued events onto the wire
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if ws_tx.send(WsMessage::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to serialize server event");
                }
            }
        }
    });

    // Read frames until the client goes away or the registry evicts us.
    // Eviction only interrupts the wait for the next frame; an event that is
    // already being handled runs to completion first.
    loop {
        tokio::select! {
            _ = conn.closed() => {
                tracing::info!(identity = %identity, connection_id = %connection_id, "Session evicted");
                break;
            }
            frame = ws_rx.next() => {
                let Some(frame) = frame else { break };
                match frame {
                    Ok(WsMessage::Text(text)) => {
                        conn.mark_activity();
                        match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(event) => handle_event(&state, &conn, event).await,
                            Err(e) => {
                                tracing::warn!(
                                    error = ?e,
                                    identity = %identity,
                                    "Failed to parse client event"
                                );
                                conn.send(ServerEvent::error("invalid event format"));
                            }
                        }
                    }
                    Ok(WsMessage::Close(_)) => {
                        tracing::info!(
                            identity = %identity,
                            connection_id = %connection_id,
                            "WebSocket closed by client"
                        );
                        break;
                    }
                    Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {
                        // Axum answers pings; both directions count as liveness
                        conn.mark_activity();
                    }
                    Ok(_) => {} // Binary frames are ignored
                    Err(e) => {
                        tracing::warn!(error = ?e, identity = %identity, "WebSocket read error");
                        break;
                    }
                }
            }
        }
    }

    state.registry.unregister(&identity, connection_id).await;
    conn.close();
    send_task.abort();
}

/// Dispatch one decoded client event
async fn handle_event(state: &AppState, conn: &Arc<Connection>, event: ClientEvent) {
    match event {
        ClientEvent::Message {
            conversation_id,
            content,
            message_type,
            sender_name,
            file_url,
            file_name,
            file_size,
        } => {
            let inbound = InboundMessage {
                conversation_id,
                kind: message_type,
                content,
                sender_name: sender_name
                    .unwrap_or_else(|| default_sender_name(&conn.identity)),
                file_url,
                file_name,
                file_size,
            };

            if let Err(err) = state.router.route(&conn.identity, inbound).await {
                tracing::warn!(
                    identity = %conn.identity,
                    conversation_id,
                    error = %err,
                    "Message rejected"
                );
                conn.send(ServerEvent::error(err.to_string()));
            }
        }
        ClientEvent::Heartbeat => {
            state.router.heartbeat(conn);
        }
        ClientEvent::Read { message_id } => {
            if let Err(err) = state.router.mark_read(message_id).await {
                tracing::warn!(message_id, error = %err, "Read receipt failed");
            }
        }
        ClientEvent::Recall { message_id } => {
            if let Err(err) = state.router.recall(conn.identity.kind, message_id).await {
                tracing::warn!(message_id, error = %err, "Recall failed");
                conn.send(ServerEvent::error(err.to_string()));
            }
        }
    }
}

fn default_sender_name(identity: &PartyIdentity) -> String {
    match identity.kind {
        PartyKind::Customer => ANONYMOUS_SENDER.to_string(),
        PartyKind::Agent => format!("Agent {}", identity.id),
    }
}
