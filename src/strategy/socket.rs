//! Socket strategy: bidirectional echo over a WebSocket upgrade.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::event::Event;
use crate::registry::{ConnectionHandle, TransportKind};
use crate::server::AppState;

/// `GET /ws` upgrade handler.
pub async fn socket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an established socket connection.
///
/// Echo replies are queued through the connection's channel and drained by
/// a single send task, so outbound order matches inbound order. Transport
/// errors are logged and treated exactly like a client close; they never
/// escape this task.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (tx, mut rx) = mpsc::channel::<Event>(state.settings.delivery.channel_buffer);
    let handle = match state
        .registry
        .register(ConnectionHandle::new(TransportKind::Socket, tx))
    {
        Ok(h) => h,
        Err(e) => {
            tracing::error!(error = %e, "Socket connection rejected");
            return;
        }
    };
    let connection_id = handle.id;

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Welcome frame goes out before any echo can be queued
    match serde_json::to_string(&Event::welcome()) {
        Ok(json) => {
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                tracing::warn!(connection_id = %connection_id, "Client gone before welcome frame");
                state.registry.unregister(connection_id);
                return;
            }
        }
        Err(e) => {
            tracing::error!(connection_id = %connection_id, error = %e, "Failed to serialize welcome frame");
            state.registry.unregister(connection_id);
            return;
        }
    }

    tracing::info!(connection_id = %connection_id, "Socket connection established");

    // Task for sending queued events to the socket
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize event");
                    continue;
                }
            };

            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Task for receiving frames from the socket
    let handle_clone = handle.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_frame(msg, &handle_clone).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        connection_id = %handle_clone.id,
                        error = %e,
                        "Socket transport error"
                    );
                    break;
                }
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
        }
        _ = recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
        }
    }

    // Idempotent against a repeated close notification
    state.registry.unregister(connection_id);
    tracing::info!(connection_id = %connection_id, "Socket connection closed");
}

/// Process one received frame. Returns false if the connection should close.
async fn process_frame(msg: Message, handle: &Arc<ConnectionHandle>) -> bool {
    match msg {
        Message::Text(text) => handle.send(Event::echo(text.as_str())).await.is_ok(),
        Message::Binary(_) => {
            // The protocol is text-only
            tracing::debug!(connection_id = %handle.id, "Ignoring binary frame");
            true
        }
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!(connection_id = %handle.id, "Received close frame");
            false
        }
    }
}
