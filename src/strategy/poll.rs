//! Long-poll strategy: hold the request open, answer once after the delay.

use axum::{extract::State, Json};
use tokio::sync::mpsc;

use crate::clock::EventClock;
use crate::error::{AppError, Result};
use crate::event::Event;
use crate::registry::{ConnectionGuard, ConnectionHandle, TransportKind};
use crate::server::AppState;

/// `GET /poll`.
///
/// The request moves through `Idle -> AwaitingData -> Responding -> Closed`
/// as handler control flow: a one-shot timer delivers the event into the
/// connection's channel, the handler suspends on the channel, then writes
/// the single JSON response. If the client aborts first, axum drops this
/// future; dropping the timer handle and the guard cancels the pending
/// timer and deregisters the connection without writing anything.
pub async fn poll_handler(State(state): State<AppState>) -> Result<Json<Event>> {
    let (tx, mut rx) = mpsc::channel::<Event>(state.settings.delivery.channel_buffer);
    let handle = state
        .registry
        .register(ConnectionHandle::new(TransportKind::Poll, tx))?;
    let _guard = ConnectionGuard::new(state.registry.clone(), handle.id);

    let sender = handle.sender.clone();
    let _timer = EventClock::once(state.settings.delivery.poll_delay(), move |event| {
        let _ = sender.try_send(event);
    });

    tracing::debug!(
        connection_id = %handle.id,
        delay_ms = state.settings.delivery.poll_delay_ms,
        "Long-poll request awaiting data"
    );

    match rx.recv().await {
        Some(event) => {
            tracing::debug!(connection_id = %handle.id, "Long-poll response ready");
            Ok(Json(event))
        }
        // Unreachable while the connection is registered; kept so a channel
        // fault surfaces as a disconnect-equivalent error, not a panic.
        None => Err(AppError::Transport(
            "poll delivery channel closed before the timer fired".to_string(),
        )),
    }
}
