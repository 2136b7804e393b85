//! Event-stream strategy: a persistent SSE response fed by a repeating timer.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderValue},
    response::{
        sse::{Event as SseFrame, Sse},
        IntoResponse, Response,
    },
};
use futures::stream::Stream;
use futures::StreamExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::clock::{EventClock, TickHandle};
use crate::event::Event;
use crate::registry::{ConnectionHandle, ConnectionRegistry, TransportKind};
use crate::server::AppState;

/// `GET /events`.
///
/// Writes the stream headers, arms a repeating timer, and returns a body
/// that frames one event every tick until the client disconnects. The guard
/// owned by the stream is the single place that ties the timer's lifetime
/// to the connection's: when axum drops the body, the timer is cancelled
/// synchronously and the connection deregistered.
pub async fn stream_handler(State(state): State<AppState>) -> Response {
    let (tx, rx) = mpsc::channel::<Event>(state.settings.delivery.channel_buffer);
    let handle = match state
        .registry
        .register(ConnectionHandle::new(TransportKind::Stream, tx))
    {
        Ok(h) => h,
        Err(e) => return e.into_response(),
    };

    let sender = handle.sender.clone();
    let timer = EventClock::schedule(state.settings.delivery.stream_interval(), move |event| {
        match sender.try_send(event) {
            Ok(()) => true,
            // Slow consumer: the frame is dropped, never redelivered; the
            // next tick is the next opportunity.
            Err(TrySendError::Full(_)) => true,
            // Closed channel: same cleanup as an explicit disconnect.
            Err(TrySendError::Closed(_)) => false,
        }
    });

    tracing::info!(
        connection_id = %handle.id,
        interval_ms = state.settings.delivery.stream_interval_ms,
        "Event stream opened"
    );

    let stream = event_stream(rx, handle.id, state.registry.clone(), timer);

    let mut response = Sse::new(stream).into_response();
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}

/// Frame every delivered event as `data: <json>\n\n`.
fn event_stream(
    rx: mpsc::Receiver<Event>,
    connection_id: Uuid,
    registry: Arc<ConnectionRegistry>,
    timer: TickHandle,
) -> impl Stream<Item = std::result::Result<SseFrame, Infallible>> {
    let cleanup = StreamGuard {
        connection_id,
        registry,
        timer,
    };

    async_stream::stream! {
        // Held until axum drops the body
        let _guard = cleanup;

        let mut events = ReceiverStream::new(rx);
        while let Some(event) = events.next().await {
            match serde_json::to_string(&event) {
                Ok(json) => yield Ok(SseFrame::default().data(json)),
                Err(e) => {
                    tracing::error!(
                        connection_id = %connection_id,
                        error = %e,
                        "Failed to serialize stream event"
                    );
                }
            }
        }
    }
}

/// Cancels the timer and deregisters the connection when the stream ends,
/// on graceful completion and on client disconnect alike.
struct StreamGuard {
    connection_id: Uuid,
    registry: Arc<ConnectionRegistry>,
    timer: TickHandle,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.timer.cancel();
        self.registry.unregister(self.connection_id);
        tracing::info!(connection_id = %self.connection_id, "Event stream closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guard_cancels_timer_and_unregisters() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, rx) = mpsc::channel::<Event>(4);
        let handle = registry
            .register(ConnectionHandle::new(TransportKind::Stream, tx))
            .unwrap();

        let sender = handle.sender.clone();
        let timer = EventClock::schedule(std::time::Duration::from_millis(10), move |event| {
            sender.try_send(event).is_ok()
        });

        let stream = event_stream(rx, handle.id, registry.clone(), timer);
        drop(stream);

        // The guard travels with the stream; dropping the unpolled stream
        // must still release the connection.
        assert!(!registry.contains(handle.id));
    }
}
