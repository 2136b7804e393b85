use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::event::Event;

/// Which delivery strategy owns a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Poll,
    Stream,
    Socket,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransportKind::Poll => "poll",
            TransportKind::Stream => "stream",
            TransportKind::Socket => "socket",
        };
        f.write_str(s)
    }
}

/// Handle for a single client connection.
///
/// The sender is the exclusively owned outbound side of the connection's
/// transport channel; events queued through it are delivered in order.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub id: Uuid,
    pub kind: TransportKind,
    pub sender: mpsc::Sender<Event>,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionHandle {
    pub fn new(kind: TransportKind, sender: mpsc::Sender<Event>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            sender,
            connected_at: Utc::now(),
        }
    }

    /// Queue an event for delivery. A send error means the receiving side
    /// is gone, which callers treat as a disconnect.
    pub async fn send(&self, event: Event) -> Result<(), mpsc::error::SendError<Event>> {
        self.sender.send(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_kind_display() {
        assert_eq!(TransportKind::Poll.to_string(), "poll");
        assert_eq!(TransportKind::Stream.to_string(), "stream");
        assert_eq!(TransportKind::Socket.to_string(), "socket");
    }

    #[tokio::test]
    async fn test_send_delivers_in_order() {
        let (tx, mut rx) = mpsc::channel(4);
        let handle = ConnectionHandle::new(TransportKind::Socket, tx);

        handle.send(Event::echo("one")).await.unwrap();
        handle.send(Event::echo("two")).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().message, "You said: one");
        assert_eq!(rx.recv().await.unwrap().message, "You said: two");
    }

    #[tokio::test]
    async fn test_send_fails_after_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        let handle = ConnectionHandle::new(TransportKind::Socket, tx);
        drop(rx);

        assert!(handle.send(Event::echo("late")).await.is_err());
    }
}
