//! Delivery strategies, one handler per transport.
//!
//! Each strategy registers the connection it serves, drives delivery
//! through the connection's own channel, and guarantees that its timer is
//! cancelled and the connection deregistered on every exit path.

mod poll;
mod socket;
mod stream;

pub use poll::poll_handler;
pub use socket::socket_handler;
pub use stream::stream_handler;
