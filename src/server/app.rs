use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::strategy::{poll_handler, socket_handler, stream_handler};

use super::AppState;

/// Build the dispatcher: a static route table mapping each designated path
/// to exactly one delivery strategy, with a plain health fallback for
/// everything else.
pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Delivery endpoints
        .route("/poll", get(poll_handler))
        .route("/events", get(stream_handler))
        .route("/ws", get(socket_handler))
        // Everything else answers immediately without entering a strategy
        .fallback(health_fallback)
        // Add middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Add state
        .with_state(state)
}

async fn health_fallback() -> &'static str {
    "Server is up"
}
