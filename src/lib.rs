// Leaf components
pub mod clock;
pub mod event;
pub mod registry;

// Delivery strategies
pub mod strategy;

// Application layer
pub mod server;

// Supporting modules
pub mod config;
pub mod error;
