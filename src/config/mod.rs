mod settings;

pub use settings::{DeliveryConfig, ServerConfig, Settings};
