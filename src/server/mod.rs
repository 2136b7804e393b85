mod app;
mod lifecycle;
mod state;

pub use app::create_app;
pub use lifecycle::Server;
pub use state::AppState;
