//! Explicit server lifecycle.
//!
//! The listening socket is a component with `bind`/`shutdown` rather than a
//! started-once global, so multiple instances can coexist in tests (bind to
//! port 0 for an ephemeral port).

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::Settings;
use crate::error::{AppError, Result};

use super::{create_app, AppState};

/// A running server instance.
pub struct Server {
    local_addr: SocketAddr,
    state: AppState,
    shutdown_tx: broadcast::Sender<()>,
    serve_task: JoinHandle<std::io::Result<()>>,
}

impl Server {
    /// Bind the configured address and start serving.
    pub async fn bind(settings: Settings) -> Result<Self> {
        let state = AppState::new(settings.clone());
        let app = create_app(state.clone());

        let listener = TcpListener::bind(settings.server_addr()).await?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let serve_task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
        });

        tracing::info!(addr = %local_addr, "Server listening");

        Ok(Self {
            local_addr,
            state,
            shutdown_tx,
            serve_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Signal graceful shutdown and wait for the serve loop to finish.
    pub async fn shutdown(self) -> Result<()> {
        let stats = self.state.registry.stats();
        tracing::info!(
            open_connections = stats.total,
            polling = stats.polling,
            streaming = stats.streaming,
            sockets = stats.sockets,
            "Shutting down"
        );

        let _ = self.shutdown_tx.send(());
        self.serve_task
            .await
            .map_err(|e| AppError::Transport(format!("serve task panicked: {e}")))??;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    fn test_settings() -> Settings {
        Settings {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            delivery: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_bind_and_shutdown() {
        let server = Server::bind(test_settings()).await.unwrap();
        assert_ne!(server.local_addr().port(), 0);
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_instances_coexist() {
        let a = Server::bind(test_settings()).await.unwrap();
        let b = Server::bind(test_settings()).await.unwrap();
        assert_ne!(a.local_addr(), b.local_addr());

        a.shutdown().await.unwrap();
        b.shutdown().await.unwrap();
    }
}
