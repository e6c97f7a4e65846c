//! Server execution logic.

use std::{future::Future, sync::Arc};

use axum::{
    Router,
    routing::{delete, get, post},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::engine::Engine;

use super::{
    handler::{
        add_participant, create_conversation, get_conversation, get_messages, get_presence,
        get_user, health_check, register_user, remove_participant, update_user,
        websocket_handler,
    },
    signal::shutdown_signal,
    state::AppState,
};

/// Chat synchronization server
///
/// # Example
///
/// ```ignore
/// let engine = Arc::new(Engine::new(EngineConfig::default()));
/// Server::new(engine).run("127.0.0.1".to_string(), 3000).await?;
/// ```
pub struct Server {
    engine: Arc<Engine>,
}

impl Server {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Routes of the HTTP API and the WebSocket endpoint.
    pub fn router(&self) -> Router {
        let app_state = Arc::new(AppState {
            engine: self.engine.clone(),
        });

        Router::new()
            // WebSocket エンドポイント
            .route("/ws", get(websocket_handler))
            // HTTP エンドポイント
            .route("/api/health", get(health_check))
            .route("/api/users", post(register_user))
            .route("/api/users/{user_id}", get(get_user).patch(update_user))
            .route("/api/users/{user_id}/presence", get(get_presence))
            .route("/api/conversations", post(create_conversation))
            .route("/api/conversations/{conversation_id}", get(get_conversation))
            .route(
                "/api/conversations/{conversation_id}/participants",
                post(add_participant),
            )
            .route(
                "/api/conversations/{conversation_id}/participants/{user_id}",
                delete(remove_participant),
            )
            .route(
                "/api/conversations/{conversation_id}/messages",
                get(get_messages),
            )
            .layer(TraceLayer::new_for_http())
            .with_state(app_state)
    }

    /// Bind to `host:port` and serve until Ctrl+C or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the specified address or
    /// if there's an error during server execution.
    pub async fn run(self, host: String, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        let bind_addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&bind_addr).await?;

        tracing::info!("Chat server listening on {}", listener.local_addr()?);
        tracing::info!("Connect to: ws://{}/ws?token=<token>", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        self.serve_with_shutdown(listener, shutdown_signal()).await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }

    /// Serve on an already bound listener until the task is dropped.
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        self.serve_with_shutdown(listener, std::future::pending())
            .await
    }

    pub async fn serve_with_shutdown<F>(
        self,
        listener: TcpListener,
        signal: F,
    ) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(listener, self.router())
            .with_graceful_shutdown(signal)
            .await
    }
}
