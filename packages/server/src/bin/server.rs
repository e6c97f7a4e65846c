//! Chatter synchronization server.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin chatter-server
//! cargo run --bin chatter-server -- --host 0.0.0.0 --port 3000
//! PORT=4000 CHATTER_STORE_URL=memory:// cargo run --bin chatter-server
//! ```

use std::sync::Arc;

use chatter_server::{config::ServerConfig, engine::Engine, ui::Server};
use chatter_shared::logger::setup_logger;
use clap::Parser;

#[tokio::main]
async fn main() {
    let config = ServerConfig::parse();

    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), &config.log_level);

    // Initialize dependencies in order:
    // 1. Engine configuration
    // 2. Engine (collaborators, components, use cases)
    // 3. Server

    // 1. Validate configuration
    let engine_config = match config.engine_config() {
        Ok(engine_config) => engine_config,
        Err(e) => {
            tracing::error!("Configuration error: {}", e);
            std::process::exit(2);
        }
    };

    // 2. Assemble the engine
    let engine = Arc::new(Engine::new(engine_config));
    tracing::info!("Engine ready (store: {})", config.store_url);

    // 3. Create and run the server
    let server = Server::new(engine);
    if let Err(e) = server.run(config.host, config.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
