//! wirebus - Message Bus Daemon
//!
//! A TCP message bus: clients register named methods and invoke methods
//! registered by other clients, with request/response correlation over a
//! shared connection.

use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use wirebus_server::{Config, Server, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if WIREBUS_CONFIG is set, then env overrides)
    let config = match Config::load() {
        Ok(c) => {
            if let Ok(path) = std::env::var("WIREBUS_CONFIG") {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            // If a config file was explicitly specified, fail on error
            if std::env::var("WIREBUS_CONFIG").is_ok() {
                tracing::error!("Failed to load config: {}", e);
                return Err(e.into());
            }
            tracing::info!("Using default configuration");
            Config::default()
        }
    };

    tracing::info!("Starting wirebus daemon");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Max connections: {}", config.network.max_connections);

    let server_config = ServerConfig::new(config.network.bind_addr)
        .with_max_connections(config.network.max_connections);
    let server = Arc::new(Server::new(server_config));

    // Surface bind failures before declaring the daemon up
    let addr = server.bind().await?;
    tracing::info!("wirebus listening on {}", addr);

    // Spawn shutdown signal handler
    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    // Run server (blocks until shutdown)
    server.run().await?;

    tracing::info!("Server stopped");
    Ok(())
}
