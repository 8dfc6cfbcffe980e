//! Codespace coordinator: hosts collaborative editing rooms over WebSocket.
//!
//! Configured from the environment (`CODESPACE_BIND_ADDR`,
//! `CODESPACE_BROADCAST_CAPACITY`); log level via `RUST_LOG`, default `info`.

use log::{error, info};

use codespace_collab::server::{CollabServer, ServerConfig};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    info!("Starting codespace server on {}...", config.bind_addr);
    let server = CollabServer::new(config);

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {e}");
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            let stats = server.stats().await;
            info!(
                "Shutting down: {} connections served, {} messages, {} rejected, {} rooms open",
                stats.total_connections,
                stats.total_messages,
                stats.rejected_messages,
                stats.active_rooms
            );
        }
    }
}
