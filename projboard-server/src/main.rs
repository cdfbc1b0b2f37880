//! Projboard server -- shared chat and task board over TCP.
//!
//! Accepts newline-delimited `TAG:payload` connections, keeps one shared
//! registry of sessions, usernames, and tasks, and fans every chat and task
//! event out to all connected participants. State is in-memory only and
//! resets on restart.
//!
//! # Usage
//!
//! ```bash
//! # Run on the default address 0.0.0.0:12345
//! cargo run --bin projboard-server
//!
//! # Run on a custom address
//! cargo run --bin projboard-server -- --bind 127.0.0.1:8080
//!
//! # Or via environment variable
//! PROJBOARD_ADDR=127.0.0.1:8080 cargo run --bin projboard-server
//! ```

use std::sync::Arc;

use clap::Parser;
use projboard_server::config::{ServerCliArgs, ServerConfig};
use projboard_server::registry::Registry;
use projboard_server::server;

#[tokio::main]
async fn main() {
    let cli = ServerCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with the resolved log level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting projboard server");

    let registry = Arc::new(Registry::new());
    match server::start_server_with_registry(&config.bind_addr, registry, config.max_connections)
        .await
    {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "projboard server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            std::process::exit(1);
        }
    }
}
