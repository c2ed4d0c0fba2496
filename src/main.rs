//! ftp-relay: a single-threaded, readiness-multiplexed command server
//!
//! One event loop serves every peer. Each frame on the wire is a
//! zlib-compressed line of text:
//! - `ftp` protocol: FTP-style USER/PASS/PWD/QUIT commands answered with
//!   numeric status lines
//! - `ingest` protocol: one-way JSON chat messages, logged on receipt
//!
//! Configuration via CLI arguments or TOML file.

mod config;
mod error;
mod protocols;
mod runtime;

use config::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        protocol = ?config.protocol,
        max_connections = config.max_connections,
        read_size = config.read_size,
        "Starting ftp-relay server"
    );

    runtime::run(config)?;
    Ok(())
}
