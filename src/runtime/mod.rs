//! Single-threaded networking runtime.
//!
//! Readiness-based I/O using mio (epoll on Linux, kqueue on macOS):
//! - `FrameCodec`: zlib framing of every wire message
//! - `Connection`: per-peer state, kept in a slab-backed registry
//! - `request`: frame in, encoded response out
//! - `Server`: the event loop itself

pub mod codec;
mod connection;
mod event_loop;
pub mod request;

pub use codec::FrameCodec;
pub use event_loop::Server;
pub use request::Protocol;

use crate::config::{Config, ProtocolType};
use tracing::warn;

/// Bind and run the server until shut down.
///
/// Ctrl-C requests a graceful shutdown.
pub fn run(config: Config) -> std::io::Result<()> {
    // Map config protocol to runtime protocol
    let protocol = match config.protocol {
        ProtocolType::Ftp => Protocol::Ftp,
        ProtocolType::Ingest => Protocol::Ingest,
    };

    let mut server = Server::bind(&config, protocol)?;

    let handle = server.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || handle.shutdown()) {
        warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    server.run()
}
