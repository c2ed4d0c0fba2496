//! Error types shared by the runtime and the protocol handlers.
//!
//! Connection faults stay plain `io::Error`s: the event loop treats every
//! one of them the same way (drop the peer). The types here cover the
//! failures that are turned into status lines instead.

use std::io;
use thiserror::Error;

/// Failure to turn wire bytes into protocol text, or back.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The zlib stream was corrupt.
    #[error("malformed frame: {0}")]
    Decompress(#[from] flate2::DecompressError),
    /// Input ended before the zlib stream did.
    #[error("malformed frame: truncated stream")]
    Truncated,
    /// Decompressed payload is not ASCII text.
    #[error("malformed frame: payload is not ASCII text")]
    Encoding,
    /// The encoder failed while building an outgoing frame.
    #[error("failed to compress frame: {0}")]
    Compress(#[source] io::Error),
}

/// Failure while building the response to a recognized command.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("cannot resolve working directory: {0}")]
    WorkingDirectory(#[source] io::Error),
    #[error("working directory is not representable as ASCII")]
    NonAsciiPath,
}
