//! Protocol implementations.
//!
//! Each protocol provides parsing and response building over decoded
//! frames; the runtime owns sockets and framing.
//!
//! - `ftp`: FTP-style command/response protocol
//! - `ingest`: one-way compressed JSON message ingestion

pub mod ftp;
pub mod ingest;
