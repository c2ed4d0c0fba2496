//! FTP-style command protocol.
//!
//! A small line protocol modeled on FTP control connections. Every frame,
//! in both directions, is one zlib-compressed line of ASCII text:
//!
//! ```text
//! Server: 220 Welcome to the FTP server
//! Client: USER alice
//! Server: 331 Username OK, need password
//! Client: PASS secret
//! Server: 230 User logged in
//! Client: PWD
//! Server: 257 "/srv/ftp"
//! Client: QUIT
//! Server: 221 Goodbye
//! ```
//!
//! Anything else gets `502 Command not implemented`. A frame that cannot
//! be decoded, or a command whose handler fails, gets
//! `500 Internal server error` and the connection stays open.

pub mod handler;
pub mod parser;

pub use handler::{Action, AuthState, Dispatcher, Reply};
pub use parser::parse;
