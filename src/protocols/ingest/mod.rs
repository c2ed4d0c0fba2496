//! Ingest protocol.
//!
//! One-way message ingestion: each frame a peer sends is a zlib-compressed
//! JSON object, which the server logs and does not answer.
//!
//! ```text
//! {"username": "Alice", "text": "Hello, World!", "timestamp": "2024-05-17 09:30:15.250000"}
//! ```
//!
//! A frame that does not decode ends the connection.

pub mod message;

pub use message::Message;
