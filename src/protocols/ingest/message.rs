//! Chat message carried by the ingest protocol.

use crate::runtime::FrameCodec;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Timestamp layout used on the wire (microsecond precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Why an ingest frame was rejected.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error(transparent)]
    Frame(#[from] crate::error::FrameError),
    #[error("invalid message body: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub username: String,
    pub text: String,
    /// Kept as sent; see [`Message::parsed_timestamp`].
    pub timestamp: String,
}

impl Message {
    #[allow(dead_code)] // Client side of the wire format
    pub fn new(
        username: impl Into<String>,
        text: impl Into<String>,
        timestamp: NaiveDateTime,
    ) -> Self {
        Self {
            username: username.into(),
            text: text.into(),
            timestamp: timestamp.format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    /// Encode as a compressed JSON frame.
    #[allow(dead_code)] // Client side of the wire format
    pub fn serialize(&self, codec: &FrameCodec) -> Result<Vec<u8>, MessageError> {
        let json = serde_json::to_vec(self)?;
        Ok(codec.compress(&json)?)
    }

    /// Decode a compressed JSON frame.
    pub fn deserialize(codec: &FrameCodec, frame: &[u8]) -> Result<Self, MessageError> {
        let json = codec.decompress(frame)?;
        Ok(serde_json::from_slice(&json)?)
    }

    /// The timestamp, if it is in the wire layout.
    pub fn parsed_timestamp(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.timestamp, "%Y-%m-%d %H:%M:%S%.f").ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 17)
            .unwrap()
            .and_hms_micro_opt(9, 30, 15, 250_000)
            .unwrap()
    }

    #[test]
    fn test_timestamp_layout() {
        let msg = Message::new("Alice", "Hello, World!", sample_time());
        assert_eq!(msg.timestamp, "2024-05-17 09:30:15.250000");
        assert_eq!(msg.parsed_timestamp(), Some(sample_time()));
    }

    #[test]
    fn test_frame_decodes() {
        let codec = FrameCodec::default();
        let msg = Message::new("Alice", "Hello, World!", sample_time());
        let frame = msg.serialize(&codec).unwrap();
        assert_eq!(Message::deserialize(&codec, &frame).unwrap(), msg);
    }

    #[test]
    fn test_foreign_frame_decodes() {
        let codec = FrameCodec::default();
        let json = br#"{"username": "bob", "text": "hi", "timestamp": "yesterday"}"#;
        let frame = codec.compress(json).unwrap();

        let msg = Message::deserialize(&codec, &frame).unwrap();
        assert_eq!(msg.username, "bob");
        assert_eq!(msg.timestamp, "yesterday");
        assert_eq!(msg.parsed_timestamp(), None);
    }

    #[test]
    fn test_missing_field_rejected() {
        let codec = FrameCodec::default();
        let frame = codec.compress(br#"{"username": "bob"}"#).unwrap();
        assert!(matches!(
            Message::deserialize(&codec, &frame),
            Err(MessageError::Json(_))
        ));
    }

    #[test]
    fn test_uncompressed_rejected() {
        let codec = FrameCodec::default();
        let json = br#"{"username": "bob", "text": "hi", "timestamp": "x"}"#;
        assert!(matches!(
            Message::deserialize(&codec, json),
            Err(MessageError::Frame(_))
        ));
    }
}
