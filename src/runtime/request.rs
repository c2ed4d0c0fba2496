//! Request dispatch for the event loop.
//!
//! Turns one received frame into at most one encoded response, using the
//! protocol configured for the server. Works on plain byte slices; the
//! event loop owns the sockets.

use crate::error::{FrameError, HandlerError};
use crate::protocols::ftp::{self, Action, AuthState, Dispatcher, Reply};
use crate::protocols::ingest::Message;
use crate::runtime::FrameCodec;
use tracing::{debug, info, warn};

/// Protocol type for command processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Ftp,
    Ingest,
}

/// Result of processing a frame.
#[derive(Debug, PartialEq, Eq)]
pub enum ProcessResult {
    /// Encoded response to write; keep the connection open.
    Response(Vec<u8>),
    /// Encoded response to write, then close the connection.
    Quit(Vec<u8>),
    /// Frame accepted, nothing to send.
    Consumed,
    /// Unrecoverable frame, connection should be closed.
    Error,
}

/// Why a frame could not be answered normally.
#[derive(Debug)]
enum RequestError {
    Frame(FrameError),
    Handler(HandlerError),
}

impl From<FrameError> for RequestError {
    fn from(e: FrameError) -> Self {
        RequestError::Frame(e)
    }
}

impl From<HandlerError> for RequestError {
    fn from(e: HandlerError) -> Self {
        RequestError::Handler(e)
    }
}

/// Encoded frame to send as soon as a peer is accepted, if any.
pub fn welcome(protocol: Protocol, codec: &FrameCodec) -> Result<Option<Vec<u8>>, FrameError> {
    match protocol {
        Protocol::Ftp => encode(&Reply::welcome(), codec).map(Some),
        Protocol::Ingest => Ok(None),
    }
}

/// Process one FTP frame.
///
/// Decode failures and handler failures both answer with status 500 and
/// leave the connection open. Only a failure to encode the response itself
/// is fatal to the connection.
pub fn process_ftp(
    conn_id: usize,
    input: &[u8],
    auth: &mut AuthState,
    dispatcher: &Dispatcher,
    codec: &FrameCodec,
) -> ProcessResult {
    let reply = match answer_ftp(conn_id, input, auth, dispatcher, codec) {
        Ok(reply) => reply,
        Err(RequestError::Frame(e)) => {
            debug!(conn_id, error = %e, "Undecodable frame");
            Reply::internal_error()
        }
        Err(RequestError::Handler(e)) => {
            warn!(conn_id, error = %e, "Command failed");
            Reply::internal_error()
        }
    };

    match encode(&reply, codec) {
        Ok(frame) if reply.action == Action::Close => ProcessResult::Quit(frame),
        Ok(frame) => ProcessResult::Response(frame),
        Err(e) => {
            warn!(conn_id, error = %e, "Failed to encode response");
            ProcessResult::Error
        }
    }
}

fn answer_ftp(
    conn_id: usize,
    input: &[u8],
    auth: &mut AuthState,
    dispatcher: &Dispatcher,
    codec: &FrameCodec,
) -> Result<Reply, RequestError> {
    let text = codec.decode(input)?;
    let command = ftp::parse(&text);
    debug!(conn_id, verb = command.verb.as_str(), "Received command");
    Ok(dispatcher.dispatch(auth, &command)?)
}

/// Process one ingest frame: decode and log the message.
pub fn process_ingest(conn_id: usize, input: &[u8], codec: &FrameCodec) -> ProcessResult {
    match Message::deserialize(codec, input) {
        Ok(message) => {
            match message.parsed_timestamp() {
                Some(ts) => info!(
                    conn_id,
                    username = %message.username,
                    text = %message.text,
                    timestamp = %ts,
                    "Received message"
                ),
                None => info!(
                    conn_id,
                    username = %message.username,
                    text = %message.text,
                    timestamp = %message.timestamp,
                    "Received message"
                ),
            }
            ProcessResult::Consumed
        }
        Err(e) => {
            debug!(conn_id, error = %e, "Rejected message");
            ProcessResult::Error
        }
    }
}

fn encode(reply: &Reply, codec: &FrameCodec) -> Result<Vec<u8>, FrameError> {
    codec.compress(reply.line().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io;
    use std::path::PathBuf;

    fn mock_dir() -> io::Result<PathBuf> {
        Ok(PathBuf::from("/mock/directory"))
    }

    fn ftp(input: &[u8], auth: &mut AuthState) -> ProcessResult {
        let codec = FrameCodec::default();
        process_ftp(7, input, auth, &Dispatcher::with_cwd(mock_dir), &codec)
    }

    fn text_of(result: ProcessResult) -> String {
        let codec = FrameCodec::default();
        match result {
            ProcessResult::Response(frame) | ProcessResult::Quit(frame) => {
                codec.decode(&frame).unwrap()
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_welcome() {
        let codec = FrameCodec::default();
        let frame = welcome(Protocol::Ftp, &codec).unwrap().unwrap();
        assert_eq!(codec.decode(&frame).unwrap(), "220 Welcome to the FTP server\r\n");
        assert!(welcome(Protocol::Ingest, &codec).unwrap().is_none());
    }

    #[test]
    fn test_ftp_responses_are_compressed_status_lines() {
        let codec = FrameCodec::default();
        let mut auth = AuthState::default();

        let result = ftp(&codec.compress(b"USER valid_username\r\n").unwrap(), &mut auth);
        assert_eq!(
            result,
            ProcessResult::Response(codec.compress(b"331 Username OK, need password\r\n").unwrap())
        );

        let result = ftp(&codec.compress(b"PASS valid_password\r\n").unwrap(), &mut auth);
        assert_eq!(text_of(result), "230 User logged in\r\n");

        let result = ftp(&codec.compress(b"PWD\r\n").unwrap(), &mut auth);
        assert_eq!(text_of(result), "257 \"/mock/directory\"\r\n");

        let result = ftp(&codec.compress(b"UNKNOWN_COMMAND\r\n").unwrap(), &mut auth);
        assert_eq!(text_of(result), "502 Command not implemented\r\n");
    }

    #[test]
    fn test_ftp_quit() {
        let codec = FrameCodec::default();
        let mut auth = AuthState::default();
        let result = ftp(&codec.compress(b"QUIT\r\n").unwrap(), &mut auth);
        assert!(matches!(result, ProcessResult::Quit(_)));
        assert_eq!(text_of(result), "221 Goodbye\r\n");
    }

    #[test]
    fn test_ftp_malformed_frame_answers_500() {
        let mut auth = AuthState::default();
        let result = ftp(b"PWD\r\n", &mut auth);
        assert!(matches!(result, ProcessResult::Response(_)));
        assert_eq!(text_of(result), "500 Internal server error\r\n");
        assert_eq!(auth, AuthState::Unauthenticated);
    }

    #[test]
    fn test_ftp_handler_failure_answers_500() {
        fn failing() -> io::Result<PathBuf> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
        }
        let codec = FrameCodec::default();
        let mut auth = AuthState::default();
        let input = codec.compress(b"PWD\r\n").unwrap();
        let result = process_ftp(1, &input, &mut auth, &Dispatcher::with_cwd(failing), &codec);
        assert_eq!(text_of(result), "500 Internal server error\r\n");
    }

    #[test]
    fn test_ingest() {
        let codec = FrameCodec::default();
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        let frame = Message::new("Alice", "Hello, World!", ts)
            .serialize(&codec)
            .unwrap();

        assert_eq!(process_ingest(1, &frame, &codec), ProcessResult::Consumed);
        assert_eq!(process_ingest(1, b"not zlib", &codec), ProcessResult::Error);

        let not_json = codec.compress(b"USER alice").unwrap();
        assert_eq!(process_ingest(1, &not_json, &codec), ProcessResult::Error);
    }
}
