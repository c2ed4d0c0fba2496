//! Peer connection state and the connection table.
//!
//! Each peer owns its socket, its login progress, the last frame it sent,
//! and any response bytes the socket was not ready to take yet.

use crate::protocols::ftp::AuthState;
use bytes::{Buf, BytesMut};
use mio::net::TcpStream;
use mio::Interest;
use slab::Slab;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};

/// Current state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Waiting for the next frame.
    Reading,
    /// A response is partially written; reads are paused until it drains.
    Writing,
    /// Final response queued; close once it drains.
    Closing,
}

/// Outcome of a single read from a peer.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were received into the frame buffer.
    Frame(usize),
    /// Peer closed its sending side.
    Eof,
    /// Nothing to read right now.
    WouldBlock,
}

/// A single client connection.
#[derive(Debug)]
pub struct Connection {
    pub stream: TcpStream,
    pub addr: SocketAddr,
    pub state: ConnState,
    pub auth: AuthState,
    /// Bytes from the most recent read; one read is one frame.
    frame: Vec<u8>,
    /// Encoded responses not yet accepted by the socket.
    pending: BytesMut,
    /// Interest currently registered with the poller.
    interest: Interest,
}

impl Connection {
    /// Create a new connection in the reading state.
    pub fn new(stream: TcpStream, addr: SocketAddr) -> Self {
        Self {
            stream,
            addr,
            state: ConnState::Reading,
            auth: AuthState::default(),
            frame: Vec::new(),
            pending: BytesMut::new(),
            interest: Interest::READABLE,
        }
    }

    /// The frame received by the last successful read.
    pub fn frame(&self) -> &[u8] {
        &self.frame
    }

    /// The last frame together with the login state it updates.
    pub fn frame_and_auth(&mut self) -> (&[u8], &mut AuthState) {
        (&self.frame, &mut self.auth)
    }

    /// Perform one read of at most `read_size` bytes.
    pub fn read_frame(&mut self, read_size: usize) -> io::Result<ReadOutcome> {
        self.frame.resize(read_size, 0);
        loop {
            match self.stream.read(&mut self.frame) {
                Ok(0) => {
                    self.frame.clear();
                    return Ok(ReadOutcome::Eof);
                }
                Ok(n) => {
                    self.frame.truncate(n);
                    return Ok(ReadOutcome::Frame(n));
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.frame.clear();
                    return Ok(ReadOutcome::WouldBlock);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Queue an encoded response behind any bytes already pending.
    pub fn queue(&mut self, frame: &[u8]) {
        self.pending.extend_from_slice(frame);
    }

    /// Bytes queued but not yet written.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Write as much pending output as the socket accepts.
    ///
    /// Returns `true` once nothing is left to write.
    pub fn flush(&mut self) -> io::Result<bool> {
        while !self.pending.is_empty() {
            match self.stream.write(&self.pending) {
                Ok(0) => {
                    return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0"));
                }
                Ok(n) => self.pending.advance(n),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    /// Interest the poller should hold for this connection.
    ///
    /// Reads pause while output is pending so responses stay in order.
    pub fn desired_interest(&self) -> Interest {
        if self.pending.is_empty() {
            Interest::READABLE
        } else {
            Interest::WRITABLE
        }
    }

    /// Record a registration change. Returns `false` if nothing changed.
    pub fn set_interest(&mut self, interest: Interest) -> bool {
        if self.interest == interest {
            return false;
        }
        self.interest = interest;
        true
    }

    /// Transition to writing state.
    pub fn start_writing(&mut self) {
        if self.state == ConnState::Reading {
            self.state = ConnState::Writing;
        }
    }

    /// Transition back to reading state.
    pub fn start_reading(&mut self) {
        if self.state == ConnState::Writing {
            self.state = ConnState::Reading;
        }
    }

    /// Mark connection for closing once pending output drains.
    pub fn close(&mut self) {
        self.state = ConnState::Closing;
    }

    /// Shut down both directions of the socket, ignoring errors.
    pub fn shutdown(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// Registry of active connections using slab allocation.
///
/// Provides O(1) insert, lookup, and remove operations. Keys are stable
/// for the lifetime of a connection and double as poll tokens.
pub struct ConnectionRegistry {
    connections: Slab<Connection>,
    max_connections: usize,
}

impl ConnectionRegistry {
    /// Create a new registry with specified maximum capacity.
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: Slab::with_capacity(max_connections),
            max_connections,
        }
    }

    /// Insert a new connection into the registry.
    ///
    /// Hands the connection back if the registry is at capacity.
    pub fn insert(&mut self, conn: Connection) -> Result<usize, Connection> {
        if self.connections.len() >= self.max_connections {
            return Err(conn);
        }
        Ok(self.connections.insert(conn))
    }

    /// Get a mutable reference to a connection.
    pub fn get_mut(&mut self, id: usize) -> Option<&mut Connection> {
        self.connections.get_mut(id)
    }

    /// Remove a connection from the registry.
    pub fn remove(&mut self, id: usize) -> Option<Connection> {
        self.connections.try_remove(id)
    }

    /// Check if a connection exists.
    pub fn contains(&self, id: usize) -> bool {
        self.connections.contains(id)
    }

    /// Number of active connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Maximum number of connections allowed.
    pub fn capacity(&self) -> usize {
        self.max_connections
    }

    /// Remove every connection.
    pub fn drain(&mut self) -> impl Iterator<Item = Connection> + '_ {
        self.connections.drain()
    }
}
