//! mio event loop implementation.
//!
//! Readiness-based model: poll tells us when sockets are ready,
//! then we perform non-blocking read/write syscalls.
//! Uses epoll on Linux, kqueue on macOS.
//!
//! Everything runs on one thread. Once a socket is reported ready, its
//! frames are decoded, dispatched, encoded and written before the loop
//! looks at any other socket, so a slow handler delays every peer.
//!
//! ## Framing
//!
//! Each read of at most `read_size` bytes is handled as one complete frame.
//! TCP does not preserve message boundaries, so a frame split across two
//! reads (or two frames landing in one read) will not decode. Peers are
//! expected to send one frame and wait for the answer.

use crate::config::Config;
use crate::protocols::ftp::Dispatcher;
use crate::runtime::connection::{ConnState, Connection, ConnectionRegistry, ReadOutcome};
use crate::runtime::request::{process_ftp, process_ingest, welcome, ProcessResult, Protocol};
use crate::runtime::FrameCodec;
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token, Waker};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

const LISTENER_TOKEN: Token = Token(usize::MAX);
const WAKER_TOKEN: Token = Token(usize::MAX - 1);

/// Events handled per poll.
const EVENT_CAPACITY: usize = 256;

/// Stops a running [`Server`] from any thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    waker: Arc<Waker>,
    requested: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Ask the event loop to close every peer and return.
    pub fn shutdown(&self) {
        self.requested.store(true, Ordering::SeqCst);
        if let Err(e) = self.waker.wake() {
            error!(error = %e, "Failed to wake event loop");
        }
    }
}

/// Single-threaded server: one listener, many peers, one poll.
pub struct Server {
    poll: Poll,
    listener: TcpListener,
    connections: ConnectionRegistry,
    protocol: Protocol,
    dispatcher: Dispatcher,
    codec: FrameCodec,
    read_size: usize,
    waker: Arc<Waker>,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    /// Bind the listening socket. Failure here is fatal to startup.
    pub fn bind(config: &Config, protocol: Protocol) -> io::Result<Self> {
        let poll = Poll::new()?;
        let mut listener = TcpListener::from_std(create_listener(config.listen, config.backlog)?);
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);

        Ok(Self {
            poll,
            listener,
            connections: ConnectionRegistry::new(config.max_connections),
            protocol,
            dispatcher: Dispatcher::new(),
            codec: FrameCodec::new(config.compression_level),
            read_size: config.read_size,
            waker,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Replace the command dispatcher.
    #[cfg(test)]
    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Number of open peer connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            waker: Arc::clone(&self.waker),
            requested: Arc::clone(&self.shutdown),
        }
    }

    /// Serve until shut down.
    pub fn run(&mut self) -> io::Result<()> {
        info!(
            addr = %self.local_addr()?,
            protocol = ?self.protocol,
            read_size = self.read_size,
            "Server listening"
        );

        let mut events = Events::with_capacity(EVENT_CAPACITY);
        while self.poll_once(&mut events, None)? {}
        info!("Server stopped");
        Ok(())
    }

    /// Wait for readiness once and handle every reported event.
    ///
    /// Returns `false` once shutdown has been requested; all peers are
    /// closed by then.
    pub fn poll_once(
        &mut self,
        events: &mut Events,
        timeout: Option<Duration>,
    ) -> io::Result<bool> {
        match self.poll.poll(events, timeout) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => return Ok(true),
            Err(e) => return Err(e),
        }

        for event in events.iter() {
            match event.token() {
                LISTENER_TOKEN => self.accept_connections(),
                WAKER_TOKEN => {}
                Token(conn_id) => {
                    if let Err(e) = self.handle_connection_event(conn_id, event) {
                        debug!(conn_id, error = %e, "Connection error");
                        self.close_connection(conn_id);
                    }
                }
            }
        }

        if self.shutdown.load(Ordering::SeqCst) {
            self.close_all();
            return Ok(false);
        }
        Ok(true)
    }

    fn accept_connections(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer_addr)) => {
                    let conn = Connection::new(stream, peer_addr);
                    let conn_id = match self.connections.insert(conn) {
                        Ok(id) => id,
                        Err(_) => {
                            warn!(
                                peer = %peer_addr,
                                max = self.connections.capacity(),
                                "Connection limit reached"
                            );
                            continue;
                        }
                    };

                    if let Err(e) = self.open_connection(conn_id) {
                        debug!(conn_id, error = %e, "Failed to open connection");
                        self.close_connection(conn_id);
                        continue;
                    }

                    info!(
                        conn_id,
                        peer = %peer_addr,
                        open = self.connection_count(),
                        "New connection"
                    );
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("Accept error: {}", e);
                    break;
                }
            }
        }
    }

    /// Register a freshly accepted peer and greet it.
    fn open_connection(&mut self, conn_id: usize) -> io::Result<()> {
        let greeting = welcome(self.protocol, &self.codec).map_err(io::Error::other)?;

        let conn = lookup(&mut self.connections, conn_id)?;
        self.poll
            .registry()
            .register(&mut conn.stream, Token(conn_id), Interest::READABLE)?;

        if let Some(frame) = greeting {
            conn.queue(&frame);
            self.flush_connection(conn_id)?;
        }
        Ok(())
    }

    fn handle_connection_event(
        &mut self,
        conn_id: usize,
        event: &mio::event::Event,
    ) -> io::Result<()> {
        if !self.connections.contains(conn_id) {
            return Ok(());
        }

        if event.is_readable() {
            self.handle_readable(conn_id)?;
        }

        // Re-check connection exists (may have been removed)
        if !self.connections.contains(conn_id) {
            return Ok(());
        }

        if event.is_writable() {
            self.flush_connection(conn_id)?;
        }

        Ok(())
    }

    /// Read and answer frames until the socket is drained, output backs up,
    /// or the connection closes.
    fn handle_readable(&mut self, conn_id: usize) -> io::Result<()> {
        loop {
            let conn = match self.connections.get_mut(conn_id) {
                Some(conn) if conn.state == ConnState::Reading => conn,
                _ => return Ok(()),
            };

            match conn.read_frame(self.read_size)? {
                ReadOutcome::Frame(n) => trace!(conn_id, bytes = n, "Read frame"),
                ReadOutcome::WouldBlock => return Ok(()),
                ReadOutcome::Eof => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "peer closed connection",
                    ));
                }
            }

            let result = match self.protocol {
                Protocol::Ftp => {
                    let (frame, auth) = conn.frame_and_auth();
                    process_ftp(conn_id, frame, auth, &self.dispatcher, &self.codec)
                }
                Protocol::Ingest => process_ingest(conn_id, conn.frame(), &self.codec),
            };

            match result {
                ProcessResult::Response(frame) => conn.queue(&frame),
                ProcessResult::Quit(frame) => {
                    conn.queue(&frame);
                    conn.close();
                }
                ProcessResult::Consumed => continue,
                ProcessResult::Error => {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "protocol error"));
                }
            }

            self.flush_connection(conn_id)?;
        }
    }

    /// Push pending output, then pick the next state and poll interest.
    fn flush_connection(&mut self, conn_id: usize) -> io::Result<()> {
        let conn = lookup(&mut self.connections, conn_id)?;
        let drained = conn.flush()?;

        if drained && conn.state == ConnState::Closing {
            debug!(conn_id, "Client quit");
            self.close_connection(conn_id);
            return Ok(());
        }

        if drained {
            conn.start_reading();
        } else {
            trace!(conn_id, pending = conn.pending_len(), "Output backed up");
            conn.start_writing();
        }

        let interest = conn.desired_interest();
        if conn.set_interest(interest) {
            self.poll
                .registry()
                .reregister(&mut conn.stream, Token(conn_id), interest)?;
        }
        Ok(())
    }

    fn close_connection(&mut self, conn_id: usize) {
        if let Some(mut conn) = self.connections.remove(conn_id) {
            let _ = self.poll.registry().deregister(&mut conn.stream);
            conn.shutdown();
            debug!(conn_id, peer = %conn.addr, "Connection closed");
        }
    }

    fn close_all(&mut self) {
        let registry = self.poll.registry();
        for mut conn in self.connections.drain() {
            let _ = registry.deregister(&mut conn.stream);
            conn.shutdown();
        }
    }
}

fn lookup(connections: &mut ConnectionRegistry, conn_id: usize) -> io::Result<&mut Connection> {
    connections
        .get_mut(conn_id)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "connection not found"))
}

/// Create a non-blocking TCP listener with SO_REUSEADDR.
fn create_listener(addr: SocketAddr, backlog: u32) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(i32::try_from(backlog).unwrap_or(i32::MAX))?;

    Ok(socket.into())
}
