//! The event loop.
//!
//! One thread owns the listener, every connection, and the storage engine.
//! mio surfaces edge-triggered readiness, so each notification is drained
//! to `WouldBlock`: the accept loop drains the accept queue, the read path
//! drains the socket, and the write path drains the output buffer. A
//! partially-flushed connection simply resumes on its next WRITABLE edge;
//! interest stays registered for both directions.
//!
//! Disk I/O during dispatch (warm-eviction spill, cold-tier load) runs
//! synchronously on this thread; it only occurs on evicting SETs and on
//! GET misses that hit the cold tier.

use crate::config::Config;
use crate::connection::Connection;
use crate::metrics::{CONNECTIONS_ACCEPTED, CONNECTIONS_ACTIVE};
use blinkdb_cache::BlinkDb;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use protocol_resp::ParseOptions;
use slab::Slab;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Token offset for the listener to avoid collision with connections.
const LISTENER: Token = Token(1 << 30);

/// Poll timeout; bounds shutdown-flag latency when the server is idle.
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Scratch buffer size for socket reads.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Listen backlog.
const BACKLOG: u32 = 4096;

struct Session {
    stream: TcpStream,
    conn: Connection,
}

/// Single-threaded reactor over non-blocking sockets.
pub struct Reactor {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    sessions: Slab<Session>,
    db: BlinkDb,
    shutdown: Arc<AtomicBool>,
    recv_buf: Vec<u8>,
    max_connections: usize,
    max_input_buffer: usize,
    options: ParseOptions,
}

impl Reactor {
    /// Bind the listener and set up the poll registry. Failures here are
    /// fatal for the process.
    pub fn bind(config: &Config, db: BlinkDb, shutdown: Arc<AtomicBool>) -> io::Result<Self> {
        let mut listener = listen(config.listener.address, BACKLOG)?;
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;

        let options = ParseOptions {
            max_bulk_len: config.cache.max_value_size,
            ..ParseOptions::default()
        };
        // A full command is a handful of framing bytes around one value;
        // double the value ceiling comfortably bounds the input buffer.
        let max_input_buffer = config.cache.max_value_size.saturating_mul(2).max(1024 * 1024);

        Ok(Self {
            poll,
            events: Events::with_capacity(1024),
            listener,
            sessions: Slab::with_capacity(config.server.max_connections.min(4096)),
            db,
            shutdown,
            recv_buf: vec![0u8; READ_BUFFER_SIZE],
            max_connections: config.server.max_connections,
            max_input_buffer,
            options,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run until the shutdown flag is set, then persist the disk index.
    pub fn run(&mut self) -> io::Result<()> {
        info!(address = %self.local_addr()?, "listening");

        while !self.shutdown.load(Ordering::Relaxed) {
            match self.poll.poll(&mut self.events, Some(POLL_TIMEOUT)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            // Collect event info first; handlers need &mut self.
            let ready: Vec<(Token, bool, bool, bool)> = self
                .events
                .iter()
                .map(|e| {
                    (
                        e.token(),
                        e.is_readable(),
                        e.is_writable(),
                        e.is_read_closed() || e.is_write_closed() || e.is_error(),
                    )
                })
                .collect();

            for (token, readable, writable, closed) in ready {
                if token == LISTENER {
                    self.accept_pending();
                    continue;
                }
                let idx = token.0;
                if readable && self.sessions.contains(idx) {
                    self.handle_readable(idx);
                }
                if writable && self.sessions.contains(idx) {
                    self.handle_writable(idx);
                }
                if closed && self.sessions.contains(idx) {
                    // Half-closed peer: flush what we owe, then close.
                    if let Some(session) = self.sessions.get_mut(idx) {
                        session.conn.set_closing();
                    }
                    self.flush(idx);
                    self.maybe_close(idx);
                }
            }
        }

        let stats = self.db.stats();
        info!(
            hits = stats.hits,
            misses = stats.misses,
            disk_loads = stats.disk_loads,
            disk_spills = stats.disk_spills,
            "shutting down"
        );
        self.db.persist()?;
        info!("disk index persisted");
        Ok(())
    }

    /// Drain the accept queue. Edge-triggered readiness only fires on
    /// transitions, so stopping early would strand queued connections.
    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, addr)) => {
                    if self.sessions.len() >= self.max_connections {
                        debug!(%addr, "connection limit reached, dropping");
                        continue;
                    }
                    let _ = stream.set_nodelay(true);

                    let entry = self.sessions.vacant_entry();
                    let token = Token(entry.key());
                    if let Err(e) = self.poll.registry().register(
                        &mut stream,
                        token,
                        Interest::READABLE | Interest::WRITABLE,
                    ) {
                        warn!(error = %e, "failed to register connection");
                        continue;
                    }
                    entry.insert(Session {
                        stream,
                        conn: Connection::new(8192, self.options),
                    });
                    CONNECTIONS_ACCEPTED.increment();
                    CONNECTIONS_ACTIVE.increment();
                    debug!(%addr, "accepted");
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    break;
                }
            }
        }
    }

    /// Drain the socket, process complete commands, and flush replies.
    ///
    /// Edge-triggered readiness fires only on transitions, so input left
    /// buffered here is announced by nothing; the outer loop keeps
    /// alternating process and flush for as long as flushing relieves
    /// backpressure, and stops only on `WouldBlock`, EOF, or a still
    /// backed-up output buffer (resumed by the next WRITABLE edge).
    fn handle_readable(&mut self, idx: usize) {
        loop {
            loop {
                let Some(session) = self.sessions.get_mut(idx) else {
                    return;
                };
                // Process buffered input first: a resumed connection may
                // hold commands that arrived before reads paused.
                session.conn.process(&mut self.db);
                if !session.conn.should_read() {
                    break;
                }
                match session.stream.read(&mut self.recv_buf) {
                    Ok(0) => {
                        session.conn.set_closing();
                        break;
                    }
                    Ok(n) => {
                        if session.conn.input_len() + n > self.max_input_buffer {
                            session.conn.fail_protocol();
                        } else {
                            session.conn.append_recv_data(&self.recv_buf[..n]);
                        }
                        // Appended bytes are processed at the loop top.
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(_) => {
                        // Socket error: close silently, no reply owed.
                        self.close_session(idx);
                        return;
                    }
                }
            }

            let was_backpressured = self
                .sessions
                .get(idx)
                .map(|s| !s.conn.closing() && !s.conn.should_read())
                .unwrap_or(false);

            self.flush(idx);

            if !was_backpressured {
                break;
            }
            let relieved = self
                .sessions
                .get(idx)
                .map(|s| s.conn.should_read())
                .unwrap_or(false);
            if !relieved {
                // Output is still backed up after a full flush attempt;
                // the next WRITABLE edge resumes this connection.
                break;
            }
            // Flushing freed the output buffer: go around again to finish
            // the input we already hold.
        }
        self.maybe_close(idx);
    }

    /// The socket became writable: drain pending output, then resume
    /// reading if backpressure had paused it.
    fn handle_writable(&mut self, idx: usize) {
        self.flush(idx);
        let resume = self
            .sessions
            .get(idx)
            .map(|s| s.conn.should_read())
            .unwrap_or(false);
        if resume {
            // Process input buffered during backpressure and pick up any
            // socket bytes that arrived while reads were paused (no new
            // READABLE edge will announce those).
            self.handle_readable(idx);
        } else {
            self.maybe_close(idx);
        }
    }

    /// Write pending output until drained or the socket would block.
    fn flush(&mut self, idx: usize) {
        loop {
            let Some(session) = self.sessions.get_mut(idx) else {
                return;
            };
            if !session.conn.has_pending_write() {
                return;
            }
            match session.stream.write(session.conn.pending_write_data()) {
                Ok(0) => {
                    self.close_session(idx);
                    return;
                }
                Ok(n) => session.conn.advance_write(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => {
                    self.close_session(idx);
                    return;
                }
            }
        }
    }

    /// Close a closing connection once its output buffer has drained.
    fn maybe_close(&mut self, idx: usize) {
        let done = self
            .sessions
            .get(idx)
            .map(|s| s.conn.closing() && !s.conn.has_pending_write())
            .unwrap_or(false);
        if done {
            self.close_session(idx);
        }
    }

    fn close_session(&mut self, idx: usize) {
        if let Some(mut session) = self.sessions.try_remove(idx) {
            let _ = self.poll.registry().deregister(&mut session.stream);
            CONNECTIONS_ACTIVE.decrement();
        }
    }
}

/// Build a non-blocking listener with SO_REUSEADDR.
fn listen(addr: SocketAddr, backlog: u32) -> io::Result<TcpListener> {
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
    socket.listen(backlog as i32)?;

    let std_listener: std::net::TcpListener = socket.into();
    Ok(TcpListener::from_std(std_listener))
}
