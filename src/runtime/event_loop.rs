//! Readiness-multiplexed service loop.
//!
//! One mio `Poll` watches the listener, the datagram socket, and every
//! accepted connection. Each inbound payload is answered with its hex/ASCII
//! transcript; no per-connection threads, no locks. Connection-scoped
//! failures close only the affected connection; the loop exits only on a
//! poll failure or a non-transient accept failure.

use crate::codec::{Transcriber, MAX_MESSAGE};
use crate::runtime::bootstrap::BoundSockets;
use crate::runtime::peer;
use crate::runtime::registry::{Connection, ConnectionTable};
use mio::net::{TcpListener, UdpSocket};
use mio::{Events, Interest, Poll, Token};
use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

const LISTENER_TOKEN: Token = Token(usize::MAX);
const DATAGRAM_TOKEN: Token = Token(usize::MAX - 1);

/// Wait bound for one poll; also the idle tick period.
const POLL_TIMEOUT: Duration = Duration::from_secs(1);

const EVENT_CAPACITY: usize = 256;

pub struct EventLoop {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    datagram: UdpSocket,
    connections: ConnectionTable,
    transcriber: Transcriber,
    read_buf: Box<[u8]>,
}

impl EventLoop {
    /// Register the two permanent sockets and set up the loop state.
    pub fn new(
        mut sockets: BoundSockets,
        max_connections: usize,
        transcriber: Transcriber,
    ) -> io::Result<Self> {
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut sockets.listener, LISTENER_TOKEN, Interest::READABLE)?;
        poll.registry()
            .register(&mut sockets.datagram, DATAGRAM_TOKEN, Interest::READABLE)?;

        Ok(Self {
            poll,
            events: Events::with_capacity(EVENT_CAPACITY),
            listener: sockets.listener,
            datagram: sockets.datagram,
            connections: ConnectionTable::new(max_connections),
            transcriber,
            read_buf: vec![0u8; MAX_MESSAGE].into_boxed_slice(),
        })
    }

    /// Run until a fatal error. Ordinary per-connection failures never exit.
    pub fn run(&mut self) -> io::Result<()> {
        loop {
            self.poll.poll(&mut self.events, Some(POLL_TIMEOUT))?;

            if self.events.is_empty() {
                trace!(connections = self.connections.len(), "Timeout tick");
                continue;
            }

            // Dispatch in ascending token order so a given readiness batch
            // is handled deterministically. Connection tokens sort before
            // the two permanent tokens.
            let mut ready: Vec<Token> = self.events.iter().map(|e| e.token()).collect();
            ready.sort_unstable();
            ready.dedup();

            for token in ready {
                match token {
                    LISTENER_TOKEN => self.accept_pending()?,
                    DATAGRAM_TOKEN => self.serve_datagrams(),
                    Token(conn_id) => self.serve_connection(conn_id),
                }
            }
        }
    }

    /// Drain the accept queue, registering each new connection.
    ///
    /// Aborted or interrupted accepts are transient and retried on the next
    /// readiness event; any other accept error still tears the service down.
    fn accept_pending(&mut self) -> io::Result<()> {
        loop {
            match self.listener.accept() {
                Ok((stream, peer_addr)) => {
                    let Some(conn_id) = self.connections.insert(Connection::new(stream, peer_addr))
                    else {
                        warn!(
                            peer = %peer::name_port(&peer_addr),
                            "Connection limit reached, rejecting"
                        );
                        continue;
                    };

                    // Re-borrow after insert
                    let conn = self
                        .connections
                        .get_mut(conn_id)
                        .expect("connection just inserted");
                    self.poll.registry().register(
                        &mut conn.stream,
                        Token(conn_id),
                        Interest::READABLE,
                    )?;

                    info!(conn_id, peer = %peer::name_port(&peer_addr), "New connection");
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e)
                    if e.kind() == io::ErrorKind::Interrupted
                        || e.kind() == io::ErrorKind::ConnectionAborted =>
                {
                    warn!(error = %e, "Transient accept failure");
                }
                Err(e) => {
                    error!(error = %e, "Accept failed");
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Drain pending datagrams, answering each with its transcript.
    ///
    /// Receive errors are dropped and the reply is skipped; the datagram
    /// socket itself is never closed by traffic.
    fn serve_datagrams(&mut self) {
        loop {
            match self.datagram.recv_from(&mut self.read_buf) {
                Ok((nread, peer_addr)) => {
                    debug!(
                        bytes_in = nread,
                        peer = %peer::name_port(&peer_addr),
                        "Datagram received"
                    );

                    let reply = self.transcriber.transcribe(&self.read_buf[..nread]);
                    match self.datagram.send_to(reply, peer_addr) {
                        Ok(nsent) => {
                            debug!(
                                bytes_out = nsent,
                                peer = %peer::name_port(&peer_addr),
                                "Datagram reply sent"
                            );
                        }
                        Err(e) => {
                            warn!(
                                error = %e,
                                peer = %peer::name_port(&peer_addr),
                                "Error sending datagram reply"
                            );
                        }
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    debug!(error = %e, "Ignoring datagram receive error");
                    break;
                }
            }
        }
    }

    /// One dispatch step for a ready connection.
    fn serve_connection(&mut self, conn_id: usize) {
        // May have been closed earlier in this dispatch round.
        if !self.connections.contains(conn_id) {
            return;
        }

        if let Err(e) = self.try_serve(conn_id) {
            debug!(conn_id, error = %e, "Connection error");
            self.close_connection(conn_id);
        }
    }

    /// Pending-byte query, single best-effort read, transcribe, reply.
    ///
    /// Zero readable bytes on a readable connection means the peer sent FIN;
    /// the connection is closed in place and `Ok` returned.
    fn try_serve(&mut self, conn_id: usize) -> io::Result<()> {
        let conn = self
            .connections
            .get_mut(conn_id)
            .expect("presence checked by caller");
        let pending = pending_bytes(conn.stream.as_raw_fd())?;

        if pending == 0 {
            self.close_connection(conn_id);
            return Ok(());
        }

        let want = pending.min(self.read_buf.len());
        let conn = self
            .connections
            .get_mut(conn_id)
            .expect("presence checked by caller");
        let nread = match conn.stream.read(&mut self.read_buf[..want]) {
            Ok(0) => {
                // Raced with a FIN between the pending query and the read.
                self.close_connection(conn_id);
                return Ok(());
            }
            Ok(n) => n,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(e) => return Err(e),
        };

        conn.bytes_in += nread as u64;
        debug!(
            conn_id,
            bytes_in = nread,
            peer = %peer::name_port(&conn.peer),
            "Received"
        );

        let reply = self.transcriber.transcribe(&self.read_buf[..nread]);

        // Best-effort reply: continue over short writes, but give up on a
        // full send buffer rather than stall the loop.
        let mut written = 0;
        while written < reply.len() {
            match conn.stream.write(&reply[written..]) {
                Ok(0) => {
                    return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0"));
                }
                Ok(n) => written += n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    warn!(
                        conn_id,
                        dropped = reply.len() - written,
                        "Send buffer full, reply truncated"
                    );
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        conn.bytes_out += written as u64;
        debug!(conn_id, bytes_out = written, "Reply sent");
        Ok(())
    }

    /// Deregister, remove, and drop one connection.
    fn close_connection(&mut self, conn_id: usize) {
        if let Some(mut conn) = self.connections.remove(conn_id) {
            let _ = self.poll.registry().deregister(&mut conn.stream);
            info!(
                conn_id,
                peer = %peer::name_port(&conn.peer),
                bytes_in = conn.bytes_in,
                bytes_out = conn.bytes_out,
                "Closing connection"
            );
        }
    }
}

/// Number of bytes queued for reading on a socket (FIONREAD).
fn pending_bytes(fd: RawFd) -> io::Result<usize> {
    let mut count: libc::c_int = 0;
    // Safety: fd is a valid open socket and count outlives the call.
    let rc = unsafe { libc::ioctl(fd, libc::FIONREAD, &mut count as *mut libc::c_int) };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(count as usize)
}
