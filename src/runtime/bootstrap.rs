//! Socket bootstrap: resolve the configured endpoint and bind the two
//! permanent sockets.
//!
//! The host/service pair may resolve to several candidate addresses; they
//! are tried in order and the first one where both the stream listener and
//! the datagram socket bind wins. The datagram socket binds to the
//! listener's actual local address, so port 0 yields a shared ephemeral
//! port.

use crate::runtime::peer;
use mio::net::{TcpListener, UdpSocket};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use tracing::{info, warn};

const LISTEN_BACKLOG: i32 = 1024;

/// The two permanent sockets, bound to one endpoint.
pub struct BoundSockets {
    pub listener: TcpListener,
    pub datagram: UdpSocket,
    /// The endpoint actually bound (relevant when port 0 was requested).
    pub local: SocketAddr,
}

/// Resolve `host`/`port` and bind both permanent sockets on the first
/// candidate where the pair succeeds.
pub fn bind(host: &str, port: u16) -> io::Result<BoundSockets> {
    let candidates: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();

    if candidates.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no addresses resolved for {host} port {port}"),
        ));
    }

    for addr in &candidates {
        match bind_pair(*addr) {
            Ok(bound) => {
                info!(addr = %peer::name_port(&bound.local), "Listening on tcp/udp");
                return Ok(bound);
            }
            Err(e) => {
                warn!(addr = %peer::name_port(addr), error = %e, "Bind candidate failed");
            }
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AddrInUse,
        format!("could not bind any resolved address for {host} port {port}"),
    ))
}

fn bind_pair(addr: SocketAddr) -> io::Result<BoundSockets> {
    let listener = create_listener(addr)?;
    let local = listener.local_addr()?;
    let datagram = create_datagram(local)?;

    Ok(BoundSockets {
        listener: TcpListener::from_std(listener),
        datagram: UdpSocket::from_std(datagram),
        local,
    })
}

/// Create a non-blocking TCP listener with SO_REUSEADDR.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
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
    socket.listen(LISTEN_BACKLOG)?;

    Ok(socket.into())
}

/// Create a non-blocking UDP socket on the same endpoint.
fn create_datagram(addr: SocketAddr) -> io::Result<std::net::UdpSocket> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::DGRAM,
        Some(socket2::Protocol::UDP),
    )?;

    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;

    Ok(socket.into())
}
