//! Connection table: slab-keyed registry of accepted stream connections.
//!
//! The two permanent sockets (listener, datagram) are not table members;
//! they are owned directly by the event loop and can never be evicted by
//! traffic. Slab keys double as mio token values for connection sockets.

use mio::net::TcpStream;
use slab::Slab;
use std::net::SocketAddr;

/// One accepted stream connection.
#[derive(Debug)]
pub struct Connection {
    /// The non-blocking stream, registered with the poll while in the table.
    pub stream: TcpStream,
    /// Remote endpoint captured at accept time, for diagnostics only.
    pub peer: SocketAddr,
    /// Payload bytes received over this connection.
    pub bytes_in: u64,
    /// Transcript bytes sent back over this connection.
    pub bytes_out: u64,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            bytes_in: 0,
            bytes_out: 0,
        }
    }
}

/// Registry of active connections using slab allocation.
///
/// Provides O(1) insert, lookup, and remove operations.
pub struct ConnectionTable {
    connections: Slab<Connection>,
    max_connections: usize,
}

impl ConnectionTable {
    /// Create a new table with the specified capacity limit.
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: Slab::with_capacity(max_connections),
            max_connections,
        }
    }

    /// Insert a new connection, returning its slab key.
    ///
    /// Returns `None` (dropping and thereby closing the connection) when the
    /// table is at capacity.
    pub fn insert(&mut self, conn: Connection) -> Option<usize> {
        if self.connections.len() >= self.max_connections {
            return None;
        }
        Some(self.connections.insert(conn))
    }

    /// Get a mutable reference to a connection.
    pub fn get_mut(&mut self, id: usize) -> Option<&mut Connection> {
        self.connections.get_mut(id)
    }

    /// Remove a connection from the table.
    pub fn remove(&mut self, id: usize) -> Option<Connection> {
        if self.connections.contains(id) {
            Some(self.connections.remove(id))
        } else {
            None
        }
    }

    /// Check if a connection exists.
    pub fn contains(&self, id: usize) -> bool {
        self.connections.contains(id)
    }

    /// Number of active connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Check if there are no connections.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Iterate over all connections.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Connection)> {
        self.connections.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepted loopback stream plus the client end keeping it alive.
    fn stream_pair() -> (TcpStream, SocketAddr, std::net::TcpStream) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let client = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, peer) = listener.accept().unwrap();
        server.set_nonblocking(true).unwrap();
        (TcpStream::from_std(server), peer, client)
    }

    #[test]
    fn test_insert_lookup_remove() {
        let mut table = ConnectionTable::new(4);
        let (stream, peer, _client) = stream_pair();

        let id = table.insert(Connection::new(stream, peer)).unwrap();
        assert!(table.contains(id));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get_mut(id).unwrap().peer, peer);
        assert_eq!(table.get_mut(id).unwrap().bytes_in, 0);

        let removed = table.remove(id).unwrap();
        assert_eq!(removed.peer, peer);
        assert!(!table.contains(id));
        assert!(table.is_empty());
        assert!(table.remove(id).is_none());
    }

    #[test]
    fn test_capacity_limit() {
        let mut table = ConnectionTable::new(2);
        let (s1, p1, _c1) = stream_pair();
        let (s2, p2, _c2) = stream_pair();
        let (s3, p3, _c3) = stream_pair();

        let id1 = table.insert(Connection::new(s1, p1)).unwrap();
        table.insert(Connection::new(s2, p2)).unwrap();

        // At capacity: the third connection is refused (and dropped).
        assert!(table.insert(Connection::new(s3, p3)).is_none());
        assert_eq!(table.len(), 2);

        // A freed slot is usable again.
        table.remove(id1);
        let (s4, p4, _c4) = stream_pair();
        assert!(table.insert(Connection::new(s4, p4)).is_some());
    }

    #[test]
    fn test_iter_covers_exactly_open_connections() {
        let mut table = ConnectionTable::new(4);
        let (s1, p1, _c1) = stream_pair();
        let (s2, p2, _c2) = stream_pair();

        let id1 = table.insert(Connection::new(s1, p1)).unwrap();
        let id2 = table.insert(Connection::new(s2, p2)).unwrap();
        table.remove(id1);

        let ids: Vec<usize> = table.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![id2]);
    }
}
