//! Peer-address normalisation and the client table
//!
//! The signalling layer registers each peer's (IP, port) when a session
//! enters its PLAY/RECORD window; the listener reader loops look the
//! source address of every datagram up here. Lookups vastly outnumber
//! mutations, hence the readers-writer lock.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, RwLock};

use crate::server::ServerSession;

/// Canonical peer address key
///
/// IPv4 addresses are stored v6-mapped (`::ffff:a.b.c.d`) so the same peer
/// compares equal regardless of which address family the kernel reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerAddr {
    ip: [u8; 16],
    port: u16,
}

impl PeerAddr {
    /// Build a key from an IP address and port
    pub fn new(ip: IpAddr, port: u16) -> Self {
        let ip = match ip {
            IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
            IpAddr::V6(v6) => v6.octets(),
        };
        Self { ip, port }
    }
}

impl From<SocketAddr> for PeerAddr {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }
}

/// What a registered peer address maps to
#[derive(Clone)]
pub struct ClientEntry {
    /// The session the peer belongs to
    pub session: Arc<ServerSession>,

    /// Which of the session's tracks this address carries
    pub track_id: usize,

    /// Publisher (RECORD) or reader (PLAY) direction
    pub is_publishing: bool,
}

/// Mapping from normalised peer addresses to sessions/tracks
///
/// Mutated by signalling, read on every datagram.
#[derive(Default)]
pub struct ClientTable {
    clients: RwLock<HashMap<PeerAddr, ClientEntry>>,
}

impl ClientTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for a peer address
    pub fn add_client(
        &self,
        ip: IpAddr,
        port: u16,
        session: Arc<ServerSession>,
        track_id: usize,
        is_publishing: bool,
    ) {
        let mut clients = self.clients.write().unwrap();
        clients.insert(
            PeerAddr::new(ip, port),
            ClientEntry {
                session,
                track_id,
                is_publishing,
            },
        );
    }

    /// Remove every entry belonging to a session
    ///
    /// Teardown does not necessarily know the peer addresses any more, so
    /// removal is by session identity.
    pub fn remove_session(&self, session: &Arc<ServerSession>) {
        let mut clients = self.clients.write().unwrap();
        clients.retain(|_, entry| !Arc::ptr_eq(&entry.session, session));
    }

    /// Look a peer address up; a miss means the datagram is dropped
    pub fn lookup(&self, addr: &PeerAddr) -> Option<ClientEntry> {
        self.clients.read().unwrap().get(addr).cloned()
    }

    /// Number of registered peer addresses
    pub fn len(&self) -> usize {
        self.clients.read().unwrap().len()
    }

    /// Whether the table holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
