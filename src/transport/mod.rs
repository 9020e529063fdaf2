//! UDP transport for RTP/RTCP ingestion
//!
//! Each [`UdpListener`] owns one socket in one role (RTP or RTCP), bound
//! either to a unicast address or to a multicast group, and demultiplexes
//! incoming datagrams to registered clients via the [`clients::ClientTable`].

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::DEFAULT_MAX_PACKET_SIZE;

pub mod clients;
pub mod udp;

pub use clients::{ClientEntry, ClientTable, PeerAddr};
pub use udp::UdpListener;

/// Which half of the media transport a listener carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerRole {
    /// RTP media packets
    Rtp,

    /// RTCP control packets
    Rtcp,
}

/// How a listener's socket is bound
#[derive(Debug, Clone)]
pub enum ListenerBinding {
    /// Bind to the given local address
    Unicast(SocketAddr),

    /// Bind to the wildcard address on `port` and join `group` on every
    /// multicast-capable interface
    Multicast {
        group: Ipv4Addr,
        port: u16,
    },
}

/// UDP listener configuration
#[derive(Debug, Clone)]
pub struct UdpListenerConfig {
    /// Listener role
    pub role: ListenerRole,

    /// Socket binding mode
    pub binding: ListenerBinding,

    /// TTL applied to outgoing multicast packets
    pub multicast_ttl: u32,

    /// Kernel receive buffer size (SO_RCVBUF); 0 leaves the kernel default
    pub read_buffer_size: usize,

    /// Deadline applied to each send
    pub write_timeout: Duration,

    /// Largest datagram accepted; anything larger is a decode error
    pub max_packet_size: usize,
}

impl Default for UdpListenerConfig {
    fn default() -> Self {
        Self {
            role: ListenerRole::Rtp,
            binding: ListenerBinding::Unicast("0.0.0.0:0".parse().unwrap()),
            multicast_ttl: 16,
            read_buffer_size: 0x80000,
            write_timeout: Duration::from_secs(10),
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }
}
