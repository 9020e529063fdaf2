//! RTP reception core for RTSP servers
//!
//! This crate provides the receive-side media plumbing an RTSP server needs
//! once signalling has set up a session: UDP listeners that demultiplex
//! RTP/RTCP datagrams from many publishers, per-track reception statistics
//! per RFC 3550 (loss, sequence cycles, interarrival jitter, sender-report
//! round-trip data), and periodic RTCP Receiver Report generation.
//!
//! The library is organized into several modules:
//!
//! - `packet`: RTP and RTCP packet definitions and wire codecs
//! - `receiver`: per-track reception statistics and Receiver Report emission
//! - `reorder`: ascending-sequence presentation of incoming RTP
//! - `server`: the session/track/handler seam toward the signalling layer
//! - `transport`: UDP listeners and the peer-address client table
//! - `buffer`: receive-buffer pooling for the listener reader loops
//!
//! The RTSP state machine itself (SETUP/PLAY/TEARDOWN), SDP and codec
//! payload handling live elsewhere; they interact with this crate through
//! client registration on a listener and the [`server::ServerHandler`]
//! callbacks.

mod error;

// Main modules
pub mod buffer;
pub mod packet;
pub mod receiver;
pub mod reorder;
pub mod server;
pub mod transport;

// Re-export core types
pub use error::Error;

// Re-export common types from packet module
pub use packet::{RtpHeader, RtpPacket};
pub use packet::rtcp::{
    NtpTimestamp, RtcpPacket, RtcpReceiverReport, RtcpReportBlock,
    RtcpSenderReport,
};

// Re-export the main processing types
pub use receiver::RtcpReceiver;
pub use server::{ServerHandler, ServerSession, SessionTrack};
pub use transport::{ListenerBinding, ListenerRole, UdpListener, UdpListenerConfig};

/// The default maximum size for RTP/RTCP datagrams in bytes
///
/// Sized so a full datagram plus UDP/IP headers fits a 1500-byte Ethernet MTU.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 1472;

/// Typedef for RTP timestamp values
pub type RtpTimestamp = u32;

/// Typedef for RTP sequence numbers
pub type RtpSequenceNumber = u16;

/// Typedef for RTP synchronization source identifier
pub type RtpSsrc = u32;

/// Typedef for RTP contributing source identifier
pub type RtpCsrc = u32;

/// Result type for this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::{
        Error, Result, RtpHeader, RtpPacket, RtpSequenceNumber, RtpSsrc,
        RtpTimestamp,
    };

    pub use crate::packet::rtcp::{
        NtpTimestamp, RtcpPacket, RtcpReceiverReport, RtcpReportBlock,
        RtcpSenderReport,
    };

    pub use crate::receiver::RtcpReceiver;
    pub use crate::server::{ServerHandler, ServerSession, SessionTrack};
    pub use crate::transport::{
        ListenerBinding, ListenerRole, UdpListener, UdpListenerConfig,
    };
}
