use thiserror::Error;
use std::io;

/// Error type for RTP reception operations
#[derive(Debug, Error, Clone)]
pub enum Error {
    /// Datagram filled the receive buffer completely and was truncated
    #[error("packet is too big to be read with UDP")]
    OversizedPacket,

    /// Invalid packet format
    #[error("Invalid RTP packet format: {0}")]
    InvalidPacket(String),

    /// Buffer too small
    #[error("Buffer too small: need {required} but have {available}")]
    BufferTooSmall {
        required: usize,
        available: usize,
    },

    /// RTCP error
    #[error("RTCP error: {0}")]
    RtcpError(String),

    /// The reorderer detected definitively missing packets
    #[error("{0} RTP packet(s) lost")]
    PacketsLost(u64),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// A UDP send did not complete within the configured write timeout
    #[error("write timed out")]
    WriteTimeout,

    /// IO error when sending/receiving packets
    #[error("IO error: {0}")]
    IoError(String),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::IoError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let lost = Error::PacketsLost(3);
        assert_eq!(lost.to_string(), "3 RTP packet(s) lost");

        let buffer_err = Error::BufferTooSmall { required: 24, available: 7 };
        assert_eq!(buffer_err.to_string(), "Buffer too small: need 24 but have 7");

        let io_err = Error::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(io_err.to_string().contains("IO error"));
    }
}
