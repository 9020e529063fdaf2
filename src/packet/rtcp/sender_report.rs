use bytes::{Buf, BufMut, BytesMut};

use crate::error::Error;
use crate::{Result, RtpSsrc};
use super::ntp::NtpTimestamp;
use super::report_block::RtcpReportBlock;

/// RTCP Sender Report (SR) packet
/// Defined in RFC 3550 Section 6.4.1
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpSenderReport {
    /// SSRC of the sender
    pub ssrc: RtpSsrc,

    /// NTP timestamp of this report
    pub ntp_timestamp: NtpTimestamp,

    /// RTP timestamp corresponding to the NTP timestamp
    pub rtp_timestamp: u32,

    /// Sender's packet count
    pub sender_packet_count: u32,

    /// Sender's octet count
    pub sender_octet_count: u32,

    /// Report blocks
    pub report_blocks: Vec<RtcpReportBlock>,
}

impl RtcpSenderReport {
    /// Size of the sender info section in bytes
    pub const SENDER_INFO_SIZE: usize = 20;

    /// Create a new sender report stamped with the current time
    pub fn new(ssrc: RtpSsrc) -> Self {
        Self {
            ssrc,
            ntp_timestamp: NtpTimestamp::now(),
            rtp_timestamp: 0,
            sender_packet_count: 0,
            sender_octet_count: 0,
            report_blocks: Vec::new(),
        }
    }

    /// Body size in bytes (everything after the common header)
    pub fn size(&self) -> usize {
        4 + Self::SENDER_INFO_SIZE + self.report_blocks.len() * RtcpReportBlock::SIZE
    }

    /// Serialize the report body (without the common header)
    pub fn serialize_body(&self, buf: &mut BytesMut) {
        buf.reserve(self.size());

        buf.put_u32(self.ssrc);

        buf.put_u32(self.ntp_timestamp.seconds);
        buf.put_u32(self.ntp_timestamp.fraction);

        buf.put_u32(self.rtp_timestamp);
        buf.put_u32(self.sender_packet_count);
        buf.put_u32(self.sender_octet_count);

        for block in &self.report_blocks {
            block.serialize(buf);
        }
    }
}

/// Parse a sender report body from RTCP packet data
pub fn parse_sender_report(buf: &mut impl Buf, report_count: u8) -> Result<RtcpSenderReport> {
    // SSRC (4) + sender info (20)
    if buf.remaining() < 24 {
        return Err(Error::BufferTooSmall {
            required: 24,
            available: buf.remaining(),
        });
    }

    let ssrc = buf.get_u32();

    let ntp_timestamp = NtpTimestamp {
        seconds: buf.get_u32(),
        fraction: buf.get_u32(),
    };

    let rtp_timestamp = buf.get_u32();
    let sender_packet_count = buf.get_u32();
    let sender_octet_count = buf.get_u32();

    let mut report_blocks = Vec::with_capacity(report_count as usize);
    for _ in 0..report_count {
        report_blocks.push(RtcpReportBlock::parse(buf)?);
    }

    Ok(RtcpSenderReport {
        ssrc,
        ntp_timestamp,
        rtp_timestamp,
        sender_packet_count,
        sender_octet_count,
        report_blocks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_report_body_roundtrip() {
        let sr = RtcpSenderReport {
            ssrc: 0x12345678,
            ntp_timestamp: NtpTimestamp { seconds: 0xAABBCCDD, fraction: 0x11223344 },
            rtp_timestamp: 160,
            sender_packet_count: 10,
            sender_octet_count: 1600,
            report_blocks: vec![RtcpReportBlock::new(0xabcdef01)],
        };

        let mut buf = BytesMut::new();
        sr.serialize_body(&mut buf);
        assert_eq!(buf.len(), sr.size());

        let parsed = parse_sender_report(&mut buf.freeze(), 1).unwrap();
        assert_eq!(parsed, sr);
    }

    #[test]
    fn test_sender_report_short_buffer() {
        let mut buf = bytes::Bytes::from_static(&[0u8; 12]);
        assert!(parse_sender_report(&mut buf, 0).is_err());
    }
}
