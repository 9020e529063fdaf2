use bytes::{Buf, BufMut, BytesMut};

use crate::error::Error;
use crate::{Result, RtpSsrc};
use super::report_block::RtcpReportBlock;

/// RTCP Receiver Report (RR) packet
/// Defined in RFC 3550 Section 6.4.2
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpReceiverReport {
    /// SSRC of the receiver
    pub ssrc: RtpSsrc,

    /// Report blocks
    pub report_blocks: Vec<RtcpReportBlock>,
}

impl RtcpReceiverReport {
    /// Create a new receiver report
    pub fn new(ssrc: RtpSsrc) -> Self {
        Self {
            ssrc,
            report_blocks: Vec::new(),
        }
    }

    /// Add a report block
    pub fn add_report_block(&mut self, block: RtcpReportBlock) {
        self.report_blocks.push(block);
    }

    /// Body size in bytes (everything after the common header)
    pub fn size(&self) -> usize {
        4 + self.report_blocks.len() * RtcpReportBlock::SIZE
    }

    /// Serialize the report body (without the common header)
    pub fn serialize_body(&self, buf: &mut BytesMut) {
        buf.reserve(self.size());

        buf.put_u32(self.ssrc);

        for block in &self.report_blocks {
            block.serialize(buf);
        }
    }
}

/// Parse a receiver report body from RTCP packet data
pub fn parse_receiver_report(buf: &mut impl Buf, report_count: u8) -> Result<RtcpReceiverReport> {
    if buf.remaining() < 4 {
        return Err(Error::BufferTooSmall {
            required: 4,
            available: buf.remaining(),
        });
    }

    let ssrc = buf.get_u32();

    let mut report_blocks = Vec::with_capacity(report_count as usize);
    for _ in 0..report_count {
        report_blocks.push(RtcpReportBlock::parse(buf)?);
    }

    Ok(RtcpReceiverReport { ssrc, report_blocks })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receiver_report_creation() {
        let rr = RtcpReceiverReport::new(0x12345678);

        assert_eq!(rr.ssrc, 0x12345678);
        assert!(rr.report_blocks.is_empty());
        assert_eq!(rr.size(), 4);
    }

    #[test]
    fn test_receiver_report_body_roundtrip() {
        let mut original = RtcpReceiverReport::new(0x12345678);
        original.add_report_block(RtcpReportBlock {
            ssrc: 0xabcdef01,
            fraction_lost: 42,
            total_lost: 1000,
            extended_highest_seq: 5000,
            jitter: 100,
            last_sr: 0x87654321,
            delay_since_last_sr: 1500,
        });
        original.add_report_block(RtcpReportBlock::new(0x11223344));

        let mut buf = BytesMut::new();
        original.serialize_body(&mut buf);
        assert_eq!(buf.len(), original.size());

        let parsed = parse_receiver_report(&mut buf.freeze(), 2).unwrap();
        assert_eq!(parsed, original);
    }
}
