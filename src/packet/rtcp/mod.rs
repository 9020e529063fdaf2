//! RTCP packet module
//!
//! Structures for handling RTCP packets as defined in RFC 3550. Sender
//! Reports and Receiver Reports are fully decoded; every other packet type
//! is carried opaquely so it can still reach application handlers.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::Error;
use crate::Result;

mod ntp;
mod receiver_report;
mod report_block;
mod sender_report;

pub use ntp::NtpTimestamp;
pub use receiver_report::RtcpReceiverReport;
pub use report_block::RtcpReportBlock;
pub use sender_report::RtcpSenderReport;

use receiver_report::parse_receiver_report;
use sender_report::parse_sender_report;

/// RTCP version (same as RTP, always 2)
pub const RTCP_VERSION: u8 = 2;

/// Size of the common RTCP packet header in bytes
pub const RTCP_HEADER_SIZE: usize = 4;

/// Packet type code for Sender Reports
pub const RTCP_TYPE_SENDER_REPORT: u8 = 200;

/// Packet type code for Receiver Reports
pub const RTCP_TYPE_RECEIVER_REPORT: u8 = 201;

/// RTCP packet variants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtcpPacket {
    /// Sender Report (SR)
    SenderReport(RtcpSenderReport),

    /// Receiver Report (RR)
    ReceiverReport(RtcpReceiverReport),

    /// Any other RTCP packet kind, kept as raw bytes (header included)
    Other {
        /// Packet type code from the common header
        packet_type: u8,

        /// The complete packet as received
        data: Bytes,
    },
}

impl RtcpPacket {
    /// Parse one RTCP packet from the front of `buf`, advancing past it
    fn parse_one(buf: &mut Bytes) -> Result<Self> {
        if buf.remaining() < RTCP_HEADER_SIZE {
            return Err(Error::BufferTooSmall {
                required: RTCP_HEADER_SIZE,
                available: buf.remaining(),
            });
        }

        let raw = buf.clone();

        // Common header: version (2 bits), padding (1 bit), count (5 bits),
        // packet type (8 bits), length in 32-bit words minus one (16 bits)
        let first_byte = buf.get_u8();
        let version = (first_byte >> 6) & 0x03;
        if version != RTCP_VERSION {
            return Err(Error::RtcpError(format!("Invalid RTCP version: {}", version)));
        }
        let _padding = ((first_byte >> 5) & 0x01) != 0;
        let count = first_byte & 0x1F;

        let packet_type = buf.get_u8();
        let body_len = buf.get_u16() as usize * 4;

        if buf.remaining() < body_len {
            return Err(Error::BufferTooSmall {
                required: body_len,
                available: buf.remaining(),
            });
        }

        let mut body = buf.split_to(body_len);

        match packet_type {
            RTCP_TYPE_SENDER_REPORT => Ok(RtcpPacket::SenderReport(
                parse_sender_report(&mut body, count)?,
            )),
            RTCP_TYPE_RECEIVER_REPORT => Ok(RtcpPacket::ReceiverReport(
                parse_receiver_report(&mut body, count)?,
            )),
            _ => Ok(RtcpPacket::Other {
                packet_type,
                data: raw.slice(0..RTCP_HEADER_SIZE + body_len),
            }),
        }
    }

    /// Parse a single RTCP packet from bytes
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut buf = Bytes::copy_from_slice(data);
        Self::parse_one(&mut buf)
    }

    /// Parse a compound RTCP datagram into its constituent packets
    ///
    /// RTCP datagrams usually stack several packets back to back (e.g. an
    /// SR followed by an SDES). A malformed header anywhere in the chain
    /// fails the whole datagram; an empty datagram is an error.
    pub fn parse_compound(data: &[u8]) -> Result<Vec<Self>> {
        let mut buf = Bytes::copy_from_slice(data);
        let mut packets = Vec::new();

        while buf.has_remaining() {
            packets.push(Self::parse_one(&mut buf)?);
        }

        if packets.is_empty() {
            return Err(Error::RtcpError("empty RTCP datagram".to_string()));
        }

        Ok(packets)
    }

    /// Serialize the packet, common header included
    pub fn serialize(&self) -> Result<Bytes> {
        match self {
            RtcpPacket::SenderReport(sr) => {
                let mut buf = BytesMut::with_capacity(RTCP_HEADER_SIZE + sr.size());
                put_header(
                    &mut buf,
                    sr.report_blocks.len() as u8,
                    RTCP_TYPE_SENDER_REPORT,
                    sr.size(),
                )?;
                sr.serialize_body(&mut buf);
                Ok(buf.freeze())
            }
            RtcpPacket::ReceiverReport(rr) => {
                let mut buf = BytesMut::with_capacity(RTCP_HEADER_SIZE + rr.size());
                put_header(
                    &mut buf,
                    rr.report_blocks.len() as u8,
                    RTCP_TYPE_RECEIVER_REPORT,
                    rr.size(),
                )?;
                rr.serialize_body(&mut buf);
                Ok(buf.freeze())
            }
            RtcpPacket::Other { data, .. } => Ok(data.clone()),
        }
    }
}

/// Write a common RTCP header for a body of `body_len` bytes
fn put_header(buf: &mut BytesMut, count: u8, packet_type: u8, body_len: usize) -> Result<()> {
    if count > 0x1F {
        return Err(Error::RtcpError(format!("too many report blocks: {}", count)));
    }
    debug_assert_eq!(body_len % 4, 0);

    buf.put_u8((RTCP_VERSION << 6) | count);
    buf.put_u8(packet_type);
    buf.put_u16((body_len / 4) as u16);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_sr() -> RtcpSenderReport {
        RtcpSenderReport {
            ssrc: 0x12345678,
            ntp_timestamp: NtpTimestamp { seconds: 0xAABBCCDD, fraction: 0x11223344 },
            rtp_timestamp: 160,
            sender_packet_count: 10,
            sender_octet_count: 1600,
            report_blocks: Vec::new(),
        }
    }

    #[test]
    fn test_sender_report_roundtrip() {
        let original = RtcpPacket::SenderReport(sample_sr());

        let bytes = original.serialize().unwrap();
        // 4 header + 4 SSRC + 20 sender info
        assert_eq!(bytes.len(), 28);
        assert_eq!(bytes[0], 0x80);
        assert_eq!(bytes[1], 200);
        assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]), 6);

        let parsed = RtcpPacket::parse(&bytes).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_receiver_report_roundtrip() {
        let mut rr = RtcpReceiverReport::new(0xdeadbeef);
        rr.add_report_block(RtcpReportBlock {
            ssrc: 0x12345678,
            fraction_lost: 128,
            total_lost: 2,
            extended_highest_seq: 1002,
            jitter: 0,
            last_sr: 0x44556677,
            delay_since_last_sr: 131072,
        });
        let original = RtcpPacket::ReceiverReport(rr);

        let bytes = original.serialize().unwrap();
        assert_eq!(bytes.len(), 32);
        assert_eq!(bytes[0], 0x81);
        assert_eq!(bytes[1], 201);

        let parsed = RtcpPacket::parse(&bytes).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_parse_compound_sr_plus_other() {
        let sr_bytes = RtcpPacket::SenderReport(sample_sr()).serialize().unwrap();

        // Minimal SDES-like packet: version 2, count 0, type 202, length 1
        let trailer = [0x80u8, 202, 0x00, 0x01, 0xde, 0xad, 0xbe, 0xef];

        let mut datagram = Vec::from(&sr_bytes[..]);
        datagram.extend_from_slice(&trailer);

        let packets = RtcpPacket::parse_compound(&datagram).unwrap();
        assert_eq!(packets.len(), 2);
        assert!(matches!(packets[0], RtcpPacket::SenderReport(_)));
        match &packets[1] {
            RtcpPacket::Other { packet_type, data } => {
                assert_eq!(*packet_type, 202);
                assert_eq!(data.as_ref(), &trailer);
            }
            other => panic!("expected opaque packet, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_compound_rejects_truncated_chain() {
        let sr_bytes = RtcpPacket::SenderReport(sample_sr()).serialize().unwrap();

        let mut datagram = Vec::from(&sr_bytes[..]);
        // A header promising more body than the datagram holds
        datagram.extend_from_slice(&[0x80, 202, 0x00, 0x10]);

        assert!(RtcpPacket::parse_compound(&datagram).is_err());
    }

    #[test]
    fn test_parse_rejects_wrong_version() {
        let data = [0x40u8, 200, 0x00, 0x00];
        assert!(RtcpPacket::parse(&data).is_err());
    }

    #[test]
    fn test_parse_compound_rejects_empty() {
        assert!(RtcpPacket::parse_compound(&[]).is_err());
    }
}
