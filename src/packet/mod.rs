//! RTP packet module
//!
//! Structures for handling RTP packets as defined in RFC 3550, with
//! parsing and serialization on top of `bytes`. RTCP lives in the
//! [`rtcp`] submodule.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

use crate::error::Error;
use crate::{Result, RtpCsrc, RtpSequenceNumber, RtpSsrc, RtpTimestamp};

pub mod rtcp;

/// RTP protocol version (always 2 in practice)
pub const RTP_VERSION: u8 = 2;

/// Minimum header size (without CSRC or extensions)
pub const RTP_MIN_HEADER_SIZE: usize = 12;

/// RTP header implementation according to RFC 3550
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpHeader {
    /// RTP version (should be 2)
    pub version: u8,

    /// Padding flag
    pub padding: bool,

    /// Extension flag
    pub extension: bool,

    /// CSRC count (number of contributing sources)
    pub cc: u8,

    /// Marker bit
    pub marker: bool,

    /// Payload type
    pub payload_type: u8,

    /// Sequence number
    pub sequence_number: RtpSequenceNumber,

    /// Timestamp
    pub timestamp: RtpTimestamp,

    /// Synchronization source identifier
    pub ssrc: RtpSsrc,

    /// Contributing source identifiers
    pub csrc: Vec<RtpCsrc>,

    /// Extension header ID
    pub extension_id: Option<u16>,

    /// Extension data
    pub extension_data: Option<Bytes>,
}

impl Default for RtpHeader {
    fn default() -> Self {
        Self {
            version: RTP_VERSION,
            padding: false,
            extension: false,
            cc: 0,
            marker: false,
            payload_type: 0,
            sequence_number: 0,
            timestamp: 0,
            ssrc: 0,
            csrc: Vec::new(),
            extension_id: None,
            extension_data: None,
        }
    }
}

impl RtpHeader {
    /// Create a new RTP header with default flags
    pub fn new(payload_type: u8, sequence_number: RtpSequenceNumber,
               timestamp: RtpTimestamp, ssrc: RtpSsrc) -> Self {
        Self {
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            ..Default::default()
        }
    }

    /// Get the size of the header in bytes
    pub fn size(&self) -> usize {
        let mut size = RTP_MIN_HEADER_SIZE + self.csrc.len() * 4;

        if self.extension {
            // 4 bytes of extension header plus data padded to a word boundary
            let data_len = self.extension_data.as_ref().map_or(0, |d| d.len());
            size += 4 + (data_len + 3) / 4 * 4;
        }

        size
    }

    /// Parse an RTP header from bytes
    pub fn parse(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < RTP_MIN_HEADER_SIZE {
            return Err(Error::BufferTooSmall {
                required: RTP_MIN_HEADER_SIZE,
                available: buf.remaining(),
            });
        }

        // First byte: version (2 bits), padding (1 bit), extension (1 bit),
        // CSRC count (4 bits)
        let first_byte = buf.get_u8();
        let version = (first_byte >> 6) & 0x03;
        if version != RTP_VERSION {
            return Err(Error::InvalidPacket(format!("Invalid RTP version: {}", version)));
        }
        let padding = ((first_byte >> 5) & 0x01) != 0;
        let extension = ((first_byte >> 4) & 0x01) != 0;
        let cc = first_byte & 0x0F;

        // Second byte: marker (1 bit), payload type (7 bits)
        let second_byte = buf.get_u8();
        let marker = ((second_byte >> 7) & 0x01) != 0;
        let payload_type = second_byte & 0x7F;

        let sequence_number = buf.get_u16();
        let timestamp = buf.get_u32();
        let ssrc = buf.get_u32();

        // CSRC list
        let mut csrc = Vec::with_capacity(cc as usize);
        for _ in 0..cc {
            if buf.remaining() < 4 {
                return Err(Error::BufferTooSmall {
                    required: 4,
                    available: buf.remaining(),
                });
            }
            csrc.push(buf.get_u32());
        }

        // Extension header
        let (extension_id, extension_data) = if extension {
            if buf.remaining() < 4 {
                return Err(Error::BufferTooSmall {
                    required: 4,
                    available: buf.remaining(),
                });
            }

            let ext_id = buf.get_u16();
            let ext_length = buf.get_u16() as usize * 4; // length in 32-bit words

            if buf.remaining() < ext_length {
                return Err(Error::BufferTooSmall {
                    required: ext_length,
                    available: buf.remaining(),
                });
            }

            let data = buf.copy_to_bytes(ext_length);
            (Some(ext_id), Some(data))
        } else {
            (None, None)
        };

        Ok(Self {
            version,
            padding,
            extension,
            cc,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc,
            extension_id,
            extension_data,
        })
    }

    /// Serialize the header to bytes
    pub fn serialize(&self, buf: &mut BytesMut) -> Result<()> {
        buf.reserve(self.size());

        let mut first_byte = (self.version & 0x03) << 6;
        if self.padding {
            first_byte |= 1 << 5;
        }
        if self.extension {
            first_byte |= 1 << 4;
        }
        first_byte |= self.cc & 0x0F;
        buf.put_u8(first_byte);

        let mut second_byte = 0u8;
        if self.marker {
            second_byte |= 1 << 7;
        }
        second_byte |= self.payload_type & 0x7F;
        buf.put_u8(second_byte);

        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);

        if self.cc as usize != self.csrc.len() {
            return Err(Error::InvalidParameter(format!(
                "CSRC count ({}) does not match CSRC list length ({})",
                self.cc, self.csrc.len()
            )));
        }
        for csrc in &self.csrc {
            buf.put_u32(*csrc);
        }

        if self.extension {
            let (ext_id, ext_data) = match (self.extension_id, &self.extension_data) {
                (Some(id), Some(data)) => (id, data),
                _ => {
                    return Err(Error::InvalidParameter(
                        "Extension flag is set but extension data is missing".to_string(),
                    ))
                }
            };

            buf.put_u16(ext_id);
            buf.put_u16(((ext_data.len() + 3) / 4) as u16);
            buf.put_slice(ext_data);

            let padding_bytes = (4 - (ext_data.len() % 4)) % 4;
            for _ in 0..padding_bytes {
                buf.put_u8(0);
            }
        }

        Ok(())
    }
}

/// RTP packet implementation
#[derive(Clone, PartialEq, Eq)]
pub struct RtpPacket {
    /// RTP header
    pub header: RtpHeader,

    /// Payload data
    pub payload: Bytes,
}

impl RtpPacket {
    /// Create a new RTP packet
    pub fn new(header: RtpHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Create a new RTP packet with basic parameters
    pub fn new_with_payload(
        payload_type: u8,
        sequence_number: RtpSequenceNumber,
        timestamp: RtpTimestamp,
        ssrc: RtpSsrc,
        payload: Bytes,
    ) -> Self {
        Self {
            header: RtpHeader::new(payload_type, sequence_number, timestamp, ssrc),
            payload,
        }
    }

    /// Get the total size of the packet in bytes
    pub fn size(&self) -> usize {
        self.header.size() + self.payload.len()
    }

    /// Parse an RTP packet from bytes
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut buf = Bytes::copy_from_slice(data);

        let header = RtpHeader::parse(&mut buf)?;

        // The last padding byte holds the padding length, itself included
        let padding_bytes = if header.padding && !buf.is_empty() {
            let padding = *buf.last().unwrap_or(&0) as usize;
            if padding == 0 || padding > buf.len() {
                return Err(Error::InvalidPacket(format!(
                    "Invalid padding value: {} with {} bytes remaining",
                    padding,
                    buf.len()
                )));
            }
            padding
        } else {
            0
        };

        let payload = buf.slice(0..buf.len() - padding_bytes);

        Ok(Self { header, payload })
    }

    /// Serialize the packet to bytes
    pub fn serialize(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.size());

        self.header.serialize(&mut buf)?;
        buf.put_slice(&self.payload);

        Ok(buf.freeze())
    }
}

impl fmt::Debug for RtpPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtpPacket")
            .field("header", &self.header)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rtp_header_serialize_parse() {
        let original = RtpHeader::new(96, 1000, 0x12345678, 0xabcdef01);

        let mut buf = BytesMut::with_capacity(RTP_MIN_HEADER_SIZE);
        original.serialize(&mut buf).unwrap();
        assert_eq!(buf.len(), RTP_MIN_HEADER_SIZE);

        let mut reader = buf.freeze();
        let parsed = RtpHeader::parse(&mut reader).unwrap();

        assert_eq!(parsed.version, 2);
        assert_eq!(parsed.payload_type, 96);
        assert_eq!(parsed.sequence_number, 1000);
        assert_eq!(parsed.timestamp, 0x12345678);
        assert_eq!(parsed.ssrc, 0xabcdef01);
        assert!(!parsed.padding);
        assert!(!parsed.extension);
        assert_eq!(parsed.cc, 0);
        assert!(!parsed.marker);
    }

    #[test]
    fn test_rtp_header_with_csrc() {
        let mut header = RtpHeader::new(96, 1000, 0x12345678, 0xabcdef01);
        header.csrc = vec![0x11111111, 0x22222222];
        header.cc = 2;

        let mut buf = BytesMut::with_capacity(header.size());
        header.serialize(&mut buf).unwrap();

        let mut reader = buf.freeze();
        let parsed = RtpHeader::parse(&mut reader).unwrap();

        assert_eq!(parsed.cc, 2);
        assert_eq!(parsed.csrc, vec![0x11111111, 0x22222222]);
    }

    #[test]
    fn test_rtp_header_with_extension() {
        let mut header = RtpHeader::new(96, 1000, 0x12345678, 0xabcdef01);
        header.extension = true;
        header.extension_id = Some(0x1234);
        header.extension_data = Some(Bytes::from_static(b"extension data"));

        let mut buf = BytesMut::with_capacity(header.size());
        header.serialize(&mut buf).unwrap();

        let mut reader = buf.freeze();
        let parsed = RtpHeader::parse(&mut reader).unwrap();

        assert!(parsed.extension);
        assert_eq!(parsed.extension_id, Some(0x1234));
        // Parsed data may carry the word-boundary padding at the end
        assert!(parsed.extension_data.unwrap().starts_with(b"extension data"));
    }

    #[test]
    fn test_rtp_packet_serialize_parse_roundtrip() {
        let payload = Bytes::from_static(b"test payload data");
        let original = RtpPacket::new_with_payload(96, 1000, 12345, 0xabcdef01, payload);

        let serialized = original.serialize().unwrap();
        let parsed = RtpPacket::parse(&serialized).unwrap();

        assert_eq!(parsed, original);
    }

    #[test]
    fn test_parse_real_world_packet() {
        // Version 2, no padding, no extension, 0 CSRCs, PT 0 (PCMU),
        // seq 0xfd70, payload "Test"
        let packet_data = [
            0x80, 0x00, 0xfd, 0x70, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x54, 0x65, 0x73, 0x74,
        ];

        let parsed = RtpPacket::parse(&packet_data).unwrap();

        assert_eq!(parsed.header.version, 2);
        assert_eq!(parsed.header.payload_type, 0);
        assert_eq!(parsed.header.sequence_number, 0xfd70);
        assert_eq!(parsed.payload.as_ref(), b"Test");
    }

    #[test]
    fn test_parse_packet_with_padding() {
        // Same as above but with the padding flag and two padding bytes
        let packet_data = [
            0xa0, 0x00, 0xfd, 0x70, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x54, 0x65, 0x73, 0x74,
            0x00, 0x02,
        ];

        let parsed = RtpPacket::parse(&packet_data).unwrap();
        assert_eq!(parsed.payload.as_ref(), b"Test");
    }

    #[test]
    fn test_parse_rejects_wrong_version() {
        let packet_data = [
            0x40, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
        ];
        assert!(RtpPacket::parse(&packet_data).is_err());
    }
}
