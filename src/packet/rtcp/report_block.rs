use bytes::{Buf, BufMut, BytesMut};

use crate::error::Error;
use crate::{Result, RtpSsrc};

/// Reception report block carried in RTCP SR/RR packets
/// Defined in RFC 3550 Section 6.4.1
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RtcpReportBlock {
    /// SSRC identifier of the source this report is about
    pub ssrc: RtpSsrc,

    /// Fraction of packets lost since the last report, in 1/256 units
    pub fraction_lost: u8,

    /// Cumulative number of packets lost (24 bits on the wire)
    pub total_lost: u32,

    /// Extended highest sequence number received (cycles << 16 | seq)
    pub extended_highest_seq: u32,

    /// Interarrival jitter estimate, in timestamp units
    pub jitter: u32,

    /// Middle 32 bits of the NTP timestamp of the last SR from this source
    pub last_sr: u32,

    /// Delay since that SR, in units of 1/65536 seconds
    pub delay_since_last_sr: u32,
}

impl RtcpReportBlock {
    /// Size of a report block in bytes
    pub const SIZE: usize = 24;

    /// Create a new empty report block for a source
    pub fn new(ssrc: RtpSsrc) -> Self {
        Self {
            ssrc,
            ..Default::default()
        }
    }

    /// Parse a report block from bytes
    pub fn parse(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < Self::SIZE {
            return Err(Error::BufferTooSmall {
                required: Self::SIZE,
                available: buf.remaining(),
            });
        }

        let ssrc = buf.get_u32();

        // Fraction lost (8 bits) + cumulative lost (24 bits)
        let fraction_lost = buf.get_u8();
        let total_lost = (buf.get_u8() as u32) << 16
            | (buf.get_u8() as u32) << 8
            | buf.get_u8() as u32;

        let extended_highest_seq = buf.get_u32();
        let jitter = buf.get_u32();
        let last_sr = buf.get_u32();
        let delay_since_last_sr = buf.get_u32();

        Ok(Self {
            ssrc,
            fraction_lost,
            total_lost,
            extended_highest_seq,
            jitter,
            last_sr,
            delay_since_last_sr,
        })
    }

    /// Serialize a report block to bytes
    pub fn serialize(&self, buf: &mut BytesMut) {
        buf.reserve(Self::SIZE);

        buf.put_u32(self.ssrc);

        buf.put_u8(self.fraction_lost);
        buf.put_u8(((self.total_lost >> 16) & 0xFF) as u8);
        buf.put_u8(((self.total_lost >> 8) & 0xFF) as u8);
        buf.put_u8((self.total_lost & 0xFF) as u8);

        buf.put_u32(self.extended_highest_seq);
        buf.put_u32(self.jitter);
        buf.put_u32(self.last_sr);
        buf.put_u32(self.delay_since_last_sr);
    }
}
