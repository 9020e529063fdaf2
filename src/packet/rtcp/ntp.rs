use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// NTP timestamp representation (64 bits)
/// As defined in RFC 3550
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NtpTimestamp {
    /// Seconds since January 1, 1900
    pub seconds: u32,

    /// Fraction of a second
    pub fraction: u32,
}

/// Offset between the NTP epoch (1900) and the UNIX epoch (1970), in seconds
const NTP_TO_UNIX_OFFSET: u64 = 2_208_988_800;

impl NtpTimestamp {
    /// Create a new NTP timestamp from the current system time
    pub fn now() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|_| Duration::from_secs(0));

        let ntp_seconds = now.as_secs() + NTP_TO_UNIX_OFFSET;

        // Convert nanoseconds to NTP fraction (2^32 / 10^9)
        let nanos = now.subsec_nanos();
        let ntp_fraction = (nanos as u64 * 0x1_0000_0000u64 / 1_000_000_000) as u32;

        Self {
            seconds: ntp_seconds as u32,
            fraction: ntp_fraction,
        }
    }

    /// Convert to a 64-bit representation
    pub fn to_u64(&self) -> u64 {
        (self.seconds as u64) << 32 | (self.fraction as u64)
    }

    /// Convert from a 64-bit representation
    pub fn from_u64(value: u64) -> Self {
        Self {
            seconds: (value >> 32) as u32,
            fraction: value as u32,
        }
    }

    /// The middle 32 bits of the timestamp (bits 47..16)
    ///
    /// This is the compact form carried in the LSR field of RTCP report
    /// blocks and used for round-trip calculations (RFC 3550 Section 6.4.1).
    pub fn middle_32(&self) -> u32 {
        (self.to_u64() >> 16) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ntp_timestamp_now_is_recent() {
        let timestamp = NtpTimestamp::now();
        // Just check it's after Jan 1, 2020 in NTP time
        assert!(timestamp.seconds > 3_786_825_600);
    }

    #[test]
    fn test_ntp_timestamp_u64_roundtrip() {
        let timestamp = NtpTimestamp {
            seconds: 3_786_825_600,
            fraction: 0x8000_0000, // 0.5 seconds
        };

        let converted = NtpTimestamp::from_u64(timestamp.to_u64());
        assert_eq!(converted, timestamp);
    }

    #[test]
    fn test_middle_32() {
        let timestamp = NtpTimestamp {
            seconds: 0xAABB_CCDD,
            fraction: 0x1122_3344,
        };

        // Low 16 bits of seconds followed by high 16 bits of fraction
        assert_eq!(timestamp.middle_32(), 0xCCDD_1122);
    }
}
