/// RTP fixed header parsing (RFC 3550 §5.1)
///
/// This is the single place where network byte order is converted. Everything
/// downstream (envelopes, the jitter buffer) sees host-order fields.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       sequence number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |           synchronization source (SSRC) identifier            |
/// +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// ```

use thiserror::Error;

pub const RTP_VERSION: u8 = 2;
pub const RTP_HEADER_LENGTH: usize = 12;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("packet too short for RTP header: {len} bytes")]
    Truncated { len: usize },
    #[error("unsupported RTP version {0}")]
    BadVersion(u8),
    #[error("header extension runs past end of packet (needs {needed} bytes, have {len})")]
    ExtensionOverrun { needed: usize, len: usize },
    #[error("invalid padding length {padding} for packet of {len} bytes")]
    BadPadding { padding: usize, len: usize },
}

/// Parsed RTP header, all fields in host order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    pub marker: bool,
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    /// Offset of the first payload byte (after CSRCs and extension)
    pub payload_offset: usize,
    /// End of the payload (before any padding trailer)
    pub payload_end: usize,
}

impl RtpHeader {
    pub fn parse(data: &[u8]) -> Result<Self, HeaderError> {
        if data.len() < RTP_HEADER_LENGTH {
            return Err(HeaderError::Truncated { len: data.len() });
        }

        let version = (data[0] >> 6) & 0x03;
        if version != RTP_VERSION {
            return Err(HeaderError::BadVersion(version));
        }

        let has_padding = (data[0] & 0x20) != 0;
        let has_extension = (data[0] & 0x10) != 0;
        let cc = (data[0] & 0x0F) as usize;

        let mut offset = RTP_HEADER_LENGTH + cc * 4;
        if offset > data.len() {
            return Err(HeaderError::Truncated { len: data.len() });
        }

        if has_extension {
            if offset + 4 > data.len() {
                return Err(HeaderError::ExtensionOverrun {
                    needed: offset + 4,
                    len: data.len(),
                });
            }
            let ext_words = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
            let needed = offset + 4 + ext_words * 4;
            if needed > data.len() {
                return Err(HeaderError::ExtensionOverrun {
                    needed,
                    len: data.len(),
                });
            }
            offset = needed;
        }

        let mut payload_end = data.len();
        if has_padding {
            let padding = data[data.len() - 1] as usize;
            if padding == 0 || offset + padding > data.len() {
                return Err(HeaderError::BadPadding {
                    padding,
                    len: data.len(),
                });
            }
            payload_end -= padding;
        }

        Ok(Self {
            marker: (data[1] & 0x80) != 0,
            payload_type: data[1] & 0x7F,
            sequence: u16::from_be_bytes([data[2], data[3]]),
            timestamp: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            ssrc: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
            payload_offset: offset,
            payload_end,
        })
    }

    /// Serialize a minimal header (no CSRCs, no extension)
    pub fn write_fixed(&self, out: &mut Vec<u8>) {
        out.push(RTP_VERSION << 6);
        out.push((self.payload_type & 0x7F) | if self.marker { 0x80 } else { 0 });
        out.extend_from_slice(&self.sequence.to_be_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&self.ssrc.to_be_bytes());
    }

    pub fn payload_len(&self) -> usize {
        self.payload_end.saturating_sub(self.payload_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_header() {
        let packet = [
            0x80, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x10, 0x12, 0x34, 0x56, 0x78, 0xAA, 0xBB,
        ];
        let header = RtpHeader::parse(&packet).unwrap();
        assert_eq!(header.payload_type, 0);
        assert_eq!(header.sequence, 1);
        assert_eq!(header.timestamp, 16);
        assert_eq!(header.ssrc, 0x12345678);
        assert_eq!(header.payload_offset, 12);
        assert_eq!(header.payload_len(), 2);
        assert!(!header.marker);
    }

    #[test]
    fn test_network_order_sequence() {
        // 0xFFFF on the wire is 65535 in host order regardless of platform
        let packet = [0x80, 0xF9, 0xFF, 0xFF, 0, 0, 0x01, 0x40, 0, 0, 0, 1, 0];
        let header = RtpHeader::parse(&packet).unwrap();
        assert_eq!(header.sequence, 65535);
        assert_eq!(header.timestamp, 320);
        assert_eq!(header.payload_type, 0x79);
        assert!(header.marker);
    }

    #[test]
    fn test_truncated() {
        assert_eq!(
            RtpHeader::parse(&[0x80, 0x00]),
            Err(HeaderError::Truncated { len: 2 })
        );
        // CSRC count of 2 but no CSRC data
        let packet = [0x82, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1];
        assert!(matches!(
            RtpHeader::parse(&packet),
            Err(HeaderError::Truncated { .. })
        ));
    }

    #[test]
    fn test_bad_version() {
        let packet = [0x40, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1];
        assert_eq!(RtpHeader::parse(&packet), Err(HeaderError::BadVersion(1)));
    }

    #[test]
    fn test_csrc_and_extension_offset() {
        let mut packet = vec![0x91, 0x00, 0x00, 0x05, 0, 0, 0, 0, 0, 0, 0, 1];
        packet.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]); // one CSRC
        packet.extend_from_slice(&[0xBE, 0xDE, 0x00, 0x01]); // extension, 1 word
        packet.extend_from_slice(&[0, 0, 0, 0]);
        packet.extend_from_slice(&[0x55; 4]); // payload
        let header = RtpHeader::parse(&packet).unwrap();
        assert_eq!(header.payload_offset, 24);
        assert_eq!(header.payload_len(), 4);
    }

    #[test]
    fn test_extension_overrun() {
        let packet = [
            0x90, 0x00, 0x00, 0x01, 0, 0, 0, 0x10, 0, 0, 0, 1, 0xBE, 0xDE, 0xFF, 0xFF, 0x00,
        ];
        assert!(matches!(
            RtpHeader::parse(&packet),
            Err(HeaderError::ExtensionOverrun { .. })
        ));
    }

    #[test]
    fn test_padding_trailer() {
        let mut packet = vec![0xA0, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0, 0, 1];
        packet.extend_from_slice(&[1, 2, 3, 0, 0, 3]);
        let header = RtpHeader::parse(&packet).unwrap();
        assert_eq!(header.payload_len(), 3);

        let mut bad = vec![0xA0, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0, 0, 1];
        bad.extend_from_slice(&[1, 40]);
        assert!(matches!(
            RtpHeader::parse(&bad),
            Err(HeaderError::BadPadding { .. })
        ));
    }

    #[test]
    fn test_write_fixed_parses_back() {
        let header = RtpHeader {
            marker: true,
            payload_type: 8,
            sequence: 4242,
            timestamp: 0xDEADBEEF,
            ssrc: 7,
            payload_offset: RTP_HEADER_LENGTH,
            payload_end: RTP_HEADER_LENGTH,
        };
        let mut out = Vec::new();
        header.write_fixed(&mut out);
        assert_eq!(RtpHeader::parse(&out).unwrap(), header);
    }
}
