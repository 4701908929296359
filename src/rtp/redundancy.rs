/// RFC 2198 redundant audio payloads
///
/// A redundant payload carries one or more older encodings of earlier frames
/// ahead of the primary encoding:
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |F|   block PT  |  timestamp offset         |   block length    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Headers with F=1 describe redundant blocks; the final header is a single
/// byte (F=0, PT) for the primary block, which takes the remaining bytes.

use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RedundancyError {
    #[error("redundant payload ends inside block headers")]
    TruncatedHeaders,
    #[error("redundant block of {len} bytes overruns payload ({available} remaining)")]
    BlockOverrun { len: usize, available: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedundantBlock {
    pub payload_type: u8,
    /// Distance back from the packet timestamp, in timestamp units
    pub timestamp_offset: u16,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedPayload {
    pub redundant: Vec<RedundantBlock>,
    pub primary_type: u8,
    pub primary: Bytes,
}

impl RedPayload {
    pub fn parse(payload: &Bytes) -> Result<Self, RedundancyError> {
        let mut pos = 0;
        let mut headers = Vec::new();

        loop {
            let first = *payload.get(pos).ok_or(RedundancyError::TruncatedHeaders)?;
            if first & 0x80 == 0 {
                pos += 1;
                break;
            }
            if pos + 4 > payload.len() {
                return Err(RedundancyError::TruncatedHeaders);
            }
            let b1 = payload[pos + 1] as u16;
            let b2 = payload[pos + 2] as u16;
            let b3 = payload[pos + 3] as usize;
            headers.push((first & 0x7F, (b1 << 6) | (b2 >> 2), ((b2 as usize & 0x03) << 8) | b3));
            pos += 4;
        }
        let primary_type = payload[pos - 1] & 0x7F;

        let mut redundant = Vec::with_capacity(headers.len());
        for (payload_type, timestamp_offset, len) in headers {
            let available = payload.len() - pos;
            if len > available {
                return Err(RedundancyError::BlockOverrun { len, available });
            }
            redundant.push(RedundantBlock {
                payload_type,
                timestamp_offset,
                data: payload.slice(pos..pos + len),
            });
            pos += len;
        }

        Ok(Self {
            redundant,
            primary_type,
            primary: payload.slice(pos..),
        })
    }

    /// The redundant block closest in time to the primary (smallest offset)
    pub fn latest_redundant(&self) -> Option<&RedundantBlock> {
        self.redundant.iter().min_by_key(|b| b.timestamp_offset)
    }
}
