use thiserror::Error;

/// Reasons the jitter buffer refuses a packet.
///
/// All of these are "bad packet" conditions: the packet is discarded, the
/// bad-packet counter moves, and the buffer carries on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JitterError {
    #[error("packet {seq} has an empty payload")]
    EmptyPayload { seq: u16 },
    #[error("packet {seq} arrived too late (buffer head {head}, last played {last_popped})")]
    TooLate { seq: u16, head: u16, last_popped: u16 },
    #[error("packet {seq} is already buffered")]
    Duplicate { seq: u16 },
}

impl JitterError {
    pub fn sequence(&self) -> u16 {
        match self {
            Self::EmptyPayload { seq } | Self::TooLate { seq, .. } | Self::Duplicate { seq } => *seq,
        }
    }
}
