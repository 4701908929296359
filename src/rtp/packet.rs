/// Packet envelope handed to the jitter buffer
///
/// An envelope is built once by the receive path and is immutable afterwards,
/// except for the redundant-use flag which only the buffer sets on the copy it
/// hands out during a redundant hold.

use bytes::Bytes;

use super::header::{HeaderError, RtpHeader};
use super::redundancy::RedPayload;
use super::{payload_type, DEFAULT_SAMPLE_RATE};

/// Derive the playout duration of a payload for constant-bitrate codecs.
///
/// Returns `None` for variable-rate or dynamic payload types; those need the
/// duration supplied by whoever negotiated the codec.
pub fn payload_duration_ms(payload_type: u8, payload_len: usize, sample_rate: u32) -> Option<u16> {
    let ms = match payload_type {
        // 8-bit samples
        payload_type::PCMU | payload_type::PCMA => {
            let bytes_per_ms = (sample_rate / 1000).max(1) as usize;
            payload_len / bytes_per_ms
        }
        // 33-byte frames of 20ms
        payload_type::GSM => (payload_len / 33) * 20,
        // 10-byte frames of 10ms
        payload_type::G729A => (payload_len / 10) * 10,
        // 16-bit samples
        payload_type::L16 => {
            let bytes_per_ms = (sample_rate as usize * 2 / 1000).max(1);
            payload_len / bytes_per_ms
        }
        _ => return None,
    };
    u16::try_from(ms).ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketEnvelope {
    sequence: u16,
    timestamp: u32,
    payload_type: u8,
    marker: bool,
    ssrc: u32,
    payload_ms: u16,
    sample_rate: u32,
    payload: Bytes,
    use_redundant_payload: bool,
}

impl PacketEnvelope {
    /// Build an envelope from header fields already in host order
    pub fn new(
        sequence: u16,
        timestamp: u32,
        payload_type: u8,
        payload_ms: u16,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            sequence,
            timestamp,
            payload_type: payload_type & 0x7F,
            marker: false,
            ssrc: 0,
            payload_ms,
            sample_rate: DEFAULT_SAMPLE_RATE,
            payload: payload.into(),
            use_redundant_payload: false,
        }
    }

    /// Parse a raw RTP packet off the wire.
    ///
    /// `sample_rate` is the stream's negotiated RTP clock rate. `payload_ms`
    /// of `None` derives the duration from the payload type at that rate; an
    /// unknown type then gets a duration of zero.
    pub fn parse(
        packet: impl Into<Bytes>,
        sample_rate: u32,
        payload_ms: Option<u16>,
    ) -> Result<Self, HeaderError> {
        let packet = packet.into();
        let header = RtpHeader::parse(&packet)?;
        let payload = packet.slice(header.payload_offset..header.payload_end);
        let payload_ms = payload_ms
            .or_else(|| payload_duration_ms(header.payload_type, payload.len(), sample_rate))
            .unwrap_or(0);

        Ok(Self {
            sequence: header.sequence,
            timestamp: header.timestamp,
            payload_type: header.payload_type,
            marker: header.marker,
            ssrc: header.ssrc,
            payload_ms,
            sample_rate,
            payload,
            use_redundant_payload: false,
        })
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_marker(mut self, marker: bool) -> Self {
        self.marker = marker;
        self
    }

    pub fn with_ssrc(mut self, ssrc: u32) -> Self {
        self.ssrc = ssrc;
        self
    }

    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    pub fn payload_type(&self) -> u8 {
        self.payload_type
    }

    pub fn marker(&self) -> bool {
        self.marker
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn payload_ms(&self) -> u16 {
        self.payload_ms
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Raw payload bytes (after the RTP header)
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn is_redundant_type(&self) -> bool {
        self.payload_type == payload_type::DYNAMIC_RED
    }

    /// Set when this copy stands in for a missing earlier packet
    pub fn use_redundant_payload(&self) -> bool {
        self.use_redundant_payload
    }

    pub(crate) fn as_redundant_stand_in(&self) -> Self {
        Self {
            use_redundant_payload: true,
            ..self.clone()
        }
    }

    /// Audio bytes to decode for this delivery.
    ///
    /// Plain payload types return the payload as is. Redundant payloads return
    /// the primary block, or the most recent redundant block when this copy
    /// stands in for the missing predecessor. Unparseable redundancy falls back
    /// to the whole payload.
    pub fn audio(&self) -> Bytes {
        if !self.is_redundant_type() {
            return self.payload.clone();
        }
        match RedPayload::parse(&self.payload) {
            Ok(red) if self.use_redundant_payload => red
                .latest_redundant()
                .map(|block| block.data.clone())
                .unwrap_or(red.primary),
            Ok(red) => red.primary,
            Err(_) => self.payload.clone(),
        }
    }
}
